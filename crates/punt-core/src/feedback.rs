//! Feedback round types shared between the engine, the store, and the report.
//!
//! Spans are half-open offsets counted in Unicode scalar values (`char`s) of
//! the text snapshot a round was generated against.

use serde::{Deserialize, Serialize};

/// Half-open character range `[start, end)` into a text snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// A non-empty span, or `None` when `start >= end`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when `0 <= start < end <= char_len`.
    pub fn fits(&self, char_len: usize) -> bool {
        self.start < self.end && self.end <= char_len
    }

    /// The substring this span covers, if it fits inside `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        let from = char_to_byte(text, self.start)?;
        let to = char_to_byte(text, self.end)?;
        (from < to).then(|| &text[from..to])
    }
}

/// Byte offset of the `idx`-th char, or `text.len()` for one past the end.
pub fn char_to_byte(text: &str, idx: usize) -> Option<usize> {
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .nth(idx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Spelling,
    Grammar,
    Structure,
    #[default]
    Content,
}

impl FeedbackCategory {
    /// Accepts the English wire names and their Dutch equivalents.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spelling" => Some(Self::Spelling),
            "grammar" | "grammatica" => Some(Self::Grammar),
            "structure" | "structuur" | "opbouw" => Some(Self::Structure),
            "content" | "inhoud" => Some(Self::Content),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Grammar => "grammar",
            Self::Structure => "structure",
            Self::Content => "content",
        }
    }

    /// Dutch label for documents and prompts.
    pub fn label_nl(&self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Grammar => "grammatica",
            Self::Structure => "structuur",
            Self::Content => "inhoud",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    Open,
    Accepted,
    Rejected,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Highlight slot, assigned by position within a round so rendering is order-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Blue,
    Green,
    Pink,
    Purple,
}

impl HighlightColor {
    const PALETTE: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Blue,
        HighlightColor::Green,
        HighlightColor::Pink,
        HighlightColor::Purple,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Pink => "pink",
            Self::Purple => "purple",
        }
    }
}

/// One located piece of feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackItem {
    pub id: String,
    pub span: TextSpan,
    /// 0-based index of the sentence unit the span lies in.
    pub sentence_index: usize,
    pub category: FeedbackCategory,
    pub criterion_label: String,
    pub hint: String,
    pub color: HighlightColor,
    #[serde(default)]
    pub status: FeedbackStatus,
}

/// Met/unmet evaluation of one checklist criterion against the current text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistResult {
    pub id: String,
    pub label: String,
    pub met: bool,
    pub explanation: String,
}

/// A completed feedback round. Only item statuses change after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRound {
    pub round_number: u8,
    pub feedback_items: Vec<FeedbackItem>,
    pub checklist: Vec<ChecklistResult>,
    /// The exact text the spans refer to.
    pub text_snapshot: String,
    /// RFC 3339 timestamp.
    pub requested_at: String,
    /// Candidates dropped by validation (bad anchors, rewritten prose, overflow).
    #[serde(default)]
    pub rejected_candidates: usize,
}

impl FeedbackRound {
    pub fn item(&self, id: &str) -> Option<&FeedbackItem> {
        self.feedback_items.iter().find(|i| i.id == id)
    }

    pub fn checklist_met(&self) -> usize {
        self.checklist.iter().filter(|c| c.met).count()
    }
}

/// Compact identifier of earlier feedback, passed to later rounds for dedup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorFeedback {
    pub round: u8,
    /// 0-based sentence index in the round's text snapshot.
    pub sentence_index: usize,
    pub criterion_label: String,
    pub category: FeedbackCategory,
    pub hint: String,
    pub status: FeedbackStatus,
}
