//! Interpretation of model replies into located feedback items.
//!
//! The reply is expected to be one JSON object with `checklistResults` and
//! `feedbackItems`. Candidates reference text by 1-based sentence number,
//! optionally narrowed by a short verbatim `fragment`; the older literal
//! `range` form and the `feedback`/`type`/`passed` key names are accepted
//! too. Every reference is resolved to char offsets here and nowhere else.
//!
//! Interpretation never fails. Unusable replies produce an empty result
//! flagged `malformed`; unusable candidates are dropped and recorded.

use std::sync::LazyLock;

use punt_core::assignment::partition;
use punt_core::{
    ChecklistResult, Criterion, FeedbackCategory, FeedbackItem, FeedbackStatus, HighlightColor,
    SegmentTable, TextSpan,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::prompt::MAX_FEEDBACK_ITEMS;

/// Longest verbatim quote (in words) a hint or fragment may carry.
pub const MAX_FRAGMENT_WORDS: usize = 4;

const DEFAULT_HINT: &str = "Algemene feedback";
const DEFAULT_CRITERION: &str = "Algemeen";
const NOT_EVALUATED: &str = "Deze eis is niet beoordeeld.";
const NO_EXPLANATION: &str = "Geen toelichting ontvangen.";

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid code fence regex")
});
static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["\u{201C}\u{201E}\u{AB}]([^"\u{201C}\u{201D}\u{201E}\u{AB}\u{BB}]*)["\u{201D}\u{BB}]"#)
        .expect("valid quoted passage regex")
});
// Single quotes only open after a boundary and close before a non-letter, so
// apostrophes in `auto's` or `'s avonds` do not pair up.
static SINGLE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[\s:(])['\u{2018}]((?:[^'\u{2018}\u{2019}]|\p{L}['\u{2019}]\p{L})*)['\u{2019}](?:$|[^\p{L}\p{N}])",
    )
    .expect("valid single-quoted passage regex")
});

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Not an object of the expected shape.
    Unparseable(String),
    /// Neither a sentence number, a range, nor a locatable fragment.
    MissingAnchor,
    SentenceOutOfRange(i64),
    /// The reference resolved to nothing after clamping.
    EmptySpan,
    /// The hint or a replacement field carries rewritten prose.
    RewrittenProse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the candidate in the reply's array.
    pub position: usize,
    pub reason: RejectReason,
}

/// Result of interpreting one reply against one text snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    pub checklist: Vec<ChecklistResult>,
    pub items: Vec<FeedbackItem>,
    pub rejected: Vec<Rejection>,
    /// Valid candidates dropped by the per-round cap.
    pub truncated: usize,
    /// The reply was not JSON or had none of the expected keys.
    pub malformed: bool,
}

impl Interpretation {
    fn malformed() -> Self {
        Self {
            malformed: true,
            ..Default::default()
        }
    }

    /// Candidates that did not become items, for any reason.
    pub fn dropped(&self) -> usize {
        self.rejected.len() + self.truncated
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(default, alias = "sentenceIndex", alias = "zin")]
    sentence: Option<i64>,
    #[serde(default)]
    fragment: Option<String>,
    #[serde(default)]
    range: Option<RawRange>,
    #[serde(default, alias = "type")]
    category: Option<String>,
    #[serde(default, alias = "criterion")]
    criterion_label: Option<String>,
    #[serde(default, alias = "feedback", alias = "advice")]
    hint: Option<String>,
    #[serde(default, alias = "replacement", alias = "suggestion", alias = "correction")]
    rewrite: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    start: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
struct RawCheck {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, alias = "passed")]
    met: Option<bool>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Interpret `raw` against `text`, the exact snapshot the request was built from.
pub fn interpret(raw: &str, text: &str, criteria: &[Criterion], round: u8) -> Interpretation {
    let Some(value) = parse_reply(raw) else {
        warn!(round, "model reply is not JSON");
        return Interpretation::malformed();
    };

    let (checks, candidates) = match value {
        Value::Array(items) => (None, Some(items)),
        Value::Object(mut map) => {
            let checks = take_array(&mut map, &["checklistResults", "checklist"]);
            let candidates = take_array(&mut map, &["feedbackItems", "feedback"]);
            if checks.is_none() && candidates.is_none() {
                warn!(round, "model reply has no checklist or feedback keys");
                return Interpretation::malformed();
            }
            (checks, candidates)
        }
        _ => {
            warn!(round, "model reply is not an object");
            return Interpretation::malformed();
        }
    };

    let mut out = Interpretation {
        checklist: reconcile_checklist(checks, criteria),
        ..Default::default()
    };

    let table = SegmentTable::new(text);
    for (position, value) in candidates.into_iter().flatten().enumerate() {
        let candidate = match serde_json::from_value::<RawCandidate>(value) {
            Ok(c) => c,
            Err(e) => {
                out.reject(position, RejectReason::Unparseable(e.to_string()));
                continue;
            }
        };
        if embeds_rewrite(&candidate) {
            out.reject(position, RejectReason::RewrittenProse);
            continue;
        }
        let (span, sentence_index) = match resolve(&table, &candidate) {
            Ok(resolved) => resolved,
            Err(reason) => {
                out.reject(position, reason);
                continue;
            }
        };
        if out.items.len() == MAX_FEEDBACK_ITEMS {
            out.truncated += 1;
            continue;
        }

        let index = out.items.len();
        out.items.push(FeedbackItem {
            id: format!("r{round}-{}", index + 1),
            span,
            sentence_index,
            category: candidate
                .category
                .as_deref()
                .and_then(FeedbackCategory::parse_lenient)
                .unwrap_or_default(),
            criterion_label: non_blank(candidate.criterion_label)
                .unwrap_or_else(|| DEFAULT_CRITERION.to_string()),
            hint: non_blank(candidate.hint).unwrap_or_else(|| DEFAULT_HINT.to_string()),
            color: HighlightColor::for_index(index),
            status: FeedbackStatus::Open,
        });
    }

    if out.truncated > 0 {
        debug!(round, truncated = out.truncated, "feedback truncated to cap");
    }
    out
}

impl Interpretation {
    fn reject(&mut self, position: usize, reason: RejectReason) {
        debug!(position, ?reason, "feedback candidate rejected");
        self.rejected.push(Rejection { position, reason });
    }
}

/// Parse the reply as JSON, tolerating code fences and surrounding prose.
pub(crate) fn parse_reply(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    if let Some(body) = FENCED.captures(trimmed).and_then(|c| c.get(1))
        && let Ok(v) = serde_json::from_str(body.as_str())
    {
        return Some(v);
    }
    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if start >= end {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn take_array(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Vec<Value>> {
    keys.iter().find_map(|k| match map.remove(*k) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    })
}

/// Resolve a candidate's reference to a span and its sentence index.
fn resolve(table: &SegmentTable<'_>, c: &RawCandidate) -> Result<(TextSpan, usize), RejectReason> {
    let fragment = c
        .fragment
        .as_deref()
        .filter(|f| f.split_whitespace().count() <= MAX_FRAGMENT_WORDS);

    if let Some(number) = c.sentence {
        let index = number
            .checked_sub(1)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(RejectReason::SentenceOutOfRange(number))?;
        let seg = table
            .get(index)
            .ok_or(RejectReason::SentenceOutOfRange(number))?;
        if let Some(f) = fragment
            && let Some(span) = table.find_fragment(index, f)
        {
            return Ok((span, index));
        }
        let span = seg.content_span().ok_or(RejectReason::EmptySpan)?;
        return Ok((span, index));
    }

    if let Some(range) = &c.range {
        let len = table.char_len() as i64;
        let start = range.start.clamp(0, len) as usize;
        let end = range.end.clamp(0, len) as usize;
        let span = TextSpan::new(start, end).ok_or(RejectReason::EmptySpan)?;
        let index = table.index_at(span.start).ok_or(RejectReason::EmptySpan)?;
        return Ok((span, index));
    }

    if let Some(f) = fragment {
        return (0..table.len())
            .find_map(|i| table.find_fragment(i, f).map(|span| (span, i)))
            .ok_or(RejectReason::MissingAnchor);
    }

    Err(RejectReason::MissingAnchor)
}

/// True when the candidate carries replacement prose rather than a pointer.
fn embeds_rewrite(c: &RawCandidate) -> bool {
    let long_rewrite = c
        .rewrite
        .as_deref()
        .is_some_and(|r| r.split_whitespace().count() > MAX_FRAGMENT_WORDS);
    let long_quote = c.hint.as_deref().is_some_and(|h| {
        QUOTED
            .captures_iter(h)
            .chain(SINGLE_QUOTED.captures_iter(h))
            .any(|cap| cap[1].split_whitespace().count() > MAX_FRAGMENT_WORDS)
    });
    long_rewrite || long_quote
}

/// Re-evaluated checklist, one entry per selected checklist criterion in config order.
fn reconcile_checklist(checks: Option<Vec<Value>>, criteria: &[Criterion]) -> Vec<ChecklistResult> {
    let (checklist, _) = partition(criteria);
    let raw: Vec<RawCheck> = checks
        .into_iter()
        .flatten()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();

    checklist
        .into_iter()
        .map(|criterion| {
            let found = raw
                .iter()
                .find(|r| r.id.as_deref() == Some(criterion.id.as_str()))
                .or_else(|| {
                    raw.iter().find(|r| {
                        r.label
                            .as_deref()
                            .is_some_and(|l| l.trim().eq_ignore_ascii_case(criterion.label.trim()))
                    })
                });
            match found {
                Some(r) => ChecklistResult {
                    id: criterion.id.clone(),
                    label: criterion.label.clone(),
                    met: r.met.unwrap_or(false),
                    explanation: non_blank(r.explanation.clone())
                        .unwrap_or_else(|| NO_EXPLANATION.to_string()),
                },
                None => ChecklistResult {
                    id: criterion.id.clone(),
                    label: criterion.label.clone(),
                    met: false,
                    explanation: NOT_EVALUATED.to_string(),
                },
            }
        })
        .collect()
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
