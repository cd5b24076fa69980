//! Sentence segmentation with stable character offsets.
//!
//! Splits student text into addressable units so that feedback can refer to
//! "sentence 3" and be resolved to exact offsets in one place.
//!
//! # Rules
//!
//! - A unit ends after a run of `.`, `!` or `?`, plus any closing quotes or
//!   brackets directly after it, when the run is followed by whitespace or the
//!   end of the text. `3.5` and `bijv.de` therefore do not split.
//! - Whitespace after a terminator belongs to the next unit; ranges are never
//!   trimmed.
//! - A trailing whitespace-only remainder is attached to the last unit.
//! - Without any terminator the whole text is a single unit.
//!
//! Concatenating the unit texts always reproduces the input exactly.

use crate::feedback::TextSpan;

const TERMINATORS: [char; 3] = ['.', '!', '?'];
const CLOSERS: [char; 7] = ['"', '\'', '\u{201D}', '\u{2019}', ')', ']', '\u{BB}'];

/// One sentence-like unit. `start`/`end` count chars, `byte_*` index the source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl Segment<'_> {
    pub fn span(&self) -> TextSpan {
        TextSpan {
            start: self.start,
            end: self.end,
        }
    }

    /// The span without surrounding whitespace, or `None` for a blank unit.
    pub fn content_span(&self) -> Option<TextSpan> {
        let leading = self.text.chars().take_while(|c| c.is_whitespace()).count();
        let trailing = self
            .text
            .chars()
            .rev()
            .take_while(|c| c.is_whitespace())
            .count();
        let start = self.start + leading;
        let end = self.end.saturating_sub(trailing);
        TextSpan::new(start, end)
    }
}

/// Split `text` into sentence units.
pub fn segment(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    if text.is_empty() {
        return out;
    }

    let mut unit_start = (0usize, 0usize); // (char, byte)
    let mut in_run = false;
    let mut char_idx = 0usize;

    for (byte_idx, c) in text.char_indices() {
        if TERMINATORS.contains(&c) {
            in_run = true;
        } else if in_run && CLOSERS.contains(&c) {
            // closing quote or bracket stays with the sentence
        } else if in_run && c.is_whitespace() {
            push(&mut out, text, unit_start, (char_idx, byte_idx));
            unit_start = (char_idx, byte_idx);
            in_run = false;
        } else {
            in_run = false;
        }
        char_idx += 1;
    }

    let end = (char_idx, text.len());
    if text[unit_start.1..].trim().is_empty()
        && let Some(last) = out.last_mut()
    {
        last.end = end.0;
        last.byte_end = end.1;
        last.text = &text[last.byte_start..];
    } else {
        push(&mut out, text, unit_start, end);
    }
    out
}

fn push<'a>(out: &mut Vec<Segment<'a>>, text: &'a str, from: (usize, usize), to: (usize, usize)) {
    if from.1 < to.1 {
        out.push(Segment {
            text: &text[from.1..to.1],
            start: from.0,
            end: to.0,
            byte_start: from.1,
            byte_end: to.1,
        });
    }
}

/// Index-to-offset table over one text snapshot.
#[derive(Debug, Clone)]
pub struct SegmentTable<'a> {
    text: &'a str,
    segments: Vec<Segment<'a>>,
    char_len: usize,
}

impl<'a> SegmentTable<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            segments: segment(text),
            char_len: text.chars().count(),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Length of the snapshot in chars.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn get(&self, index: usize) -> Option<&Segment<'a>> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment<'a>> {
        self.segments.iter()
    }

    /// Index of the unit containing the char offset.
    pub fn index_at(&self, offset: usize) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| s.start <= offset && offset < s.end)
    }

    /// Locate `fragment` verbatim inside unit `index`.
    ///
    /// Returns the char span of the first occurrence, or `None` when the
    /// fragment is blank or does not occur in that unit.
    pub fn find_fragment(&self, index: usize, fragment: &str) -> Option<TextSpan> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return None;
        }
        let seg = self.segments.get(index)?;
        let byte_pos = seg.text.find(fragment)?;
        let start = seg.start + seg.text[..byte_pos].chars().count();
        TextSpan::new(start, start + fragment.chars().count())
    }
}
