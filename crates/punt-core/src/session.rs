//! Per-student session state: text, token budget, feedback history, integrity signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::feedback::{ChecklistResult, FeedbackItem, FeedbackRound, FeedbackStatus, PriorFeedback};
use crate::ValidationError;

/// Feedback requests granted per session.
pub const FEEDBACK_TOKENS: u8 = 3;

/// Word limit for student text.
pub const MAX_WORDS: usize = 1000;

/// A single paste of at least this many chars counts as a large paste.
pub const LARGE_PASTE_CHARS: usize = 100;

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    #[default]
    Idle,
    AwaitingResponse,
}

/// State owned by one student session.
///
/// Serialisable so the caller can keep it in a key-value store between
/// requests. The in-flight phase is transient and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    code: String,
    text: String,
    feedback_tokens_remaining: u8,
    first_feedback_version: Option<String>,
    history: Vec<FeedbackRound>,
    /// RFC 3339 timestamp.
    started_at: String,
    large_paste_detected: bool,
    #[serde(skip)]
    phase: RoundPhase,
}

impl SessionState {
    pub fn new(code: impl Into<String>) -> Self {
        Self::started(code, Utc::now())
    }

    pub fn started(code: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            text: String::new(),
            feedback_tokens_remaining: FEEDBACK_TOKENS,
            first_feedback_version: None,
            history: Vec::new(),
            started_at: started_at.to_rfc3339(),
            large_paste_detected: false,
            phase: RoundPhase::Idle,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens_remaining(&self) -> u8 {
        self.feedback_tokens_remaining
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Text as it was when the first feedback round succeeded.
    pub fn first_feedback_version(&self) -> Option<&str> {
        self.first_feedback_version.as_deref()
    }

    pub fn history(&self) -> &[FeedbackRound] {
        &self.history
    }

    pub fn last_round(&self) -> Option<&FeedbackRound> {
        self.history.last()
    }

    pub fn last_checklist(&self) -> &[ChecklistResult] {
        self.history
            .last()
            .map(|r| r.checklist.as_slice())
            .unwrap_or_default()
    }

    pub fn next_round_number(&self) -> u8 {
        self.history.len() as u8 + 1
    }

    pub fn feedback_requested(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn large_paste_detected(&self) -> bool {
        self.large_paste_detected
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// Whole minutes since the session started; 0 if the start time is unreadable.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        DateTime::parse_from_rfc3339(&self.started_at)
            .map(|start| (now - start.with_timezone(&Utc)).num_minutes().max(0))
            .unwrap_or(0)
    }

    /// Replace the student text, enforcing the word limit.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), ValidationError> {
        let text = text.into();
        let words = count_words(&text);
        if words > MAX_WORDS {
            return Err(ValidationError::WordLimit {
                words,
                limit: MAX_WORDS,
            });
        }
        self.text = text;
        Ok(())
    }

    /// Note a paste event. Returns true when it counted as a large paste.
    pub fn record_paste(&mut self, pasted: &str) -> bool {
        let large = pasted.chars().count() >= LARGE_PASTE_CHARS;
        if large {
            debug!(code = %self.code, chars = pasted.chars().count(), "large paste detected");
            self.large_paste_detected = true;
        }
        large
    }

    /// Open items of the latest round, only while the text still matches its snapshot.
    ///
    /// Spans are not valid across edits, so any change to the text hides them.
    pub fn highlights(&self) -> impl Iterator<Item = &FeedbackItem> {
        self.history
            .last()
            .filter(|r| r.text_snapshot == self.text)
            .into_iter()
            .flat_map(|r| r.feedback_items.iter())
            .filter(|i| i.status == FeedbackStatus::Open)
    }

    /// Accept or reject an item of an earlier round.
    pub fn set_item_status(
        &mut self,
        round: u8,
        item_id: &str,
        status: FeedbackStatus,
    ) -> Result<(), ValidationError> {
        let item = self
            .history
            .iter_mut()
            .find(|r| r.round_number == round)
            .and_then(|r| r.feedback_items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| ValidationError::UnknownItem {
                round,
                id: item_id.to_string(),
            })?;
        item.status = status;
        Ok(())
    }

    /// Everything said so far, for the "do not repeat" list of later rounds.
    pub fn prior_feedback(&self) -> Vec<PriorFeedback> {
        self.history
            .iter()
            .flat_map(|r| {
                r.feedback_items.iter().map(move |i| PriorFeedback {
                    round: r.round_number,
                    sentence_index: i.sentence_index,
                    criterion_label: i.criterion_label.clone(),
                    category: i.category,
                    hint: i.hint.clone(),
                    status: i.status,
                })
            })
            .collect()
    }

    /// Take one token for a round about to be requested.
    ///
    /// The token comes back automatically unless the reservation is committed.
    pub fn reserve(&mut self) -> Result<TokenReservation<'_>, ValidationError> {
        if self.phase == RoundPhase::AwaitingResponse {
            return Err(ValidationError::RequestInFlight);
        }
        if self.feedback_tokens_remaining == 0 {
            return Err(ValidationError::TokenExhausted);
        }
        self.feedback_tokens_remaining -= 1;
        self.phase = RoundPhase::AwaitingResponse;
        Ok(TokenReservation {
            session: self,
            committed: false,
        })
    }

    fn append_round(&mut self, round: FeedbackRound) -> usize {
        if self.first_feedback_version.is_none() {
            self.first_feedback_version = Some(round.text_snapshot.clone());
        }
        self.history.push(round);
        self.history.len() - 1
    }
}

/// A token held for one in-flight round.
///
/// Dropping it without [`commit`](Self::commit) (error, timeout, cancelled
/// future) refunds the token and leaves history untouched.
#[must_use = "dropping a reservation refunds the token"]
pub struct TokenReservation<'a> {
    session: &'a mut SessionState,
    committed: bool,
}

impl TokenReservation<'_> {
    /// Spend the token and append the round. Returns its index in history.
    pub fn commit(mut self, round: FeedbackRound) -> usize {
        self.committed = true;
        self.session.append_round(round)
    }
}

impl Drop for TokenReservation<'_> {
    fn drop(&mut self) {
        self.session.phase = RoundPhase::Idle;
        if !self.committed {
            self.session.feedback_tokens_remaining += 1;
            debug!(
                code = %self.session.code,
                tokens = self.session.feedback_tokens_remaining,
                "feedback token refunded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackCategory, HighlightColor, TextSpan};

    fn round(number: u8, text: &str) -> FeedbackRound {
        FeedbackRound {
            round_number: number,
            feedback_items: vec![FeedbackItem {
                id: format!("r{number}-1"),
                span: TextSpan { start: 0, end: 2 },
                sentence_index: 0,
                category: FeedbackCategory::Content,
                criterion_label: "Gebruik van voorbeelden".into(),
                hint: "Voeg een voorbeeld toe.".into(),
                color: HighlightColor::Yellow,
                status: FeedbackStatus::Open,
            }],
            checklist: vec![],
            text_snapshot: text.into(),
            requested_at: "2026-10-18T10:00:00+00:00".into(),
            rejected_candidates: 0,
        }
    }

    #[test]
    fn new_session_has_three_tokens() {
        let s = SessionState::new("ABCD1234");
        assert_eq!(s.tokens_remaining(), 3);
        assert_eq!(s.next_round_number(), 1);
        assert!(!s.feedback_requested());
        assert!(s.first_feedback_version().is_none());
    }

    #[test]
    fn dropped_reservation_refunds() {
        let mut s = SessionState::new("X");
        {
            let _r = s.reserve().unwrap();
        }
        assert_eq!(s.tokens_remaining(), 3);
        assert_eq!(s.phase(), RoundPhase::Idle);
        assert!(s.history().is_empty());
    }

    #[test]
    fn committed_reservation_spends_and_snapshots_once() {
        let mut s = SessionState::new("X");
        s.reserve().unwrap().commit(round(1, "Versie een."));
        s.reserve().unwrap().commit(round(2, "Versie twee."));
        assert_eq!(s.tokens_remaining(), 1);
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.first_feedback_version(), Some("Versie een."));
    }

    #[test]
    fn reserve_fails_when_exhausted() {
        let mut s = SessionState::new("X");
        for n in 1..=3 {
            s.reserve().unwrap().commit(round(n, "Tekst."));
        }
        assert_eq!(s.reserve().err(), Some(ValidationError::TokenExhausted));
        assert_eq!(s.tokens_remaining(), 0);
    }

    #[test]
    fn word_limit_enforced() {
        let mut s = SessionState::new("X");
        let long = "woord ".repeat(MAX_WORDS + 1);
        assert!(matches!(s.set_text(long), Err(ValidationError::WordLimit { .. })));
        assert!(s.text().is_empty());
        s.set_text("woord ".repeat(MAX_WORDS)).unwrap();
    }

    #[test]
    fn highlights_hidden_after_edit() {
        let mut s = SessionState::new("X");
        s.set_text("Tekst.").unwrap();
        s.reserve().unwrap().commit(round(1, "Tekst."));
        assert_eq!(s.highlights().count(), 1);
        s.set_text("Tekst. Meer.").unwrap();
        assert_eq!(s.highlights().count(), 0);
    }

    #[test]
    fn status_update_and_unknown_item() {
        let mut s = SessionState::new("X");
        s.set_text("Tekst.").unwrap();
        s.reserve().unwrap().commit(round(1, "Tekst."));
        s.set_item_status(1, "r1-1", FeedbackStatus::Accepted).unwrap();
        assert_eq!(s.highlights().count(), 0);
        assert_eq!(s.prior_feedback()[0].status, FeedbackStatus::Accepted);
        assert!(s.set_item_status(2, "r1-1", FeedbackStatus::Rejected).is_err());
    }

    #[test]
    fn paste_threshold() {
        let mut s = SessionState::new("X");
        assert!(!s.record_paste("kort"));
        assert!(!s.large_paste_detected());
        assert!(s.record_paste(&"x".repeat(LARGE_PASTE_CHARS)));
        assert!(s.large_paste_detected());
    }

    #[test]
    fn elapsed_minutes_from_start() {
        let start = DateTime::parse_from_rfc3339("2026-10-18T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let s = SessionState::started("X", start);
        let now = start + chrono::Duration::minutes(42);
        assert_eq!(s.elapsed_minutes(now), 42);
    }

    #[test]
    fn phase_is_not_persisted() {
        let s = SessionState::new("X");
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("phase").is_none());
        assert_eq!(json["feedbackTokensRemaining"], 3);
    }
}
