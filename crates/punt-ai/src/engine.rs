//! Feedback rounds for one session against one assignment.
//!
//! A round is guarded locally, reserves a token, calls the generator with the
//! prompt for the current text, and interprets the reply against the exact
//! snapshot that was sent. Only a usable reply is committed; every other
//! outcome drops the reservation, which refunds the token.

use std::time::Duration;

use chrono::Utc;
use punt_core::{
    AssignmentConfig, FeedbackError, FeedbackItem, FeedbackRound, FeedbackStatus, RemoteError,
    SessionState, ValidationError,
};
use tracing::{info, warn};

use crate::generator::{FeedbackGenerator, GenerateRequest, GeneratedReply};
use crate::interpret::interpret;
use crate::prompt::{MAX_FEEDBACK_ITEMS, PromptContext, compose};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound on one generator call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Items kept per round; never more than [`MAX_FEEDBACK_ITEMS`].
    pub max_items: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            max_items: MAX_FEEDBACK_ITEMS,
        }
    }
}

pub struct FeedbackEngine<G> {
    generator: G,
    assignment: AssignmentConfig,
    session: SessionState,
    options: EngineOptions,
}

impl<G: FeedbackGenerator> FeedbackEngine<G> {
    pub fn new(generator: G, assignment: AssignmentConfig, session: SessionState) -> Self {
        Self {
            generator,
            assignment,
            session,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn assignment(&self) -> &AssignmentConfig {
        &self.assignment
    }

    pub fn into_session(self) -> SessionState {
        self.session
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), ValidationError> {
        self.session.set_text(text)
    }

    pub fn record_paste(&mut self, pasted: &str) -> bool {
        self.session.record_paste(pasted)
    }

    pub fn accept(&mut self, round: u8, item_id: &str) -> Result<(), ValidationError> {
        self.session
            .set_item_status(round, item_id, FeedbackStatus::Accepted)
    }

    pub fn reject(&mut self, round: u8, item_id: &str) -> Result<(), ValidationError> {
        self.session
            .set_item_status(round, item_id, FeedbackStatus::Rejected)
    }

    /// Open items to highlight in the current text.
    pub fn highlights(&self) -> impl Iterator<Item = &FeedbackItem> {
        self.session.highlights()
    }

    /// Run one feedback round.
    ///
    /// Guards are checked in order (tokens, text, criteria) before anything is
    /// sent. On success the round is appended to history and returned.
    pub async fn request_feedback(&mut self) -> Result<&FeedbackRound, FeedbackError> {
        if self.session.tokens_remaining() == 0 {
            return Err(ValidationError::TokenExhausted.into());
        }
        if self.session.text().trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if !self.assignment.has_rubric() {
            return Err(ValidationError::EmptyRubric.into());
        }

        let code = self.session.code().to_string();
        let round_number = self.session.next_round_number();
        let snapshot = self.session.text().to_string();
        let prior = self.session.prior_feedback();
        let request = compose(&PromptContext {
            text: &snapshot,
            assignment_text: &self.assignment.assignment_text,
            niveau: self.assignment.level,
            criteria: &self.assignment.criteria,
            round: round_number,
            prior: &prior,
        });

        let reservation = self.session.reserve()?;
        info!(%code, round = round_number, "requesting feedback");

        let reply = match call(&self.generator, &request, self.options.timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%code, round = round_number, error = %e, "feedback request failed, token refunded");
                return Err(e.into());
            }
        };

        let mut result = interpret(
            &reply.text,
            &snapshot,
            &self.assignment.criteria,
            round_number,
        );
        if result.malformed {
            warn!(%code, round = round_number, "unusable feedback reply, token refunded");
            return Err(FeedbackError::MalformedResponse(preview(&reply.text)));
        }

        let cap = self.options.max_items.min(MAX_FEEDBACK_ITEMS);
        if result.items.len() > cap {
            result.truncated += result.items.len() - cap;
            result.items.truncate(cap);
        }
        let rejected_candidates = result.dropped();

        let round = FeedbackRound {
            round_number,
            feedback_items: result.items,
            checklist: result.checklist,
            text_snapshot: snapshot,
            requested_at: Utc::now().to_rfc3339(),
            rejected_candidates,
        };
        info!(
            %code,
            round = round_number,
            items = round.feedback_items.len(),
            checklist_met = round.checklist_met(),
            rejected = rejected_candidates,
            tokens_used = ?reply.tokens_used,
            "feedback round recorded"
        );

        let index = reservation.commit(round);
        Ok(&self.session.history()[index])
    }
}

async fn call<G: FeedbackGenerator>(
    generator: &G,
    request: &GenerateRequest,
    timeout: Option<Duration>,
) -> Result<GeneratedReply, RemoteError> {
    let reply = match timeout {
        Some(limit) => tokio::time::timeout(limit, generator.generate_feedback(request))
            .await
            .map_err(|_| RemoteError::Timeout(limit))??,
        None => generator.generate_feedback(request).await?,
    };
    if reply.text.trim().is_empty() {
        return Err(RemoteError::EmptyContent);
    }
    Ok(reply)
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use punt_core::{ChecklistResult, Criterion, Niveau, RoundPhase};

    use super::*;

    const TEXT: &str = "Ik ga morgen naar school. Het weer is mooi.";

    const TWO_ITEMS: &str = r#"{
        "checklistResults": [{"id": "c1", "label": "heeft een titel", "met": false, "explanation": "Geen titel."}],
        "feedbackItems": [
            {"sentence": 1, "category": "content", "criterionLabel": "onderbouwing", "hint": "Leg uit waarom."},
            {"sentence": 2, "category": "grammar", "criterionLabel": "onderbouwing", "hint": "Kijk naar de zinsbouw."}
        ]
    }"#;

    const NOTHING_NEW: &str = r#"{
        "checklistResults": [{"id": "c1", "label": "heeft een titel", "met": false, "explanation": "Nog steeds geen titel."}],
        "feedbackItems": []
    }"#;

    const TITLE_MET: &str = r#"{
        "checklistResults": [{"id": "c1", "met": true, "explanation": "De titel staat erboven."}],
        "feedbackItems": []
    }"#;

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, RemoteError>>>,
        requests: Mutex<Vec<GenerateRequest>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedbackGenerator for Scripted {
        async fn generate_feedback(
            &self,
            request: &GenerateRequest,
        ) -> Result<GeneratedReply, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or(Err(RemoteError::EmptyContent))
                .map(GeneratedReply::from_text)
        }
    }

    struct Stalled {
        delay: Option<Duration>,
    }

    #[async_trait]
    impl FeedbackGenerator for Stalled {
        async fn generate_feedback(
            &self,
            _request: &GenerateRequest,
        ) -> Result<GeneratedReply, RemoteError> {
            match self.delay {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
            Ok(GeneratedReply::from_text(NOTHING_NEW))
        }
    }

    fn assignment() -> AssignmentConfig {
        AssignmentConfig {
            level: Niveau::F2,
            assignment_text: "Schrijf een brief aan de gemeente over de speeltuin.".into(),
            criteria: vec![
                Criterion::checklist("c1", "heeft een titel", "Boven de tekst staat een titel."),
                Criterion::rubric("r1", "onderbouwing", "Argumenten worden uitgelegd."),
            ],
        }
    }

    fn engine<G: FeedbackGenerator>(generator: G) -> FeedbackEngine<G> {
        let mut session = SessionState::new("ABCD2345");
        session.set_text(TEXT).unwrap();
        FeedbackEngine::new(generator, assignment(), session)
    }

    fn assert_untouched(session: &SessionState) {
        assert_eq!(session.tokens_remaining(), 3);
        assert!(session.history().is_empty());
        assert!(session.first_feedback_version().is_none());
        assert_eq!(session.phase(), RoundPhase::Idle);
    }

    #[tokio::test]
    async fn first_round_with_two_items() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS)]);
        let mut engine = engine(Arc::clone(&generator));

        let round = engine.request_feedback().await.unwrap();
        assert_eq!(round.round_number, 1);
        assert_eq!(round.feedback_items.len(), 2);
        assert_eq!(round.checklist.len(), 1);
        assert!(!round.checklist[0].met);
        assert_eq!(round.text_snapshot, TEXT);
        for item in &round.feedback_items {
            assert!(item.span.fits(TEXT.chars().count()));
        }

        let session = engine.session();
        assert_eq!(session.tokens_remaining(), 2);
        assert_eq!(session.first_feedback_version(), Some(TEXT));
        assert_eq!(session.phase(), RoundPhase::Idle);
        assert_eq!(engine.highlights().count(), 2);

        let request = &generator.requests.lock().unwrap()[0];
        assert!(request.json_output);
        assert!(request.user_prompt.contains("[1] Ik ga morgen naar school."));
    }

    #[tokio::test]
    async fn zero_tokens_never_calls_generator() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS), Ok(NOTHING_NEW), Ok(NOTHING_NEW)]);
        let mut engine = engine(Arc::clone(&generator));
        for _ in 0..3 {
            engine.request_feedback().await.unwrap();
        }
        assert_eq!(engine.session().tokens_remaining(), 0);

        let err = engine.request_feedback().await.unwrap_err();
        assert_eq!(err, FeedbackError::Validation(ValidationError::TokenExhausted));
        assert_eq!(generator.calls(), 3);
        assert_eq!(engine.session().history().len(), 3);
    }

    #[tokio::test]
    async fn local_guards_run_before_any_call() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS)]);

        let mut blank = engine(Arc::clone(&generator));
        blank.set_text("   \n ").unwrap();
        let err = blank.request_feedback().await.unwrap_err();
        assert_eq!(err, FeedbackError::Validation(ValidationError::EmptyText));
        assert_untouched(blank.session());

        let mut assignment = assignment();
        for c in &mut assignment.criteria {
            c.selected = false;
        }
        let mut session = SessionState::new("ABCD2345");
        session.set_text(TEXT).unwrap();
        let mut no_rubric = FeedbackEngine::new(Arc::clone(&generator), assignment, session);
        let err = no_rubric.request_feedback().await.unwrap_err();
        assert_eq!(err, FeedbackError::Validation(ValidationError::EmptyRubric));
        assert_untouched(no_rubric.session());

        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn remote_failure_refunds_token() {
        let generator = Scripted::new(vec![Err(RemoteError::Unavailable("connection reset".into()))]);
        let mut engine = engine(Arc::clone(&generator));

        let err = engine.request_feedback().await.unwrap_err();
        assert!(matches!(err, FeedbackError::RemoteUnavailable(RemoteError::Unavailable(_))));
        assert!(err.is_retryable());
        assert_untouched(engine.session());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_refunds_token() {
        let generator = Scripted::new(vec![Ok("Ik weet het niet zo goed."), Ok(TWO_ITEMS)]);
        let mut engine = engine(Arc::clone(&generator));

        let err = engine.request_feedback().await.unwrap_err();
        assert!(matches!(err, FeedbackError::MalformedResponse(_)));
        assert_untouched(engine.session());

        let round = engine.request_feedback().await.unwrap();
        assert_eq!(round.round_number, 1);
    }

    #[tokio::test]
    async fn blank_reply_is_a_remote_failure() {
        let generator = Scripted::new(vec![Ok("  ")]);
        let mut engine = engine(generator);
        let err = engine.request_feedback().await.unwrap_err();
        assert_eq!(err, FeedbackError::RemoteUnavailable(RemoteError::EmptyContent));
        assert_untouched(engine.session());
    }

    #[tokio::test]
    async fn second_round_with_nothing_new() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS), Ok(NOTHING_NEW)]);
        let mut engine = engine(Arc::clone(&generator));
        engine.request_feedback().await.unwrap();
        engine.accept(1, "r1-1").unwrap();

        let revised = "Morgen ga ik naar school omdat ik toets heb. Het weer is mooi.";
        engine.set_text(revised).unwrap();
        assert_eq!(engine.highlights().count(), 0);

        let round = engine.request_feedback().await.unwrap();
        assert_eq!(round.round_number, 2);
        assert!(round.feedback_items.is_empty());
        assert_eq!(round.checklist[0].explanation, "Nog steeds geen titel.");

        let session = engine.session();
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.tokens_remaining(), 1);
        assert_eq!(session.first_feedback_version(), Some(TEXT));

        let requests = generator.requests.lock().unwrap();
        assert!(!requests[0].user_prompt.contains("EERDER GEGEVEN FEEDBACK"));
        assert!(requests[1].user_prompt.contains("EERDER GEGEVEN FEEDBACK"));
        assert!(requests[1].user_prompt.contains("Leg uit waarom."));
        assert!(requests[1].user_prompt.contains("[1] Morgen ga ik naar school"));
    }

    #[tokio::test]
    async fn same_text_and_reply_give_same_checklist() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS), Ok(TWO_ITEMS)]);
        let mut engine = engine(generator);
        let first = engine.request_feedback().await.unwrap().checklist.clone();
        let second = engine.request_feedback().await.unwrap().checklist.clone();

        assert_eq!(first, second);
        let history = engine.session().history();
        assert_eq!(history[0].text_snapshot, history[1].text_snapshot);
    }

    #[tokio::test]
    async fn checklist_is_replaced_each_round() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS), Ok(TITLE_MET)]);
        let mut engine = engine(generator);
        engine.request_feedback().await.unwrap();
        let checklist = engine.request_feedback().await.unwrap().checklist.clone();

        assert_eq!(
            checklist,
            vec![ChecklistResult {
                id: "c1".into(),
                label: "heeft een titel".into(),
                met: true,
                explanation: "De titel staat erboven.".into(),
            }]
        );
        let session = engine.session();
        assert!(!session.history()[0].checklist[0].met);
        assert_eq!(session.last_checklist(), checklist.as_slice());
    }

    #[tokio::test]
    async fn timeout_refunds_token() {
        let mut engine = engine(Stalled {
            delay: Some(Duration::from_secs(5)),
        })
        .with_options(EngineOptions {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        });

        let err = engine.request_feedback().await.unwrap_err();
        assert_eq!(
            err,
            FeedbackError::RemoteUnavailable(RemoteError::Timeout(Duration::from_millis(20)))
        );
        assert_untouched(engine.session());
    }

    #[tokio::test]
    async fn cancelled_request_refunds_token() {
        let mut engine = engine(Stalled { delay: None }).with_options(EngineOptions {
            timeout: None,
            ..Default::default()
        });

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), engine.request_feedback()).await;
        assert!(outcome.is_err());
        assert_untouched(engine.session());
    }

    #[tokio::test]
    async fn max_items_option_caps_round() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS)]);
        let mut engine = engine(generator).with_options(EngineOptions {
            max_items: 1,
            ..Default::default()
        });
        let round = engine.request_feedback().await.unwrap();
        assert_eq!(round.feedback_items.len(), 1);
        assert_eq!(round.rejected_candidates, 1);
    }

    #[tokio::test]
    async fn review_actions_target_round_and_item() {
        let generator = Scripted::new(vec![Ok(TWO_ITEMS)]);
        let mut engine = engine(generator);
        engine.request_feedback().await.unwrap();

        engine.reject(1, "r1-2").unwrap();
        let open: Vec<&str> = engine.highlights().map(|i| i.id.as_str()).collect();
        assert_eq!(open, vec!["r1-1"]);

        let err = engine.accept(2, "r1-1").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownItem {
                round: 2,
                id: "r1-1".into()
            }
        );
    }
}
