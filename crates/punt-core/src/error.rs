use std::time::Duration;

use thiserror::Error;

/// Local validation failures, rejected before any remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no feedback tokens remaining")]
    TokenExhausted,

    #[error("text is empty; write something before requesting feedback")]
    EmptyText,

    #[error("the assignment has no selected criteria")]
    EmptyRubric,

    #[error("assignment text is empty")]
    EmptyAssignment,

    #[error("invalid or expired code: {0}")]
    InvalidCode(String),

    #[error("text has {words} words (limit {limit})")]
    WordLimit { words: usize, limit: usize },

    #[error("no feedback item {id} in round {round}")]
    UnknownItem { round: u8, id: String },

    #[error("a feedback request is already in flight")]
    RequestInFlight,
}

/// Failures of the remote text-generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("generation service unreachable: {0}")]
    Unavailable(String),

    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation service returned no content")]
    EmptyContent,
}

/// Everything `request_feedback` can surface to the caller.
///
/// Validation errors leave the session untouched. Remote and malformed-reply
/// errors refund the reserved token and append nothing to history.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedbackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(#[from] RemoteError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FeedbackError {
    /// Whether the same request may succeed when retried by the user.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}
