use punt_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("student count must be at least 1")]
    NoStudents,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
