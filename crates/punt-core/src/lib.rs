//! Core types for the PUNT! writing environment: criteria, feedback rounds, session state, segmentation.

pub mod assignment;
pub mod error;
pub mod feedback;
pub mod niveau;
pub mod rubric;
pub mod segment;
pub mod session;

pub use assignment::{AssignmentConfig, Criterion, CriterionOrigin};
pub use error::{FeedbackError, RemoteError, ValidationError};
pub use feedback::{
    ChecklistResult, FeedbackCategory, FeedbackItem, FeedbackRound, FeedbackStatus,
    HighlightColor, PriorFeedback, TextSpan,
};
pub use niveau::Niveau;
pub use rubric::{RubricCatalog, RubricGroup};
pub use segment::{Segment, SegmentTable, segment};
pub use session::{RoundPhase, SessionState, TokenReservation, count_words};
