//! Feedback pipeline: prompt composition, reply interpretation, round orchestration, reflection reports.
//!
//! The remote text-generation service is reached only through the
//! [`FeedbackGenerator`] and [`ReportGenerator`] traits; vendor adapters live
//! outside this crate.

pub mod document;
pub mod engine;
pub mod generator;
pub mod interpret;
pub mod prompt;
pub mod report;
pub mod suggest;

pub use document::{
    IntegrityFlags, ReportDocument, ReportMetadata, RoundSummary, VersionComparison, export_report,
};
pub use engine::{EngineOptions, FeedbackEngine};
pub use generator::{FeedbackGenerator, GenerateRequest, GeneratedReply, ReportGenerator};
pub use interpret::{Interpretation, RejectReason, Rejection, interpret};
pub use prompt::{MAX_FEEDBACK_ITEMS, PromptContext, PromptTemplate, compose};
pub use report::{
    FeedbackUptake, NARRATIVE_FALLBACK, Narrative, ReportContext, compose_report_prompt,
    feedback_uptake, scrub_verbatim, synthesize_narrative,
};
pub use suggest::suggest_criteria;
