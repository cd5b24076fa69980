//! Capability interface to the remote text-generation service.

use std::sync::Arc;

use async_trait::async_trait;
use punt_core::RemoteError;
use serde::Serialize;

/// A prompt pair plus sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    /// Ask the service for a bare JSON object.
    pub json_output: bool,
    pub max_tokens: Option<u32>,
}

/// Raw model output. The content is interpreted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratedReply {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

impl GeneratedReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Generates structured feedback (a JSON object) for one round.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate_feedback(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedReply, RemoteError>;
}

/// Generates the free-text reflection narrative for the export.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate_report(&self, request: &GenerateRequest) -> Result<String, RemoteError>;
}

#[async_trait]
impl<T: FeedbackGenerator + ?Sized> FeedbackGenerator for Arc<T> {
    async fn generate_feedback(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedReply, RemoteError> {
        (**self).generate_feedback(request).await
    }
}

#[async_trait]
impl<T: FeedbackGenerator + ?Sized> FeedbackGenerator for &T {
    async fn generate_feedback(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedReply, RemoteError> {
        (**self).generate_feedback(request).await
    }
}

#[async_trait]
impl<T: ReportGenerator + ?Sized> ReportGenerator for Arc<T> {
    async fn generate_report(&self, request: &GenerateRequest) -> Result<String, RemoteError> {
        (**self).generate_report(request).await
    }
}
