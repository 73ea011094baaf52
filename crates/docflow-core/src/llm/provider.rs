//! InferenceProvider trait definition.
//!
//! This is the abstraction every inference backend implements. Pipeline
//! handlers call it; the workflow engine never does.

use docflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for inference backends (Bedrock, mock, ...).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Wrap in
/// [`BoxInferenceProvider`](super::BoxInferenceProvider) for dynamic dispatch.
///
/// Failures are reported as [`LlmError`], whose `is_retryable()` tells the
/// retry executor whether another attempt is worthwhile.
pub trait InferenceProvider: Send + Sync {
    /// Human-readable provider name (e.g., "bedrock", "mock").
    fn name(&self) -> &str;

    /// Model identifier requests are served by.
    fn model_id(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
