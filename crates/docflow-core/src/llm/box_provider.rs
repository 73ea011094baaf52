//! BoxInferenceProvider -- object-safe dynamic dispatch wrapper for
//! InferenceProvider.
//!
//! 1. Define an object-safe `InferenceProviderDyn` trait with boxed futures
//! 2. Blanket-impl `InferenceProviderDyn` for all `T: InferenceProvider`
//! 3. `BoxInferenceProvider` wraps `Arc<dyn InferenceProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use docflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::provider::InferenceProvider;

/// Object-safe version of [`InferenceProvider`] with boxed futures.
pub trait InferenceProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn model_id(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;
}

impl<T: InferenceProvider> InferenceProviderDyn for T {
    fn name(&self) -> &str {
        InferenceProvider::name(self)
    }

    fn model_id(&self) -> &str {
        InferenceProvider::model_id(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased inference provider for runtime backend selection.
///
/// Cloning is cheap: the classify and extract handlers share one backend.
#[derive(Clone)]
pub struct BoxInferenceProvider {
    inner: Arc<dyn InferenceProviderDyn>,
}

impl BoxInferenceProvider {
    /// Wrap a concrete `InferenceProvider`.
    pub fn new<T: InferenceProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Arc::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    /// Send a completion request and receive the full response.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }
}

impl std::fmt::Debug for BoxInferenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxInferenceProvider")
            .field("name", &self.name())
            .field("model_id", &self.model_id())
            .finish()
    }
}
