//! Step handlers: the external operations a workflow step delegates to.
//!
//! `StepHandler` uses RPITIT and so cannot be a trait object directly. The
//! same blanket-impl pattern as the inference provider applies:
//! `StepHandlerDyn` boxes the future, `BoxStepHandler` wraps the trait
//! object, and `HandlerRegistry` maps handler names to boxed handlers at
//! construction time so unknown names are caught before any run starts.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use docflow_types::document::Document;
use docflow_types::error::ErrorClass;
use docflow_types::llm::LlmError;

use super::context::WorkflowContext;
use super::retry::RetryClassify;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Failure of a single handler attempt.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("inference failed: {0}")]
    Inference(#[from] LlmError),

    #[error("step '{step}' timed out after {}ms", .after.as_millis())]
    Timeout { step: String, after: Duration },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("{0}")]
    Failed(String),
}

impl RetryClassify for StepError {
    fn class(&self) -> ErrorClass {
        match self {
            StepError::Inference(_) => ErrorClass::Inference,
            StepError::Timeout { .. } => ErrorClass::Timeout,
            StepError::Parse(_) => ErrorClass::Parse,
            StepError::MissingInput(_) => ErrorClass::MissingInput,
            StepError::Failed(_) => ErrorClass::Handler,
        }
    }

    /// Inference errors carry the provider's verdict. Malformed output and
    /// missing inputs will not change on a second attempt.
    fn retryable_override(&self) -> Option<bool> {
        match self {
            StepError::Inference(e) => Some(e.is_retryable()),
            StepError::Parse(_) | StepError::MissingInput(_) => Some(false),
            StepError::Timeout { .. } | StepError::Failed(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

/// What a successful handler hands back to the engine.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Recorded as the step's output snapshot.
    pub output: Value,
    /// Keys to write into the shared context once the step completes.
    pub context_updates: Map<String, Value>,
    /// Recorded on the step record (token counts, latency, model).
    pub metrics: HashMap<String, Value>,
}

impl StepOutcome {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            context_updates: Map::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

/// An operation a step delegates to.
///
/// Handlers must not hold per-run state: one instance serves every run of
/// every workflow that references it, possibly concurrently.
pub trait StepHandler: Send + Sync {
    fn execute<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> impl Future<Output = Result<StepOutcome, StepError>> + Send + 'a;
}

/// Object-safe version of [`StepHandler`] with a boxed future.
pub trait StepHandlerDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, StepError>> + Send + 'a>>;
}

impl<T: StepHandler> StepHandlerDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, StepError>> + Send + 'a>> {
        Box::pin(self.execute(document, context))
    }
}

/// Type-erased, cheaply clonable step handler.
#[derive(Clone)]
pub struct BoxStepHandler {
    inner: Arc<dyn StepHandlerDyn>,
}

impl BoxStepHandler {
    pub fn new<T: StepHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub async fn execute(
        &self,
        document: &Document,
        context: WorkflowContext<'_>,
    ) -> Result<StepOutcome, StepError> {
        self.inner.execute_boxed(document, context).await
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Construction-time lookup table from handler name to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, BoxStepHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register<T: StepHandler + 'static>(&mut self, name: impl Into<String>, handler: T) {
        self.handlers.insert(name.into(), BoxStepHandler::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: StepHandler + 'static>(mut self, name: impl Into<String>, handler: T) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxStepHandler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_types::workflow::WorkflowState;
    use serde_json::json;

    struct Echo;

    impl StepHandler for Echo {
        async fn execute<'a>(
            &'a self,
            document: &'a Document,
            context: WorkflowContext<'a>,
        ) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::new(json!({"doc": document.id, "run": context.subject_id()}))
                .with_context("echoed", true)
                .with_metric("calls", 1))
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let registry = HandlerRegistry::new().with("echo", Echo);
        assert!(registry.contains("echo"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.names(), vec!["echo"]);

        let doc = Document::from_text("doc-1", "text");
        let state = WorkflowState::new("doc-1", "wf", ["a"]);
        let outcome = registry
            .get("echo")
            .unwrap()
            .execute(&doc, WorkflowContext::new(&state))
            .await
            .unwrap();
        assert_eq!(outcome.output["doc"], "doc-1");
        assert_eq!(outcome.context_updates["echoed"], true);
        assert_eq!(outcome.metrics["calls"], 1);
    }

    #[test]
    fn test_step_error_classification() {
        let transient = StepError::from(LlmError::Overloaded("busy".into()));
        assert_eq!(transient.class(), ErrorClass::Inference);
        assert_eq!(transient.retryable_override(), Some(true));

        let auth = StepError::from(LlmError::AuthenticationFailed);
        assert_eq!(auth.retryable_override(), Some(false));

        let timeout = StepError::Timeout {
            step: "classify".into(),
            after: Duration::from_millis(50),
        };
        assert_eq!(timeout.class(), ErrorClass::Timeout);
        assert_eq!(timeout.retryable_override(), None);
        assert!(timeout.to_string().contains("50ms"));

        assert_eq!(StepError::Parse("bad".into()).retryable_override(), Some(false));
        assert_eq!(StepError::Failed("boom".into()).class(), ErrorClass::Handler);
    }
}
