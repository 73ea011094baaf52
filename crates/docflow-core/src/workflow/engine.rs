//! Sequential workflow engine.
//!
//! `WorkflowEngine` runs a validated `WorkflowDefinition` against one
//! document at a time. Steps execute strictly in declared order. Each step
//! is gated on its condition and on the status of its dependencies, its
//! handler runs inside the retry executor (with the step timeout applied to
//! every attempt), and a failure after retries is resolved by the step's
//! error policy.
//!
//! `process` never returns an error: processing failures end up in the
//! `WorkflowResult`. Structural problems (unknown handler, duplicate step,
//! bad dependency) are rejected by `WorkflowEngine::new`.
//!
//! The engine holds no per-run state, so a single instance can serve many
//! concurrent runs; each run owns its `WorkflowState`.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use tracing::{Instrument, debug, error, info, info_span, warn};

use docflow_types::document::Document;
use docflow_types::workflow::{
    ErrorPolicy, RunStatus, StepStatus, WorkflowResult, WorkflowState, WorkflowStep,
};

use super::context::{WorkflowContext, apply_updates, seed_context};
use super::definition::{StepDefinition, WorkflowDefinition, WorkflowError};
use super::handler::{BoxStepHandler, HandlerRegistry, StepError, StepOutcome};
use super::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    definition: Arc<WorkflowDefinition>,
    handlers: HandlerRegistry,
    retry: RetryPolicy,
}

impl WorkflowEngine {
    /// Build an engine, checking the definition and resolving every step's
    /// handler reference against `handlers`.
    pub fn new(
        definition: WorkflowDefinition,
        handlers: HandlerRegistry,
        retry: RetryPolicy,
    ) -> Result<Self, WorkflowError> {
        definition.validate()?;
        for step in &definition.steps {
            if !handlers.contains(&step.handler) {
                return Err(WorkflowError::UnknownHandler {
                    step: step.name.clone(),
                    handler: step.handler.clone(),
                });
            }
        }

        info!(
            workflow = definition.name.as_str(),
            version = definition.version.as_str(),
            steps = ?definition.step_names().collect::<Vec<_>>(),
            "initialized workflow engine"
        );

        Ok(Self {
            definition: Arc::new(definition),
            handlers,
            retry,
        })
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run the workflow over one document.
    pub async fn process(&self, document: &Document) -> WorkflowResult {
        let mut state = WorkflowState::new(
            document.id.clone(),
            self.definition.name.clone(),
            self.definition.step_names(),
        );
        seed_context(&mut state, document);
        state.status = RunStatus::Running;

        let span = info_span!(
            "workflow_run",
            run_id = %state.run_id,
            document_id = document.id.as_str(),
            workflow = self.definition.name.as_str(),
        );

        async move {
            info!("starting workflow run");

            let error = match self.run_steps(document, &mut state).await {
                Ok(()) => None,
                Err(e) => {
                    error!(error = %e, "workflow run aborted");
                    Some(e.to_string())
                }
            };

            state.status = if error.is_none() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            state.current_step = None;
            state.completed_at = Some(Utc::now());

            let result = WorkflowResult::from_state(state, error);
            info!(
                success = result.success,
                duration_ms = result.metrics.total_duration_ms,
                completed_steps = result.metrics.completed_steps,
                step_count = result.metrics.step_count,
                "workflow run finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Process documents one after another. Each gets its own run state;
    /// a failed document does not stop the batch.
    pub async fn process_batch(&self, documents: &[Document]) -> Vec<WorkflowResult> {
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            results.push(self.process(document).await);
        }
        results
    }

    /// Process up to `limit` documents at a time. Results come back in
    /// input order; every run still has its own state and context.
    pub async fn process_batch_concurrent(
        &self,
        documents: &[Document],
        limit: usize,
    ) -> Vec<WorkflowResult> {
        futures_util::stream::iter(documents.iter().map(|document| self.process(document)))
            .buffered(limit.max(1))
            .collect()
            .await
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    async fn run_steps(
        &self,
        document: &Document,
        state: &mut WorkflowState,
    ) -> Result<(), WorkflowError> {
        for def in &self.definition.steps {
            if !def.should_run(state) {
                debug!(step = def.name.as_str(), "condition not met, skipping step");
                mark_skipped(state, &def.name, "condition not met")?;
                continue;
            }

            if let Some((dependency, status)) = unmet_dependency(state, def) {
                if def.required {
                    return Err(WorkflowError::DependencyNotSatisfied {
                        step: def.name.clone(),
                        dependency,
                        status,
                    });
                }
                debug!(
                    step = def.name.as_str(),
                    dependency = dependency.as_str(),
                    status = %status,
                    "dependency not satisfied, skipping optional step"
                );
                mark_skipped(state, &def.name, &format!("dependency '{dependency}' is {status}"))?;
                continue;
            }

            self.run_step(document, state, def).await?;
        }
        Ok(())
    }

    async fn run_step(
        &self,
        document: &Document,
        state: &mut WorkflowState,
        def: &StepDefinition,
    ) -> Result<(), WorkflowError> {
        let handler = self
            .handlers
            .get(&def.handler)
            .ok_or_else(|| WorkflowError::UnknownHandler {
                step: def.name.clone(),
                handler: def.handler.clone(),
            })?;

        let input = json!({
            "document_id": document.id,
            "context_keys": WorkflowContext::new(state).keys(),
        });
        state.current_step = Some(def.name.clone());
        {
            let step = step_record(state, &def.name)?;
            step.input = Some(input);
            step.transition(StepStatus::Running);
        }

        let mut attempts = 0u32;
        let result = {
            let context = WorkflowContext::new(state);
            self.retry
                .execute(|| {
                    attempts += 1;
                    run_attempt(handler, document, context, def)
                })
                .await
        };

        match result {
            Ok(outcome) => {
                let StepOutcome {
                    output,
                    context_updates,
                    metrics,
                } = outcome;
                let applied = apply_updates(state, &def.name, context_updates);
                let step = step_record(state, &def.name)?;
                step.attempts = attempts;
                step.output = Some(output);
                step.metrics.extend(metrics);
                if let Err(e) = applied {
                    step.error = Some(e.to_string());
                    step.transition(StepStatus::Failed);
                    error!(
                        step = def.name.as_str(),
                        error = %e,
                        "step context updates rejected"
                    );
                    return Err(e);
                }
                step.transition(StepStatus::Completed);
                info!(
                    step = def.name.as_str(),
                    attempts,
                    duration_ms = step.duration_ms().unwrap_or_default(),
                    "step completed"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let step = step_record(state, &def.name)?;
                step.attempts = attempts;
                step.error = Some(message.clone());
                step.transition(StepStatus::Failed);
                error!(
                    step = def.name.as_str(),
                    attempts,
                    policy = %def.on_error,
                    error = %message,
                    "step failed"
                );

                match def.on_error {
                    ErrorPolicy::Fail => Err(WorkflowError::StepFailed {
                        step: def.name.clone(),
                        error: message,
                    }),
                    ErrorPolicy::Skip => {
                        step.transition(StepStatus::Skipped);
                        warn!(step = def.name.as_str(), "failed step recast as skipped");
                        Ok(())
                    }
                    ErrorPolicy::Continue => {
                        warn!(step = def.name.as_str(), "continuing after failed step");
                        Ok(())
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One handler attempt, raced against the step timeout when one is set.
async fn run_attempt(
    handler: &BoxStepHandler,
    document: &Document,
    context: WorkflowContext<'_>,
    def: &StepDefinition,
) -> Result<StepOutcome, StepError> {
    match def.timeout {
        Some(limit) => match tokio::time::timeout(limit, handler.execute(document, context)).await {
            Ok(result) => result,
            Err(_) => Err(StepError::Timeout {
                step: def.name.clone(),
                after: limit,
            }),
        },
        None => handler.execute(document, context).await,
    }
}

/// First dependency whose status neither completed nor skipped.
fn unmet_dependency(state: &WorkflowState, def: &StepDefinition) -> Option<(String, StepStatus)> {
    def.depends_on.iter().find_map(|dep| {
        let status = state
            .step(dep)
            .map(|s| s.status)
            .unwrap_or(StepStatus::Pending);
        (!status.satisfies_dependency()).then(|| (dep.clone(), status))
    })
}

fn step_record<'s>(
    state: &'s mut WorkflowState,
    name: &str,
) -> Result<&'s mut WorkflowStep, WorkflowError> {
    state
        .step_mut(name)
        .ok_or_else(|| WorkflowError::Context(format!("no record for step '{name}'")))
}

fn mark_skipped(state: &mut WorkflowState, name: &str, reason: &str) -> Result<(), WorkflowError> {
    let step = step_record(state, name)?;
    step.output = Some(json!({ "skipped_reason": reason }));
    step.transition(StepStatus::Skipped);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use docflow_types::llm::LlmError;

    use crate::workflow::handler::StepHandler;

    // -------------------------------------------------------------------
    // Test handlers
    // -------------------------------------------------------------------

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Records its name and writes `<name>_done = true` into the context.
    struct Recorder {
        name: &'static str,
        log: CallLog,
    }

    impl StepHandler for Recorder {
        async fn execute<'a>(
            &'a self,
            _document: &'a Document,
            context: WorkflowContext<'a>,
        ) -> Result<StepOutcome, StepError> {
            self.log.lock().unwrap().push(self.name.to_string());
            let seen: Vec<String> = context.keys().into_iter().map(String::from).collect();
            Ok(StepOutcome::new(json!({ "seen": seen }))
                .with_context(format!("{}_done", self.name), true)
                .with_metric("model", "test"))
        }
    }

    /// Always fails with the error produced by `make`.
    struct Failing {
        calls: Arc<AtomicU32>,
        make: fn() -> StepError,
    }

    impl StepHandler for Failing {
        async fn execute<'a>(
            &'a self,
            _document: &'a Document,
            _context: WorkflowContext<'a>,
        ) -> Result<StepOutcome, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.make)())
        }
    }

    struct Slow;

    impl StepHandler for Slow {
        async fn execute<'a>(
            &'a self,
            _document: &'a Document,
            _context: WorkflowContext<'a>,
        ) -> Result<StepOutcome, StepError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StepOutcome::default())
        }
    }

    /// Succeeds but writes more context than the run may hold.
    struct Oversized;

    impl StepHandler for Oversized {
        async fn execute<'a>(
            &'a self,
            _document: &'a Document,
            _context: WorkflowContext<'a>,
        ) -> Result<StepOutcome, StepError> {
            let chunk = "x".repeat(1_000_000);
            let outcome = (0..11).fold(StepOutcome::new(json!({})), |outcome, i| {
                outcome.with_context(format!("chunk_{i}"), chunk.clone())
            });
            Ok(outcome)
        }
    }

    fn handler_failure() -> StepError {
        StepError::Failed("boom".into())
    }

    fn terminal_failure() -> StepError {
        StepError::Inference(LlmError::AuthenticationFailed)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn recorder(name: &'static str, log: &CallLog) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
        }
    }

    fn doc() -> Document {
        Document::from_text("doc-1", "text")
    }

    fn status(result: &WorkflowResult, step: &str) -> StepStatus {
        result.state.step(step).unwrap().status
    }

    // -------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------

    #[test]
    fn test_unknown_handler_rejected_at_build() {
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "nope")]);
        let err = WorkflowEngine::new(def, HandlerRegistry::new(), RetryPolicy::no_retry())
            .err()
            .unwrap();
        assert!(matches!(err, WorkflowError::UnknownHandler { ref handler, .. } if handler == "nope"));
    }

    #[test]
    fn test_invalid_definition_rejected_at_build() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("a", "rec"), StepDefinition::new("a", "rec")],
        );
        let handlers = HandlerRegistry::new().with("rec", recorder("a", &log));
        assert!(WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).is_err());
    }

    // -------------------------------------------------------------------
    // Ordering, context, gating
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_steps_run_in_order_and_share_context() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "a"),
                StepDefinition::new("b", "b").depends_on(["a"]),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("a", recorder("a", &log))
            .with("b", recorder("b", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(result.metrics.step_count, 2);
        assert_eq!(result.metrics.completed_steps, 2);
        assert_eq!(result.state.status, RunStatus::Completed);
        assert!(result.state.current_step.is_none());
        assert!(result.state.completed_at.is_some());

        // b saw a's context write.
        let b = result.state.step("b").unwrap();
        let seen = b.output.as_ref().unwrap()["seen"].as_array().unwrap();
        assert!(seen.iter().any(|k| k == "a_done"));
        assert_eq!(b.metrics["model"], "test");
        assert_eq!(b.attempts, 1);
        assert_eq!(result.context_value("b_done"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_invoking() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "a").condition(|state| state.contains("never")),
                StepDefinition::new("b", "b").depends_on(["a"]),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("a", recorder("a", &log))
            .with("b", recorder("b", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        assert_eq!(status(&result, "a"), StepStatus::Skipped);
        // Skipped satisfies the dependency.
        assert_eq!(status(&result, "b"), StepStatus::Completed);
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_prior_category_seeds_context() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("classify", "a").condition(|s| !s.contains("document_type"))],
        );
        let handlers = HandlerRegistry::new().with("a", recorder("a", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let document = doc().with_category(docflow_types::document::DocumentCategory::Invoice);
        let result = engine.process(&document).await;
        assert_eq!(status(&result, "classify"), StepStatus::Skipped);
        assert_eq!(result.context_value("document_type"), Some(&json!("invoice")));
        assert!(log.lock().unwrap().is_empty());
    }

    // -------------------------------------------------------------------
    // Error policies
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_fail_policy_aborts_run() {
        let log = CallLog::default();
        let calls = Arc::new(AtomicU32::new(0));
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "fail"),
                StepDefinition::new("b", "b"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: calls.clone(), make: handler_failure })
            .with("b", recorder("b", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        assert_eq!(result.state.status, RunStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("'a'"));
        assert_eq!(status(&result, "a"), StepStatus::Failed);
        assert_eq!(status(&result, "b"), StepStatus::Pending);
        assert_eq!(result.state.step("a").unwrap().error.as_deref(), Some("boom"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_context_updates_fail_the_step() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "a"),
                StepDefinition::new("big", "big").on_error(ErrorPolicy::Continue),
                StepDefinition::new("c", "c"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("a", recorder("a", &log))
            .with("big", Oversized)
            .with("c", recorder("c", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        assert_eq!(result.state.status, RunStatus::Failed);
        let big = result.state.step("big").unwrap();
        assert_eq!(big.status, StepStatus::Failed);
        assert!(big.error.as_deref().unwrap().contains("exceeds maximum"));
        assert_eq!(status(&result, "c"), StepStatus::Pending);
        assert!(result.context_value("chunk_0").is_none());
        assert_eq!(result.context_value("a_done"), Some(&json!(true)));
        assert_eq!(result.metrics.completed_steps, 1);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_continue_policy_proceeds() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "fail").on_error(ErrorPolicy::Continue),
                StepDefinition::new("b", "b"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: Arc::default(), make: handler_failure })
            .with("b", recorder("b", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        assert_eq!(status(&result, "a"), StepStatus::Failed);
        assert_eq!(status(&result, "b"), StepStatus::Completed);
        assert_eq!(result.metrics.completed_steps, 1);
    }

    #[tokio::test]
    async fn test_skip_policy_recasts_failure() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "fail").on_error(ErrorPolicy::Skip),
                StepDefinition::new("b", "b").depends_on(["a"]),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: Arc::default(), make: handler_failure })
            .with("b", recorder("b", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        let a = result.state.step("a").unwrap();
        assert_eq!(a.status, StepStatus::Skipped);
        assert_eq!(a.error.as_deref(), Some("boom"));
        assert_eq!(status(&result, "b"), StepStatus::Completed);
    }

    // -------------------------------------------------------------------
    // Dependency gating
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_optional_step_with_failed_dependency_is_skipped() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "fail").on_error(ErrorPolicy::Continue),
                StepDefinition::new("b", "b").depends_on(["a"]).required(false),
                StepDefinition::new("c", "c"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: Arc::default(), make: handler_failure })
            .with("b", recorder("b", &log))
            .with("c", recorder("c", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        assert_eq!(status(&result, "b"), StepStatus::Skipped);
        assert_eq!(status(&result, "c"), StepStatus::Completed);
        assert_eq!(*log.lock().unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_required_step_with_failed_dependency_aborts() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "fail").on_error(ErrorPolicy::Continue),
                StepDefinition::new("b", "b").depends_on(["a"]),
                StepDefinition::new("c", "c"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: Arc::default(), make: handler_failure })
            .with("b", recorder("b", &log))
            .with("c", recorder("c", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("'b'") && error.contains("'a'"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_then_required_then_optional_chain() {
        // A (fail policy) -> B (required) -> C (optional, continue).
        let log = CallLog::default();
        let calls = Arc::new(AtomicU32::new(0));
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("A", "fail"),
                StepDefinition::new("B", "b").depends_on(["A"]).required(true),
                StepDefinition::new("C", "c")
                    .depends_on(["B"])
                    .required(false)
                    .on_error(ErrorPolicy::Continue),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: calls.clone(), make: handler_failure })
            .with("b", recorder("B", &log))
            .with("c", recorder("C", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("'A'"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // -------------------------------------------------------------------
    // Retry and timeout
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_retryable_failure_invokes_handler_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "fail")]);
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: calls.clone(), make: handler_failure });
        let engine = WorkflowEngine::new(def, handlers, fast_retry(3)).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.state.step("a").unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_invokes_handler_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "fail")]);
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: calls.clone(), make: terminal_failure });
        let engine = WorkflowEngine::new(def, handlers, fast_retry(3)).unwrap();

        let result = engine.process(&doc()).await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.error.as_deref().unwrap().contains("authentication failed"));
    }

    #[tokio::test]
    async fn test_timeout_treated_as_handler_failure() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("slow", "slow")
                    .timeout(Duration::from_millis(20))
                    .on_error(ErrorPolicy::Continue),
                StepDefinition::new("next", "next"),
            ],
        );
        let handlers = HandlerRegistry::new()
            .with("slow", Slow)
            .with("next", recorder("next", &log));
        let engine = WorkflowEngine::new(def, handlers, fast_retry(2)).unwrap();

        let result = engine.process(&doc()).await;
        assert!(result.success);
        let slow = result.state.step("slow").unwrap();
        assert_eq!(slow.status, StepStatus::Failed);
        assert_eq!(slow.attempts, 2);
        assert!(slow.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(status(&result, "next"), StepStatus::Completed);
    }

    // -------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_batch_runs_are_independent() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("a", "a").condition(|s| {
                s.get("document_id").is_some_and(|id| id != "bad")
            })
            .on_error(ErrorPolicy::Fail)],
        );
        let handlers = HandlerRegistry::new().with("a", recorder("a", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let docs = vec![
            Document::from_text("one", "x"),
            Document::from_text("bad", "x"),
            Document::from_text("two", "x"),
        ];
        let results = engine.process_batch(&docs).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].subject_id, "one");
        assert_eq!(results[2].subject_id, "two");
        assert_eq!(status(&results[1], "a"), StepStatus::Skipped);
        assert_ne!(results[0].run_id, results[2].run_id);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_failure_does_not_abort_batch() {
        let calls = Arc::new(AtomicU32::new(0));
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "fail")]);
        let handlers = HandlerRegistry::new()
            .with("fail", Failing { calls: calls.clone(), make: handler_failure });
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let docs = vec![Document::from_text("one", "x"), Document::from_text("two", "x")];
        let results = engine.process_batch(&docs).await;
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_batch_preserves_order() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "a")]);
        let handlers = HandlerRegistry::new().with("a", recorder("a", &log));
        let engine = WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap();

        let docs: Vec<Document> = (0..6)
            .map(|i| Document::from_text(format!("doc-{i}"), "x"))
            .collect();
        let results = engine.process_batch_concurrent(&docs, 3).await;
        let ids: Vec<&str> = results.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["doc-0", "doc-1", "doc-2", "doc-3", "doc-4", "doc-5"]);
        assert!(results.iter().all(|r| r.success));
        for result in &results {
            assert_eq!(result.context_value("document_id"), Some(&json!(result.subject_id)));
        }
    }

    #[tokio::test]
    async fn test_engine_runs_on_spawned_tasks() {
        let log = CallLog::default();
        let def = WorkflowDefinition::new("wf", vec![StepDefinition::new("a", "a")]);
        let handlers = HandlerRegistry::new().with("a", recorder("a", &log));
        let engine = Arc::new(WorkflowEngine::new(def, handlers, RetryPolicy::no_retry()).unwrap());

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine.process(&Document::from_text(format!("doc-{i}"), "x")).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().success);
        }
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
