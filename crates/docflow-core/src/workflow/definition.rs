//! Declarative workflow definitions.
//!
//! A `WorkflowDefinition` is an ordered list of `StepDefinition`s. Both are
//! immutable once built and hold nothing run-specific, so a single
//! definition can back any number of concurrent engine runs.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use docflow_types::workflow::{ErrorPolicy, StepStatus, WorkflowState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from building or running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow must have at least one step")]
    EmptyWorkflow,

    #[error("duplicate step name: '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{step}' references unknown handler '{handler}'")]
    UnknownHandler { step: String, handler: String },

    #[error("validation error: {0}")]
    ValidationError(String),

    /// A required step found a dependency that neither completed nor was skipped.
    #[error("step '{step}' cannot run: dependency '{dependency}' is {status}")]
    DependencyNotSatisfied {
        step: String,
        dependency: String,
        status: StepStatus,
    },

    #[error("step '{step}' failed: {error}")]
    StepFailed { step: String, error: String },

    #[error("context error: {0}")]
    Context(String),
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// Predicate deciding whether a step runs, evaluated against the run state
/// just before the step would start.
pub type StepCondition = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// One step of a workflow.
#[derive(Clone)]
pub struct StepDefinition {
    pub name: String,
    pub description: String,
    /// Key into the engine's handler registry.
    pub handler: String,
    /// A required step aborts the run when its dependencies are unmet;
    /// an optional one is skipped instead.
    pub required: bool,
    pub depends_on: Vec<String>,
    pub condition: Option<StepCondition>,
    pub on_error: ErrorPolicy,
    /// Per-attempt timeout for the handler.
    pub timeout: Option<Duration>,
}

impl StepDefinition {
    /// A required step with no dependencies, no condition and the `fail`
    /// error policy.
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            handler: handler.into(),
            required: true,
            depends_on: Vec::new(),
            condition: None,
            on_error: ErrorPolicy::Fail,
            timeout: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// True when no condition is set, else the condition's verdict.
    pub fn should_run(&self, state: &WorkflowState) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition(state))
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("required", &self.required)
            .field("depends_on", &self.depends_on)
            .field("has_condition", &self.condition.is_some())
            .field("on_error", &self.on_error)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub version: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            steps,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// Check structural constraints.
    ///
    /// - At least one step, with unique non-empty names
    /// - Every dependency names a step declared earlier (steps run in
    ///   declared order, so a later or missing step can never be satisfied)
    /// - Timeouts are non-zero
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }

        let mut declared: HashSet<&str> = HashSet::new();
        let all: HashSet<&str> = self.step_names().collect();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(WorkflowError::ValidationError(
                    "step name must not be empty".to_string(),
                ));
            }
            if declared.contains(step.name.as_str()) {
                return Err(WorkflowError::DuplicateStep(step.name.clone()));
            }
            for dep in &step.depends_on {
                if !all.contains(dep.as_str()) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if !declared.contains(dep.as_str()) {
                    return Err(WorkflowError::ValidationError(format!(
                        "step '{}' depends on '{}', which is not declared before it",
                        step.name, dep
                    )));
                }
            }
            if step.timeout == Some(Duration::ZERO) {
                return Err(WorkflowError::ValidationError(format!(
                    "step '{}' timeout must be > 0",
                    step.name
                )));
            }
            declared.insert(step.name.as_str());
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(key: &str, value: serde_json::Value) -> WorkflowState {
        let mut state = WorkflowState::new("doc", "wf", ["a"]);
        state.context.insert(key.to_string(), value);
        state
    }

    #[test]
    fn test_step_defaults() {
        let step = StepDefinition::new("classify", "classification");
        assert!(step.required);
        assert!(step.depends_on.is_empty());
        assert_eq!(step.on_error, ErrorPolicy::Fail);
        assert!(step.timeout.is_none());
    }

    #[test]
    fn test_should_run_without_condition() {
        let step = StepDefinition::new("a", "h");
        assert!(step.should_run(&WorkflowState::new("doc", "wf", ["a"])));
    }

    #[test]
    fn test_should_run_evaluates_condition() {
        let step = StepDefinition::new("extract", "extraction")
            .condition(|state| state.get("document_type").is_some_and(|v| v != "unknown"));
        assert!(step.should_run(&state_with("document_type", "invoice".into())));
        assert!(!step.should_run(&state_with("document_type", "unknown".into())));
        assert!(!step.should_run(&WorkflowState::new("doc", "wf", ["a"])));
    }

    #[test]
    fn test_validate_ok() {
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "h"),
                StepDefinition::new("b", "h").depends_on(["a"]),
            ],
        );
        assert!(def.validate().is_ok());
        assert_eq!(def.step_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(def.get_step("b").is_some());
    }

    #[test]
    fn test_validate_empty() {
        let def = WorkflowDefinition::new("wf", vec![]);
        assert!(matches!(def.validate(), Err(WorkflowError::EmptyWorkflow)));
    }

    #[test]
    fn test_validate_duplicate() {
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("a", "h"), StepDefinition::new("a", "h")],
        );
        assert!(matches!(def.validate(), Err(WorkflowError::DuplicateStep(name)) if name == "a"));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("a", "h").depends_on(["missing"])],
        );
        let err = def.validate().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownDependency { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_validate_forward_dependency() {
        let def = WorkflowDefinition::new(
            "wf",
            vec![
                StepDefinition::new("a", "h").depends_on(["b"]),
                StepDefinition::new("b", "h"),
            ],
        );
        assert!(matches!(def.validate(), Err(WorkflowError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let def = WorkflowDefinition::new(
            "wf",
            vec![StepDefinition::new("a", "h").timeout(Duration::ZERO)],
        );
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_definition_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WorkflowDefinition>();
    }
}
