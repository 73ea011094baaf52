//! Workflow run types.
//!
//! `WorkflowState` is the mutable execution record for one run of a
//! workflow over one document. It is owned by a single engine invocation
//! and never shared between runs. `WorkflowResult` is the terminal summary
//! handed back to the caller.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Status of an individual step within a run.
///
/// Transitions are monotonic: pending -> running -> {completed, failed,
/// skipped}, with pending -> skipped for gated steps and failed -> skipped
/// when a `skip` error policy recasts a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether a dependent step may run after a step in this status.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }

    /// Whether no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
                | (StepStatus::Running, StepStatus::Skipped)
                | (StepStatus::Failed, StepStatus::Skipped)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What the engine does when a step's handler fails after retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Recast the step as skipped and carry on.
    Skip,
    /// Leave the step failed and carry on.
    Continue,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Fail => write!(f, "fail"),
            ErrorPolicy::Skip => write!(f, "skip"),
            ErrorPolicy::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(ErrorPolicy::Fail),
            "skip" => Ok(ErrorPolicy::Skip),
            "continue" => Ok(ErrorPolicy::Continue),
            other => Err(format!("invalid error policy: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step record
// ---------------------------------------------------------------------------

/// Execution record of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Snapshot of the context keys the step saw when it started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of handler attempts made.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl WorkflowStep {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            input: None,
            output: None,
            error: None,
            attempts: 0,
            metrics: HashMap::new(),
        }
    }

    /// Move to `next`, returning false (and leaving the record untouched)
    /// if the transition is not allowed.
    pub fn transition(&mut self, next: StepStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        match next {
            StepStatus::Running => self.started_at = Some(now),
            StepStatus::Completed | StepStatus::Failed => self.completed_at = Some(now),
            StepStatus::Skipped => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(now);
                }
            }
            StepStatus::Pending => {}
        }
        self.status = next;
        true
    }

    /// Elapsed time between start and completion, if both are recorded.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable execution record for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Uuid,
    /// Identifier of the document being processed.
    pub subject_id: String,
    pub workflow_name: String,
    /// One record per step definition, in declared order.
    pub steps: Vec<WorkflowStep>,
    /// Shared key/value context visible to every step in the run.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// Fresh state with one pending record per step name.
    pub fn new<I, S>(subject_id: impl Into<String>, workflow_name: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            run_id: Uuid::now_v7(),
            subject_id: subject_id.into(),
            workflow_name: workflow_name.into(),
            steps: steps.into_iter().map(WorkflowStep::pending).collect(),
            context: HashMap::new(),
            status: RunStatus::Pending,
            current_step: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.context.contains_key(key)
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Elapsed run time; measured up to now while the run is in flight.
    pub fn duration_ms(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds()
    }
}

// ---------------------------------------------------------------------------
// Terminal result
// ---------------------------------------------------------------------------

/// Aggregate metrics for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_duration_ms: i64,
    pub step_count: usize,
    pub completed_steps: usize,
}

/// Terminal summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub subject_id: String,
    pub success: bool,
    pub state: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: WorkflowMetrics,
}

impl WorkflowResult {
    /// Summarise a finished state. Success requires no abort error and a
    /// completed run status.
    pub fn from_state(state: WorkflowState, error: Option<String>) -> Self {
        let metrics = WorkflowMetrics {
            total_duration_ms: state.duration_ms(),
            step_count: state.steps.len(),
            completed_steps: state.count_with_status(StepStatus::Completed),
        };
        Self {
            run_id: state.run_id,
            subject_id: state.subject_id.clone(),
            success: error.is_none() && state.status == RunStatus::Completed,
            state,
            error,
            metrics,
        }
    }

    /// Context value written by the run, if any.
    pub fn context_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_transitions() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Running));
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Skipped));
        assert!(StepStatus::Failed.can_transition_to(StepStatus::Skipped));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Skipped.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Completed));
    }

    #[test]
    fn test_step_transition_records_timestamps() {
        let mut step = WorkflowStep::pending("classify");
        assert!(step.transition(StepStatus::Running));
        assert!(step.started_at.is_some());
        assert!(step.transition(StepStatus::Completed));
        assert!(step.completed_at.is_some());
        assert!(step.duration_ms().unwrap() >= 0);

        // No re-entry into running.
        assert!(!step.transition(StepStatus::Running));
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[test]
    fn test_dependency_satisfaction() {
        assert!(StepStatus::Completed.satisfies_dependency());
        assert!(StepStatus::Skipped.satisfies_dependency());
        assert!(!StepStatus::Failed.satisfies_dependency());
        assert!(!StepStatus::Pending.satisfies_dependency());
    }

    #[test]
    fn test_error_policy_parse() {
        assert_eq!("continue".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Continue);
        assert_eq!("SKIP".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Skip);
        assert!("retry".parse::<ErrorPolicy>().is_err());
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Fail);
    }

    #[test]
    fn test_result_from_state() {
        let mut state = WorkflowState::new("doc-1", "wf", ["a", "b"]);
        state.status = RunStatus::Completed;
        state.completed_at = Some(Utc::now());
        let step = state.step_mut("a").unwrap();
        step.transition(StepStatus::Running);
        step.transition(StepStatus::Completed);

        let result = WorkflowResult::from_state(state, None);
        assert!(result.success);
        assert_eq!(result.subject_id, "doc-1");
        assert_eq!(result.metrics.step_count, 2);
        assert_eq!(result.metrics.completed_steps, 1);
    }

    #[test]
    fn test_result_with_error_is_not_success() {
        let mut state = WorkflowState::new("doc-2", "wf", ["a"]);
        state.status = RunStatus::Failed;
        let result = WorkflowResult::from_state(state, Some("Step a failed".into()));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Step a failed"));
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = WorkflowState::new("doc-3", "wf", ["a"]);
        state
            .context
            .insert("document_type".into(), serde_json::json!("invoice"));
        let json = serde_json::to_string(&state).unwrap();
        let parsed: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_id, state.run_id);
        assert_eq!(parsed.get("document_type").unwrap(), "invoice");
        assert_eq!(parsed.steps[0].status, StepStatus::Pending);
    }
}
