//! Run context: read access for handlers, single-writer updates for the engine.
//!
//! Handlers receive a `WorkflowContext`, a borrowed read-only view of the
//! run's key/value map. They never mutate it; instead they return context
//! updates in their `StepOutcome`, which the engine applies through
//! [`apply_updates`] before the step is marked completed.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use docflow_types::document::Document;
use docflow_types::workflow::WorkflowState;

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum size of a single context value (1 MB).
pub const MAX_CONTEXT_VALUE_SIZE: usize = 1_048_576;

/// Maximum total size of all context data (10 MB).
pub const MAX_CONTEXT_SIZE: usize = 10_485_760;

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// Read-only view of a run's shared context.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowContext<'a> {
    state: &'a WorkflowState,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(state: &'a WorkflowState) -> Self {
        Self { state }
    }

    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    pub fn subject_id(&self) -> &'a str {
        &self.state.subject_id
    }

    pub fn workflow_name(&self) -> &'a str {
        &self.state.workflow_name
    }

    /// Value under `key`. JSON `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.state.context.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Deserialize the value under `key` into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the value
    /// has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| WorkflowError::Context(format!("context key '{key}': {e}"))),
        }
    }

    /// Sorted list of keys currently set, used as a step's input snapshot.
    pub fn keys(&self) -> Vec<&'a str> {
        let mut keys: Vec<&str> = self
            .state
            .context
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }
}

// ---------------------------------------------------------------------------
// Engine-side writes
// ---------------------------------------------------------------------------

/// Seed a fresh run's context from the document.
///
/// A pre-known category is written as `document_type`, which is what lets a
/// classification step's condition skip it.
pub fn seed_context(state: &mut WorkflowState, document: &Document) {
    state
        .context
        .insert("document_id".to_string(), Value::String(document.id.clone()));
    state
        .context
        .insert("page_count".to_string(), json!(document.page_count()));
    if let Some(category) = document.category {
        state
            .context
            .insert("document_type".to_string(), Value::String(category.to_string()));
    }
}

/// Apply a step's context updates.
///
/// A value over `MAX_CONTEXT_VALUE_SIZE` is replaced by a truncation marker.
/// If the result would exceed `MAX_CONTEXT_SIZE` overall, nothing is written
/// and an error is returned.
pub fn apply_updates(
    state: &mut WorkflowState,
    step: &str,
    updates: Map<String, Value>,
) -> Result<(), WorkflowError> {
    let mut staged = Vec::with_capacity(updates.len());
    for (key, value) in updates {
        let size = serde_json::to_string(&value)
            .map_err(|e| WorkflowError::Context(e.to_string()))?
            .len();

        if size > MAX_CONTEXT_VALUE_SIZE {
            tracing::warn!(
                step,
                key = %key,
                size,
                max = MAX_CONTEXT_VALUE_SIZE,
                "context value exceeds size limit, truncating"
            );
            let truncated = json!({
                "_truncated": true,
                "_original_size": size,
            });
            staged.push((key, truncated));
        } else {
            staged.push((key, value));
        }
    }

    let replaced: usize = staged
        .iter()
        .filter_map(|(key, _)| state.context.get(key).map(|old| entry_size(key, old)))
        .sum();
    let added: usize = staged.iter().map(|(key, value)| entry_size(key, value)).sum();
    let total = total_size(state).saturating_sub(replaced) + added;
    if total > MAX_CONTEXT_SIZE {
        return Err(WorkflowError::Context(format!(
            "total context size ({total} bytes) exceeds maximum ({MAX_CONTEXT_SIZE} bytes)"
        )));
    }

    state.context.extend(staged);
    Ok(())
}

fn entry_size(key: &str, value: &Value) -> usize {
    key.len() + serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

fn total_size(state: &WorkflowState) -> usize {
    state
        .context
        .iter()
        .map(|(k, v)| entry_size(k, v))
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
