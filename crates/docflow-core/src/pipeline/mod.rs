//! The standard classify -> extract -> validate document pipeline.
//!
//! Each stage is a `StepHandler`. Stages talk to each other only through
//! the run context:
//!
//! | key | written by |
//! |---|---|
//! | `document_type`, `classification_confidence`, `classification_reasoning` | classify |
//! | `extraction`, `extracted_data` | extract |
//! | `validation_valid`, `validation_issues` | validate |

pub mod classify;
pub mod extract;
pub mod prompts;
pub mod standard;
pub mod validate;

pub use classify::ClassifyHandler;
pub use extract::ExtractHandler;
pub use standard::{
    standard_document_workflow, standard_engine, standard_handlers, STANDARD_WORKFLOW_NAME,
};
pub use validate::ValidateHandler;

use docflow_types::llm::CompletionResponse;

use crate::workflow::handler::{StepError, StepOutcome};

pub const CLASSIFICATION_HANDLER: &str = "classification";
pub const EXTRACTION_HANDLER: &str = "extraction";
pub const VALIDATION_HANDLER: &str = "validation";

/// Record token usage, latency and model on a step outcome.
fn with_inference_metrics(outcome: StepOutcome, response: &CompletionResponse) -> StepOutcome {
    outcome
        .with_metric("input_tokens", response.usage.input_tokens)
        .with_metric("output_tokens", response.usage.output_tokens)
        .with_metric("latency_ms", response.latency_ms)
        .with_metric("model", response.model.as_str())
}

/// Parse a JSON object out of an inference response.
fn parse_json_object(
    response: &CompletionResponse,
    what: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, StepError> {
    match serde_json::from_str(response.content.trim()) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(StepError::Parse(format!(
            "{what} response is not a JSON object: {}",
            docflow_types::extraction::json_kind(&other)
        ))),
        Err(e) => Err(StepError::Parse(format!("{what} response: {e}"))),
    }
}
