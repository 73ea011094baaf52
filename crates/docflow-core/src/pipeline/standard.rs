//! The standard document-processing workflow and its handler table.

use std::sync::Arc;
use std::time::Duration;

use docflow_types::config::DocflowConfig;
use docflow_types::workflow::{ErrorPolicy, WorkflowState};

use crate::llm::BoxInferenceProvider;
use crate::validation::ValidationRuleRegistry;
use crate::workflow::definition::{StepDefinition, WorkflowDefinition, WorkflowError};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::handler::HandlerRegistry;
use crate::workflow::retry::RetryPolicy;

use super::{
    ClassifyHandler, ExtractHandler, ValidateHandler, CLASSIFICATION_HANDLER, EXTRACTION_HANDLER,
    VALIDATION_HANDLER,
};

pub const STANDARD_WORKFLOW_NAME: &str = "standard_document_processing";

fn has_known_category(state: &WorkflowState) -> bool {
    state
        .get("document_type")
        .and_then(|v| v.as_str())
        .is_some_and(|t| !t.is_empty() && t != "unknown")
}

/// classify -> extract -> validate.
///
/// Classification is skipped when the category is already known.
/// Extraction only runs for a known category. Validation only runs once an
/// extraction exists, and its failure never fails the run.
pub fn standard_document_workflow(step_timeout: Option<Duration>) -> WorkflowDefinition {
    let with_timeout = |step: StepDefinition| match step_timeout {
        Some(timeout) => step.timeout(timeout),
        None => step,
    };

    WorkflowDefinition::new(
        STANDARD_WORKFLOW_NAME,
        vec![
            with_timeout(
                StepDefinition::new("classify", CLASSIFICATION_HANDLER)
                    .description("Classify the document type")
                    .condition(|state| !state.contains("document_type")),
            ),
            with_timeout(
                StepDefinition::new("extract", EXTRACTION_HANDLER)
                    .description("Extract structured data")
                    .depends_on(["classify"])
                    .condition(has_known_category),
            ),
            with_timeout(
                StepDefinition::new("validate", VALIDATION_HANDLER)
                    .description("Validate extracted data")
                    .required(false)
                    .depends_on(["extract"])
                    .condition(|state| state.contains("extraction"))
                    .on_error(ErrorPolicy::Continue),
            ),
        ],
    )
    .with_description("Standard pipeline: classify, extract, validate")
}

/// Handlers for the standard workflow, sharing one inference provider.
pub fn standard_handlers(
    provider: BoxInferenceProvider,
    registry: Arc<ValidationRuleRegistry>,
    config: &DocflowConfig,
) -> HandlerRegistry {
    let inference = &config.inference;
    HandlerRegistry::new()
        .with(
            CLASSIFICATION_HANDLER,
            ClassifyHandler::new(provider.clone())
                .with_max_pages(config.pipeline.classification_max_pages),
        )
        .with(
            EXTRACTION_HANDLER,
            ExtractHandler::new(provider)
                .with_max_tokens(inference.max_tokens)
                .with_temperature(inference.temperature),
        )
        .with(
            VALIDATION_HANDLER,
            ValidateHandler::new(registry, config.validation.strict_mode),
        )
}

/// Engine for the standard workflow, configured from `config`.
pub fn standard_engine(
    provider: BoxInferenceProvider,
    registry: Arc<ValidationRuleRegistry>,
    config: &DocflowConfig,
) -> Result<WorkflowEngine, WorkflowError> {
    let step_timeout = config.pipeline.step_timeout_secs.map(Duration::from_secs);
    WorkflowEngine::new(
        standard_document_workflow(step_timeout),
        standard_handlers(provider, registry, config),
        RetryPolicy::from_settings(&config.retry),
    )
}
