//! Extraction stage: pull category-specific fields out of a classified document.

use serde_json::json;
use tracing::debug;

use docflow_types::document::{Document, DocumentCategory};
use docflow_types::extraction::Extraction;
use docflow_types::llm::CompletionRequest;

use crate::llm::BoxInferenceProvider;
use crate::workflow::context::WorkflowContext;
use crate::workflow::handler::{StepError, StepHandler, StepOutcome};

use super::prompts::{extraction_schema, extraction_system_prompt, extraction_user_prompt};
use super::{parse_json_object, with_inference_metrics};

#[derive(Debug, Clone)]
pub struct ExtractHandler {
    provider: BoxInferenceProvider,
    max_tokens: u32,
    temperature: f64,
}

impl ExtractHandler {
    pub fn new(provider: BoxInferenceProvider) -> Self {
        Self {
            provider,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The known category recorded in context by classification (or seeded
/// from the document).
fn category_from_context(context: &WorkflowContext<'_>) -> Result<DocumentCategory, StepError> {
    let label = context
        .get_str("document_type")
        .ok_or_else(|| StepError::MissingInput("document_type not set in context".to_string()))?;
    let category = DocumentCategory::parse_lossy(label);
    if !category.is_known() {
        return Err(StepError::MissingInput(format!(
            "cannot extract from a document of type '{label}'"
        )));
    }
    Ok(category)
}

impl StepHandler for ExtractHandler {
    async fn execute<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> Result<StepOutcome, StepError> {
        let category = category_from_context(&context)?;
        let text = document.full_text();

        debug!(
            run_id = %context.run_id(),
            document_id = %document.id,
            document_type = %category,
            text_length = text.len(),
            "extracting from document"
        );

        let request = CompletionRequest::new(extraction_user_prompt(category, &text))
            .with_system(extraction_system_prompt(category))
            .with_schema(extraction_schema(category))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let response = self.provider.complete(&request).await?;

        let fields = parse_json_object(&response, "extraction")?;
        let extraction = Extraction::new(category, fields);
        let record = serde_json::to_value(&extraction)
            .map_err(|e| StepError::Failed(format!("failed to serialize extraction: {e}")))?;

        let outcome = StepOutcome::new(json!({
            "document_type": category,
            "field_count": extraction.field_count(),
        }))
        .with_context("extracted_data", extraction.to_value())
        .with_context("extraction", record);

        Ok(with_inference_metrics(outcome, &response))
    }
}

/// Read back the extraction written by this stage.
pub fn extraction_from_context(
    context: &WorkflowContext<'_>,
) -> Result<Option<Extraction>, StepError> {
    context
        .get_as::<Extraction>("extraction")
        .map_err(|e| StepError::Parse(e.to_string()))
}
