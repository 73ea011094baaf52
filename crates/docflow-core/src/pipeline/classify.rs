//! Classification stage: decide which category a document belongs to.

use serde_json::{json, Value};
use tracing::{debug, warn};

use docflow_types::document::{Document, DocumentCategory};
use docflow_types::llm::CompletionRequest;

use crate::llm::BoxInferenceProvider;
use crate::workflow::context::WorkflowContext;
use crate::workflow::handler::{StepError, StepHandler, StepOutcome};

use super::prompts::{
    classification_schema, classification_user_prompt, page_excerpt, CLASSIFICATION_SYSTEM_PROMPT,
};
use super::{parse_json_object, with_inference_metrics};

const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_REASONING: &str = "No reasoning provided";

#[derive(Debug, Clone)]
pub struct ClassifyHandler {
    provider: BoxInferenceProvider,
    max_pages: usize,
    max_tokens: u32,
    temperature: f64,
}

impl ClassifyHandler {
    /// Classify from the first three pages, deterministically.
    pub fn new(provider: BoxInferenceProvider) -> Self {
        Self {
            provider,
            max_pages: 3,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Parsed classification answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: DocumentCategory,
    pub confidence: f64,
    pub reasoning: String,
}

impl Classification {
    /// Interpret a classification payload leniently: unknown labels become
    /// `Unknown`, missing confidence and reasoning get defaults.
    pub fn from_fields(fields: &serde_json::Map<String, Value>) -> Self {
        let label = fields
            .get("document_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let category = DocumentCategory::parse_lossy(label);
        if category == DocumentCategory::Unknown && !label.trim().eq_ignore_ascii_case("unknown") {
            warn!(document_type = label, "unrecognised document type returned");
        }

        let confidence = fields
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_CONFIDENCE);
        let reasoning = fields
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_REASONING)
            .to_string();

        Self {
            category,
            confidence,
            reasoning,
        }
    }
}

impl StepHandler for ClassifyHandler {
    async fn execute<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> Result<StepOutcome, StepError> {
        let (text, analyzed_pages) = page_excerpt(document, self.max_pages);
        if text.trim().is_empty() {
            return Err(StepError::MissingInput(format!(
                "document '{}' has no text to classify",
                document.id
            )));
        }

        debug!(
            run_id = %context.run_id(),
            document_id = %document.id,
            analyzed_pages,
            text_length = text.len(),
            "classifying document"
        );

        let request = CompletionRequest::new(classification_user_prompt(&text))
            .with_system(CLASSIFICATION_SYSTEM_PROMPT)
            .with_schema(classification_schema())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let response = self.provider.complete(&request).await?;

        let fields = parse_json_object(&response, "classification")?;
        let classification = Classification::from_fields(&fields);

        let outcome = StepOutcome::new(json!({
            "document_type": classification.category,
            "confidence": classification.confidence,
            "reasoning": classification.reasoning,
            "analyzed_pages": analyzed_pages,
        }))
        .with_context("document_type", classification.category.to_string())
        .with_context("classification_confidence", classification.confidence)
        .with_context("classification_reasoning", classification.reasoning);

        Ok(with_inference_metrics(outcome, &response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockProvider, MockResponse};
    use docflow_types::document::DocumentPage;
    use docflow_types::llm::LlmError;
    use docflow_types::workflow::WorkflowState;

    fn state() -> WorkflowState {
        WorkflowState::new("doc", "wf", ["classify"])
    }

    #[tokio::test]
    async fn test_classifies_invoice() {
        let mock = MockProvider::classification();
        let history = mock.history_handle();
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(mock));
        let doc = Document::from_text("doc", "INVOICE #INV-2024-001\nBill To: Customer Inc");

        let state = state();
        let outcome = handler.execute(&doc, WorkflowContext::new(&state)).await.unwrap();

        assert_eq!(outcome.context_updates["document_type"], "invoice");
        assert_eq!(outcome.context_updates["classification_confidence"], 0.95);
        assert_eq!(outcome.metrics["model"], "mock-model");
        assert_eq!(outcome.metrics["input_tokens"], 100);

        let requests = history.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].response_schema.is_some());
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].system.as_deref().unwrap().contains("classification expert"));
    }

    #[tokio::test]
    async fn test_only_first_pages_are_sent() {
        let mock = MockProvider::classification();
        let history = mock.history_handle();
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(mock)).with_max_pages(1);
        let mut doc = Document::new("doc");
        for (n, content) in [(1, "Service Agreement between the parties"), (2, "RECEIPT")] {
            doc.pages.push(DocumentPage {
                page_number: n,
                content: content.to_string(),
            });
        }

        let state = state();
        let outcome = handler.execute(&doc, WorkflowContext::new(&state)).await.unwrap();
        assert_eq!(outcome.context_updates["document_type"], "contract");
        assert_eq!(outcome.output["analyzed_pages"], 1);
        let prompt = history.lock().unwrap()[0].last_user_content().unwrap().to_string();
        assert!(!prompt.contains("RECEIPT"));
    }

    #[tokio::test]
    async fn test_unrecognised_label_maps_to_unknown() {
        let mock = MockProvider::with_default(MockResponse::json(json!({"document_type": "memo"})));
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(mock));
        let state = state();
        let outcome = handler
            .execute(&Document::from_text("doc", "hello"), WorkflowContext::new(&state))
            .await
            .unwrap();
        assert_eq!(outcome.context_updates["document_type"], "unknown");
        assert_eq!(outcome.context_updates["classification_confidence"], 0.5);
        assert_eq!(
            outcome.context_updates["classification_reasoning"],
            "No reasoning provided"
        );
    }

    #[tokio::test]
    async fn test_unparseable_response_is_parse_error() {
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(MockProvider::new("{not json")));
        let state = state();
        let err = handler
            .execute(&Document::from_text("doc", "hello"), WorkflowContext::new(&state))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Parse(_)));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let mock = MockProvider::classification();
        mock.fail_next(LlmError::RateLimited {
            retry_after_ms: Some(10),
        });
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(mock));
        let state = state();
        let err = handler
            .execute(&Document::from_text("doc", "invoice"), WorkflowContext::new(&state))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Inference(LlmError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_empty_document_is_missing_input() {
        let handler = ClassifyHandler::new(BoxInferenceProvider::new(MockProvider::classification()));
        let state = state();
        let err = handler
            .execute(&Document::new("doc"), WorkflowContext::new(&state))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::MissingInput(_)));
    }
}
