//! Mock inference provider with deterministic, pattern-matched responses.
//!
//! Responses are chosen by matching the last user message against an
//! ordered table of case-insensitive regexes; the first match wins, else
//! the default response is returned. Every request is recorded so tests can
//! assert on what the pipeline sent. Scripted failures are returned (in
//! order) before any canned response, which is how retry behaviour is
//! exercised without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use regex::{Regex, RegexBuilder};
use serde_json::json;

use docflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};

use crate::pipeline::prompts::{CLASSIFY_LEAD, EXTRACT_LEAD};

use super::provider::InferenceProvider;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

impl MockResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 100,
            output_tokens: 50,
            latency_ms: 100,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::new(value.to_string())
    }
}

/// Deterministic provider for tests and offline runs.
pub struct MockProvider {
    responses: Vec<(Regex, MockResponse)>,
    default_response: MockResponse,
    failures: Mutex<VecDeque<LlmError>>,
    history: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    /// Provider that answers every request with `default_content`.
    pub fn new(default_content: impl Into<String>) -> Self {
        Self::with_default(MockResponse::new(default_content))
    }

    pub fn with_default(default_response: MockResponse) -> Self {
        Self {
            responses: Vec::new(),
            default_response,
            failures: Mutex::new(VecDeque::new()),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a pattern -> response entry. Earlier entries take precedence.
    pub fn with_response(mut self, pattern: &str, response: MockResponse) -> Result<Self, regex::Error> {
        self.add_response(pattern, response)?;
        Ok(self)
    }

    pub fn add_response(&mut self, pattern: &str, response: MockResponse) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.responses.push((regex, response));
        Ok(())
    }

    /// Queue an error to be returned by the next call.
    pub fn fail_next(&self, error: LlmError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Snapshot of every request received so far.
    pub fn history(&self) -> Vec<CompletionRequest> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared handle on the request log, still readable after the provider
    /// has been moved into a `BoxInferenceProvider`.
    pub fn history_handle(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.history)
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Provider preloaded with classification answers for the known
    /// document categories.
    pub fn classification() -> Self {
        Self::from_table(unknown_classification(), classification_table())
    }

    /// Provider preloaded with one sample extraction per category.
    pub fn extraction() -> Self {
        Self::from_table(default_extraction(), extraction_table())
    }

    /// One provider serving a whole classify -> extract run. Extraction
    /// entries are keyed on the category named right after the extraction
    /// lead-in; classification entries only match classification requests.
    pub fn document_pipeline() -> Self {
        let extract_lead = regex::escape(EXTRACT_LEAD);
        let classify_lead = regex::escape(CLASSIFY_LEAD);
        let mut table: Vec<(String, MockResponse)> = extraction_table()
            .into_iter()
            .map(|(pattern, response)| (format!("^{extract_lead} (?:{pattern})"), response))
            .collect();
        table.extend(classification_table().into_iter().map(|(pattern, response)| {
            (format!("^{classify_lead}(?s:.*)(?:{pattern})"), response)
        }));
        Self::from_table(unknown_classification(), table)
    }

    fn from_table<P: AsRef<str>>(default_response: MockResponse, table: Vec<(P, MockResponse)>) -> Self {
        let mut provider = Self::with_default(default_response);
        for (pattern, response) in table {
            let pattern = pattern.as_ref();
            if let Err(e) = provider.add_response(pattern, response) {
                tracing::warn!(pattern, error = %e, "skipping invalid mock response pattern");
            }
        }
        provider
    }

    fn find_response(&self, request: &CompletionRequest) -> &MockResponse {
        let last = request.last_user_content().unwrap_or_default();
        self.responses
            .iter()
            .find(|(regex, _)| regex.is_match(last))
            .map(|(_, response)| response)
            .unwrap_or(&self.default_response)
    }
}

impl InferenceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        let response = self.find_response(request);
        let mut content = response.content.clone();
        if request.response_schema.is_some() && !content.trim_start().starts_with('{') {
            content = json!({ "result": content }).to_string();
        }

        Ok(CompletionResponse {
            content,
            model: "mock-model".to_string(),
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
            },
            latency_ms: response.latency_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Canned payloads
// ---------------------------------------------------------------------------

fn unknown_classification() -> MockResponse {
    classification_answer("unknown", 0.5, "Unable to determine document type.")
}

/// Receipt patterns come before invoice patterns since receipts also
/// mention totals.
fn classification_table() -> Vec<(&'static str, MockResponse)> {
    let receipt = classification_answer(
        "receipt",
        0.92,
        "Document contains merchant information and transaction details.",
    );
    vec![
        (r"coffee\s*shop|thank\s*you|visa\s*\*+", receipt.clone()),
        (r"receipt|transaction|merchant|payment\s*method", receipt),
        (
            r"invoice|inv[\-\s]|bill\s*to|payment\s*terms",
            classification_answer(
                "invoice",
                0.95,
                "Document contains invoice number, line items, and total amount.",
            ),
        ),
        (
            r"agreement|contract|parties|hereby|governing\s*law",
            classification_answer(
                "contract",
                0.90,
                "Document contains legal language and party definitions.",
            ),
        ),
        (
            r"form|application|checkbox|\[\s*[xX]?\s*\]",
            classification_answer("form", 0.88, "Document contains form fields and checkboxes."),
        ),
    ]
}

fn default_extraction() -> MockResponse {
    MockResponse::json(json!({"form_title": "Unknown Form", "fields": {}}))
}

fn extraction_table() -> Vec<(&'static str, MockResponse)> {
    vec![
        (r"invoice", MockResponse::json(sample_invoice())),
        (r"receipt|coffee|merchant", MockResponse::json(sample_receipt())),
        (r"contract|agreement", MockResponse::json(sample_contract())),
        (r"form|application", MockResponse::json(sample_form())),
    ]
}

fn classification_answer(document_type: &str, confidence: f64, reasoning: &str) -> MockResponse {
    MockResponse::json(json!({
        "document_type": document_type,
        "confidence": confidence,
        "reasoning": reasoning,
    }))
}

fn sample_invoice() -> serde_json::Value {
    json!({
        "invoice_number": "INV-2024-001",
        "invoice_date": "2024-01-15",
        "due_date": "2024-02-15",
        "vendor": {
            "name": "Acme Corporation",
            "email": "billing@acme.example.com",
            "address": {"street": "123 Business St", "city": "New York", "state": "NY", "postal_code": "10001"}
        },
        "customer": {
            "name": "Customer Inc",
            "address": {"street": "456 Client Ave", "city": "Los Angeles", "state": "CA", "postal_code": "90001"}
        },
        "line_items": [
            {"description": "Consulting Services", "quantity": 10, "unit_price": 150, "total": 1500},
            {"description": "Software License", "quantity": 1, "unit_price": 500, "total": 500}
        ],
        "subtotal": 2000,
        "tax_amount": 160,
        "tax_rate": 8,
        "total_amount": 2160,
        "currency": "USD",
        "payment_terms": "Net 30"
    })
}

fn sample_receipt() -> serde_json::Value {
    json!({
        "merchant_name": "Coffee Shop",
        "merchant_address": {"street": "123 Main Street", "city": "San Francisco", "state": "CA", "postal_code": "94102"},
        "transaction_date": "2024-01-20",
        "transaction_time": "10:30 AM",
        "line_items": [
            {"description": "Latte", "total": 5.50},
            {"description": "Croissant", "total": 3.75}
        ],
        "subtotal": 9.25,
        "tax_amount": 0.74,
        "total_amount": 9.99,
        "payment_method": "VISA",
        "card_last_four": "1234",
        "currency": "USD"
    })
}

fn sample_contract() -> serde_json::Value {
    json!({
        "contract_title": "Service Agreement",
        "contract_type": "Service",
        "effective_date": "2024-03-01",
        "expiration_date": "2025-02-28",
        "parties": [{"name": "Provider Corp"}, {"name": "Client LLC"}],
        "governing_law": "Delaware",
        "key_terms": ["Monthly payment", "Service delivery"],
        "total_value": 120000,
        "currency": "USD"
    })
}

fn sample_form() -> serde_json::Value {
    json!({
        "form_title": "Application Form",
        "form_type": "Application",
        "form_date": "2024-02-01",
        "submitted_by": {
            "name": "John Smith",
            "email": "john.smith@email.com",
            "phone": "(555) 123-4567"
        },
        "fields": {"Name": "John Smith", "Email": "john.smith@email.com"},
        "checkboxes": {"terms_agreed": true, "newsletter": false},
        "signatures": ["John Smith"]
    })
}
