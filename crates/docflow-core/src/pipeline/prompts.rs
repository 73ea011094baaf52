//! Prompt text and output schemas for the inference-backed steps.

use serde_json::{json, Value};

use docflow_types::document::{Document, DocumentCategory};

/// First line of every classification request.
pub const CLASSIFY_LEAD: &str = "Please classify the following document:";

/// Opening words of every extraction request; the category name follows.
pub const EXTRACT_LEAD: &str = "Extract structured data from the following";

pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "\
You are a document classification expert. Your task is to analyze documents and classify them into one of the following categories:

1. **invoice** - Commercial documents requesting payment for goods or services. Contains invoice number, line items, totals, vendor/customer information.

2. **receipt** - Proof of purchase documents from merchants. Contains transaction date, merchant name, items purchased, payment method.

3. **contract** - Legal agreements between parties. Contains party names, terms, conditions, signatures, effective dates.

4. **form** - Structured documents with fields to fill out. Contains form fields, checkboxes, labels, submission information.

5. **unknown** - Use only when the document doesn't clearly fit any category above.

Analyze the document content carefully and provide your classification with confidence level and reasoning.";

const DATE_AND_NULL_GUIDANCE: &str = "\
For dates, use YYYY-MM-DD format. For amounts, use numeric values without currency symbols.
If a field is not found in the document, use null.";

/// Text of the first `max_pages` pages, each prefixed with its page marker.
pub fn page_excerpt(document: &Document, max_pages: usize) -> (String, usize) {
    let pages: Vec<String> = document
        .pages
        .iter()
        .take(max_pages)
        .map(|page| format!("[Page {}]\n{}", page.page_number, page.content))
        .collect();
    let analyzed = pages.len();
    (pages.join("\n\n"), analyzed)
}

pub fn classification_user_prompt(document_text: &str) -> String {
    format!(
        "{CLASSIFY_LEAD}\n\n---\n{document_text}\n---\n\nAnalyze the document and provide your classification."
    )
}

pub fn classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "document_type": {
                "type": "string",
                "enum": ["invoice", "receipt", "contract", "form", "unknown"],
                "description": "The classified document type"
            },
            "confidence": {
                "type": "number",
                "minimum": 0.0,
                "maximum": 1.0,
                "description": "Confidence score for the classification (0.0 to 1.0)"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of why this classification was chosen"
            }
        },
        "required": ["document_type", "confidence", "reasoning"]
    })
}

pub fn extraction_user_prompt(category: DocumentCategory, document_text: &str) -> String {
    format!(
        "{EXTRACT_LEAD} {category} document:\n\n---\n{document_text}\n---\n\nExtract all relevant fields and return the data as JSON."
    )
}

/// System prompt for extracting `category`. Unknown falls back to the form prompt.
pub fn extraction_system_prompt(category: DocumentCategory) -> String {
    let fields = match category {
        DocumentCategory::Invoice => {
            "- Invoice number, date, and due date\n\
             - Vendor information (name, address, contact)\n\
             - Customer/billing information\n\
             - Line items with descriptions, quantities, prices\n\
             - Subtotal, tax, and total amounts\n\
             - Payment terms and any reference numbers"
        }
        DocumentCategory::Receipt => {
            "- Merchant name and address\n\
             - Transaction date and time\n\
             - Line items with descriptions and prices\n\
             - Subtotal, tax, tip, and total amounts\n\
             - Payment method and card details"
        }
        DocumentCategory::Contract => {
            "- Contract title and type\n\
             - Effective and expiration dates\n\
             - Parties involved\n\
             - Governing law and jurisdiction\n\
             - Key terms and obligations\n\
             - Total value if applicable"
        }
        DocumentCategory::Form | DocumentCategory::Unknown => {
            "- Form title and type\n\
             - Form date\n\
             - Person submitting the form\n\
             - All form fields and their values\n\
             - Checkbox states (checked or unchecked)\n\
             - Signatures"
        }
    };
    let noun = match category {
        DocumentCategory::Unknown => DocumentCategory::Form,
        other => other,
    };
    format!(
        "You are an expert {noun} data extractor. Your task is to extract structured data from {noun} documents.\n\n\
         Extract the following information:\n{fields}\n\n{DATE_AND_NULL_GUIDANCE}"
    )
}

fn nullable(kind: &str) -> Value {
    json!({"type": [kind, "null"]})
}

fn date_field() -> Value {
    json!({"type": ["string", "null"], "description": "Date in YYYY-MM-DD format"})
}

fn address() -> Value {
    json!({
        "type": ["object", "null"],
        "properties": {
            "street": nullable("string"),
            "city": nullable("string"),
            "state": nullable("string"),
            "postal_code": nullable("string"),
            "country": nullable("string")
        }
    })
}

fn line_items() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "quantity": nullable("number"),
                "unit_price": nullable("number"),
                "total": nullable("number")
            },
            "required": ["description"]
        }
    })
}

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

/// Output schema for extracting `category`. Unknown falls back to the form schema.
pub fn extraction_schema(category: DocumentCategory) -> Value {
    match category {
        DocumentCategory::Invoice => json!({
            "type": "object",
            "properties": {
                "invoice_number": nullable("string"),
                "invoice_date": date_field(),
                "due_date": date_field(),
                "vendor": {
                    "type": ["object", "null"],
                    "properties": {
                        "name": nullable("string"),
                        "address": address(),
                        "email": nullable("string"),
                        "phone": nullable("string"),
                        "tax_id": nullable("string")
                    }
                },
                "customer": {
                    "type": ["object", "null"],
                    "properties": {"name": nullable("string"), "address": address()}
                },
                "line_items": line_items(),
                "subtotal": nullable("number"),
                "tax_amount": nullable("number"),
                "tax_rate": nullable("number"),
                "total_amount": nullable("number"),
                "currency": nullable("string"),
                "payment_terms": nullable("string"),
                "purchase_order": nullable("string")
            }
        }),
        DocumentCategory::Receipt => json!({
            "type": "object",
            "properties": {
                "merchant_name": nullable("string"),
                "merchant_address": address(),
                "transaction_date": date_field(),
                "transaction_time": nullable("string"),
                "line_items": line_items(),
                "subtotal": nullable("number"),
                "tax_amount": nullable("number"),
                "tip_amount": nullable("number"),
                "total_amount": nullable("number"),
                "payment_method": nullable("string"),
                "card_last_four": nullable("string"),
                "currency": nullable("string")
            }
        }),
        DocumentCategory::Contract => json!({
            "type": "object",
            "properties": {
                "contract_title": nullable("string"),
                "contract_type": nullable("string"),
                "effective_date": date_field(),
                "expiration_date": date_field(),
                "parties": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"name": nullable("string"), "address": address()}
                    }
                },
                "governing_law": nullable("string"),
                "jurisdiction": nullable("string"),
                "key_terms": string_list(),
                "obligations": string_list(),
                "termination_clause": nullable("string"),
                "renewal_terms": nullable("string"),
                "total_value": nullable("number"),
                "currency": nullable("string")
            }
        }),
        DocumentCategory::Form | DocumentCategory::Unknown => json!({
            "type": "object",
            "properties": {
                "form_title": nullable("string"),
                "form_type": nullable("string"),
                "form_date": date_field(),
                "submitted_by": {
                    "type": ["object", "null"],
                    "properties": {
                        "name": nullable("string"),
                        "email": nullable("string"),
                        "phone": nullable("string"),
                        "address": address()
                    }
                },
                "fields": {
                    "type": "object",
                    "description": "Key-value pairs of form field labels and their values",
                    "additionalProperties": nullable("string")
                },
                "checkboxes": {
                    "type": "object",
                    "description": "Checkbox fields and their checked state",
                    "additionalProperties": {"type": "boolean"}
                },
                "signatures": string_list()
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_types::document::DocumentPage;

    #[test]
    fn test_page_excerpt_limits_pages() {
        let mut doc = Document::new("doc");
        for n in 1..=5 {
            doc.pages.push(DocumentPage {
                page_number: n,
                content: format!("page {n}"),
            });
        }
        let (text, analyzed) = page_excerpt(&doc, 3);
        assert_eq!(analyzed, 3);
        assert!(text.starts_with("[Page 1]\npage 1"));
        assert!(text.contains("[Page 3]"));
        assert!(!text.contains("[Page 4]"));
    }

    #[test]
    fn test_prompts_embed_text() {
        let prompt = classification_user_prompt("ACME INVOICE");
        assert!(prompt.starts_with(CLASSIFY_LEAD));
        assert!(prompt.contains("---\nACME INVOICE\n---"));

        let prompt = extraction_user_prompt(DocumentCategory::Receipt, "Latte 5.50");
        assert!(prompt.starts_with("Extract structured data from the following receipt document:"));
    }

    #[test]
    fn test_extraction_schema_per_category() {
        let invoice = extraction_schema(DocumentCategory::Invoice);
        assert!(invoice["properties"]["invoice_number"].is_object());
        let receipt = extraction_schema(DocumentCategory::Receipt);
        assert!(receipt["properties"]["merchant_name"].is_object());
        assert_eq!(
            extraction_schema(DocumentCategory::Unknown),
            extraction_schema(DocumentCategory::Form)
        );
        assert!(extraction_system_prompt(DocumentCategory::Contract).contains("contract data extractor"));
        assert!(extraction_system_prompt(DocumentCategory::Unknown).contains("form data extractor"));
    }
}
