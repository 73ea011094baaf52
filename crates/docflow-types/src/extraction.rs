//! Extraction records: structured fields pulled out of a document.
//!
//! An `Extraction` keeps the fields as a JSON object so that one record type
//! serves every document category. Typed accessors interpret individual
//! fields (dates, amounts, line items) on demand, which is what validation
//! rules work against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::DocumentCategory;

/// Date format expected for date-valued fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors building an extraction from raw inference output.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Structured fields extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub category: DocumentCategory,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Extraction {
    pub fn new(category: DocumentCategory, fields: Map<String, Value>) -> Self {
        Self {
            category,
            fields,
            confidence: default_confidence(),
        }
    }

    /// Build an extraction from a raw JSON payload.
    pub fn from_value(category: DocumentCategory, value: Value) -> Result<Self, ExtractionError> {
        match value {
            Value::Object(fields) => Ok(Self::new(category, fields)),
            other => Err(ExtractionError::NotAnObject(json_kind(&other))),
        }
    }

    /// Top-level field value. JSON `null` counts as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Resolve a dotted path such as `vendor.email` through nested objects.
    /// Any missing or `null` segment yields `None`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
            if current.is_null() {
                return None;
            }
        }
        Some(current)
    }

    /// Numeric value of a top-level field. Numeric strings are accepted.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(value_as_f64)
    }

    /// Date value of a top-level field, if present and well formed.
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(parse_date)
    }

    /// Line items, if the field is present and non-empty.
    pub fn line_items(&self) -> Option<Vec<LineItem>> {
        let items = self.get("line_items")?.as_array()?;
        if items.is_empty() {
            return None;
        }
        Some(items.iter().filter_map(LineItem::from_value).collect())
    }

    /// Number of top-level fields carrying a non-null value.
    pub fn field_count(&self) -> usize {
        self.fields.values().filter(|v| !v.is_null()).count()
    }

    /// The raw field map as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// One line of an invoice or receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl LineItem {
    /// Parse a line item leniently: numeric fields may be numbers or strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            quantity: obj.get("quantity").and_then(value_as_f64),
            unit_price: obj.get("unit_price").and_then(value_as_f64),
            total: obj.get("total").and_then(value_as_f64),
        })
    }

    /// The explicit total when present, otherwise quantity × unit price.
    pub fn effective_total(&self) -> Option<f64> {
        self.total.or_else(|| match (self.quantity, self.unit_price) {
            (Some(q), Some(p)) => Some(q * p),
            _ => None,
        })
    }
}

/// Interpret a JSON value as a number, accepting numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret a JSON value as a `YYYY-MM-DD` date.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
}

/// Short name of a JSON value's type, for diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice(fields: Value) -> Extraction {
        Extraction::from_value(DocumentCategory::Invoice, fields).unwrap()
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = Extraction::from_value(DocumentCategory::Form, json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let ex = invoice(json!({"invoice_number": null, "currency": "USD"}));
        assert!(ex.get("invoice_number").is_none());
        assert_eq!(ex.field_count(), 1);
    }

    #[test]
    fn test_get_path_walks_nested_objects() {
        let ex = invoice(json!({"vendor": {"contact": {"email": "a@b.io"}, "name": null}}));
        assert_eq!(ex.get_path("vendor.contact.email"), Some(&json!("a@b.io")));
        assert!(ex.get_path("vendor.name").is_none());
        assert!(ex.get_path("vendor.missing.email").is_none());
        assert!(ex.get_path("customer.email").is_none());
    }

    #[test]
    fn test_number_accepts_numeric_strings() {
        let ex = invoice(json!({"subtotal": "100.50", "tax_amount": 8, "currency": "USD"}));
        assert_eq!(ex.number("subtotal"), Some(100.5));
        assert_eq!(ex.number("tax_amount"), Some(8.0));
        assert_eq!(ex.number("currency"), None);
    }

    #[test]
    fn test_date_parsing() {
        let ex = invoice(json!({"invoice_date": "2024-01-15", "due_date": "15/02/2024"}));
        assert_eq!(ex.date("invoice_date"), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(ex.date("due_date"), None);
    }

    #[test]
    fn test_line_item_effective_total_prefers_explicit_total() {
        let item = LineItem {
            description: "Widget".to_string(),
            quantity: Some(2.0),
            unit_price: Some(10.0),
            total: Some(25.0),
        };
        assert_eq!(item.effective_total(), Some(25.0));

        let item = LineItem { total: None, ..item };
        assert_eq!(item.effective_total(), Some(20.0));

        let item = LineItem { quantity: None, ..item };
        assert_eq!(item.effective_total(), None);
    }

    #[test]
    fn test_line_items_empty_is_none() {
        let ex = invoice(json!({"line_items": []}));
        assert!(ex.line_items().is_none());

        let ex = invoice(json!({"line_items": [{"description": "A", "total": "5"}]}));
        let items = ex.line_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total, Some(5.0));
    }
}
