//! Document types: the unit of work handed to the workflow engine.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category a document is classified into.
///
/// Validation rules are scoped by category, and extraction picks its
/// output schema from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Invoice,
    Receipt,
    Contract,
    Form,
    Unknown,
}

impl DocumentCategory {
    /// Parse a category name, mapping anything unrecognised to `Unknown`.
    ///
    /// Inference output is free text, so an unexpected label should degrade
    /// to `Unknown` rather than fail the step.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(DocumentCategory::Unknown)
    }

    /// Whether this category is specific enough to extract from.
    pub fn is_known(&self) -> bool {
        !matches!(self, DocumentCategory::Unknown)
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentCategory::Invoice => write!(f, "invoice"),
            DocumentCategory::Receipt => write!(f, "receipt"),
            DocumentCategory::Contract => write!(f, "contract"),
            DocumentCategory::Form => write!(f, "form"),
            DocumentCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for DocumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoice" => Ok(DocumentCategory::Invoice),
            "receipt" => Ok(DocumentCategory::Receipt),
            "contract" => Ok(DocumentCategory::Contract),
            "form" => Ok(DocumentCategory::Form),
            "unknown" => Ok(DocumentCategory::Unknown),
            other => Err(format!("invalid document category: '{other}'")),
        }
    }
}

/// A single page of document text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    /// 1-based page number.
    pub page_number: u32,
    /// Text content of the page.
    pub content: String,
}

/// Where a document came from. Purely informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, serde_json::Value>,
}

/// A document submitted for processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Caller-assigned identifier; becomes the run's subject id.
    pub id: String,
    #[serde(default)]
    pub pages: Vec<DocumentPage>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// Pre-known classification, if the caller already has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DocumentCategory>,
}

impl Document {
    /// Create a document with no pages.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pages: Vec::new(),
            metadata: DocumentMetadata::default(),
            category: None,
        }
    }

    /// Create a single-page document from raw text.
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut doc = Self::new(id);
        doc.pages.push(DocumentPage {
            page_number: 1,
            content: text.into(),
        });
        doc
    }

    /// Attach a pre-known category.
    pub fn with_category(mut self, category: DocumentCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Concatenated text of all pages, separated by blank lines.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
