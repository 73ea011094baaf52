//! The `ValidationRule` capability.

use docflow_types::document::DocumentCategory;
use docflow_types::extraction::Extraction;
use docflow_types::validation::{Severity, ValidationIssue};

/// A rule that could not be evaluated. The validator logs it and moves on;
/// it never turns into an issue.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("field '{field}' has an unusable value: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("rule failed: {0}")]
    Failed(String),
}

/// Which document categories a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    All,
    Categories(Vec<DocumentCategory>),
}

impl RuleScope {
    pub fn only(categories: impl IntoIterator<Item = DocumentCategory>) -> Self {
        RuleScope::Categories(categories.into_iter().collect())
    }

    pub fn includes(&self, category: DocumentCategory) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Categories(categories) => categories.contains(&category),
        }
    }
}

/// A predicate-and-diagnostic unit applied to an extraction.
///
/// Rules are stateless and shared read-only across concurrent validations.
pub trait ValidationRule: Send + Sync {
    /// Stable identifier, reported on every issue the rule produces.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Severity of the issues this rule reports.
    fn severity(&self) -> Severity;

    fn scope(&self) -> &RuleScope;

    fn applies_to(&self, category: DocumentCategory) -> bool {
        self.scope().includes(category)
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError>;
}
