//! Built-in validation rules.
//!
//! Format rules check a single field; cross-field rules relate two or more.
//! Absent fields are never reported by anything except `RequiredFieldRule`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use docflow_types::extraction::{json_kind, value_as_f64, Extraction};
use docflow_types::validation::{Severity, ValidationIssue};

use super::rule::{RuleError, RuleScope, ValidationRule};

/// Amounts closer than this are considered equal.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Present numeric value of `field`, or an error when it holds something
/// that is not a number.
fn required_number(extraction: &Extraction, field: &str) -> Result<Option<f64>, RuleError> {
    match extraction.get(field) {
        None => Ok(None),
        Some(value) => value_as_f64(value).map(Some).ok_or_else(|| RuleError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a number, got {}", json_kind(value)),
        }),
    }
}

// ---------------------------------------------------------------------------
// Format rules
// ---------------------------------------------------------------------------

/// Field must be present and, for strings, non-blank.
#[derive(Debug, Clone)]
pub struct RequiredFieldRule {
    name: String,
    description: String,
    field: String,
    scope: RuleScope,
}

impl RequiredFieldRule {
    pub fn new(field: impl Into<String>, scope: RuleScope) -> Self {
        let field = field.into();
        Self {
            name: format!("required_{field}"),
            description: format!("Field '{field}' is required"),
            field,
            scope,
        }
    }
}

impl ValidationRule for RequiredFieldRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let value = extraction.get(&self.field);
        let missing = match value {
            None => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if !missing {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            &self.field,
            self.severity(),
            format!("Required field '{}' is missing or empty", self.field),
            &self.name,
        )
        .with_expected("non-empty value")
        .with_actual(value.cloned().unwrap_or(Value::Null));
        Ok(vec![issue])
    }
}

/// Field, when present, must be a `YYYY-MM-DD` date.
#[derive(Debug, Clone)]
pub struct DateFormatRule {
    name: String,
    description: String,
    field: String,
    scope: RuleScope,
}

impl DateFormatRule {
    pub fn new(field: impl Into<String>, scope: RuleScope) -> Self {
        let field = field.into();
        Self {
            name: format!("date_format_{field}"),
            description: format!("Field '{field}' must be a valid date"),
            field,
            scope,
        }
    }
}

impl ValidationRule for DateFormatRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let Some(value) = extraction.get(&self.field) else {
            return Ok(Vec::new());
        };
        if extraction.date(&self.field).is_some() {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            &self.field,
            self.severity(),
            format!("Field '{}' is not a valid date", self.field),
            &self.name,
        )
        .with_expected("YYYY-MM-DD")
        .with_actual(value.clone());
        Ok(vec![issue])
    }
}

/// Numeric field, when present, must not be negative.
#[derive(Debug, Clone)]
pub struct PositiveAmountRule {
    name: String,
    description: String,
    field: String,
    scope: RuleScope,
}

impl PositiveAmountRule {
    pub fn new(field: impl Into<String>, scope: RuleScope) -> Self {
        let field = field.into();
        Self {
            name: format!("positive_amount_{field}"),
            description: format!("Field '{field}' must be positive"),
            field,
            scope,
        }
    }
}

impl ValidationRule for PositiveAmountRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        // Non-numeric values are left to the extraction schema.
        match extraction.number(&self.field) {
            Some(amount) if amount < 0.0 => Ok(vec![
                ValidationIssue::new(
                    &self.field,
                    self.severity(),
                    format!("Field '{}' must be positive", self.field),
                    &self.name,
                )
                .with_expected(">= 0")
                .with_actual(amount),
            ]),
            _ => Ok(Vec::new()),
        }
    }
}

/// String at a dotted path, when present, must look like `local@domain.tld`.
#[derive(Debug, Clone)]
pub struct EmailFormatRule {
    name: String,
    description: String,
    path: String,
    scope: RuleScope,
}

impl EmailFormatRule {
    pub fn new(path: impl Into<String>, scope: RuleScope) -> Self {
        let path = path.into();
        Self {
            name: format!("email_format_{path}"),
            description: format!("Field '{path}' must be a valid email"),
            path,
            scope,
        }
    }
}

impl ValidationRule for EmailFormatRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let Some(email) = extraction.get_path(&self.path).and_then(Value::as_str) else {
            return Ok(Vec::new());
        };
        if EMAIL_PATTERN.is_match(email) {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            &self.path,
            self.severity(),
            format!("Invalid email format in '{}'", self.path),
            &self.name,
        )
        .with_expected("valid email address")
        .with_actual(email);
        Ok(vec![issue])
    }
}

// ---------------------------------------------------------------------------
// Cross-field rules
// ---------------------------------------------------------------------------

/// `earlier` must not fall after `later` when both are valid dates.
#[derive(Debug, Clone)]
pub struct DateOrderRule {
    name: String,
    description: String,
    earlier: String,
    later: String,
    scope: RuleScope,
}

impl DateOrderRule {
    pub fn new(earlier: impl Into<String>, later: impl Into<String>, scope: RuleScope) -> Self {
        let earlier = earlier.into();
        let later = later.into();
        Self {
            name: format!("date_order_{earlier}_{later}"),
            description: format!("'{earlier}' must be before '{later}'"),
            earlier,
            later,
            scope,
        }
    }
}

impl ValidationRule for DateOrderRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let (Some(earlier), Some(later)) =
            (extraction.date(&self.earlier), extraction.date(&self.later))
        else {
            return Ok(Vec::new());
        };
        if earlier <= later {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            format!("{},{}", self.earlier, self.later),
            self.severity(),
            format!("'{}' must be before '{}'", self.earlier, self.later),
            &self.name,
        )
        .with_expected(format!("{} <= {}", self.earlier, self.later))
        .with_actual(format!("{earlier} > {later}"));
        Ok(vec![issue])
    }
}

/// `total_amount` must equal `subtotal + tax_amount` (missing tax counts as 0).
#[derive(Debug, Clone)]
pub struct TotalMatchesSubtotalPlusTaxRule {
    scope: RuleScope,
}

impl TotalMatchesSubtotalPlusTaxRule {
    pub fn new(scope: RuleScope) -> Self {
        Self { scope }
    }
}

impl ValidationRule for TotalMatchesSubtotalPlusTaxRule {
    fn name(&self) -> &str {
        "total_matches_calculation"
    }

    fn description(&self) -> &str {
        "Total must equal subtotal plus tax"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let subtotal = required_number(extraction, "subtotal")?;
        let total = required_number(extraction, "total_amount")?;
        let (Some(subtotal), Some(total)) = (subtotal, total) else {
            return Ok(Vec::new());
        };
        let tax = required_number(extraction, "tax_amount")?.unwrap_or(0.0);

        let expected = subtotal + tax;
        if (expected - total).abs() <= AMOUNT_TOLERANCE {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            "total_amount",
            self.severity(),
            "Total does not match subtotal plus tax",
            self.name(),
        )
        .with_expected(expected)
        .with_actual(total);
        Ok(vec![issue])
    }
}

/// Line item totals must sum to `subtotal`.
#[derive(Debug, Clone)]
pub struct LineItemsTotalRule {
    scope: RuleScope,
}

impl LineItemsTotalRule {
    pub fn new(scope: RuleScope) -> Self {
        Self { scope }
    }
}

impl ValidationRule for LineItemsTotalRule {
    fn name(&self) -> &str {
        "line_items_total"
    }

    fn description(&self) -> &str {
        "Line items must sum to subtotal"
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn scope(&self) -> &RuleScope {
        &self.scope
    }

    fn validate(&self, extraction: &Extraction) -> Result<Vec<ValidationIssue>, RuleError> {
        let Some(items) = extraction.line_items() else {
            return Ok(Vec::new());
        };
        let Some(subtotal) = required_number(extraction, "subtotal")? else {
            return Ok(Vec::new());
        };

        let items_total: f64 = items.iter().filter_map(|item| item.effective_total()).sum();
        if (items_total - subtotal).abs() <= AMOUNT_TOLERANCE {
            return Ok(Vec::new());
        }

        let issue = ValidationIssue::new(
            "line_items",
            self.severity(),
            "Line items do not sum to subtotal",
            self.name(),
        )
        .with_expected(subtotal)
        .with_actual(items_total);
        Ok(vec![issue])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
