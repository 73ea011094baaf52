//! Validation issue and result types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How serious a validation issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!("invalid severity: '{other}'")),
        }
    }
}

/// A single problem found in an extraction by one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Field path the issue refers to (comma-joined for cross-field rules).
    pub field: String,
    pub severity: Severity,
    pub message: String,
    /// Name of the rule that produced the issue.
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl ValidationIssue {
    pub fn new(
        field: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            severity,
            message: message.into(),
            rule: rule.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

/// Outcome of running the applicable rules against one extraction.
///
/// Validity is derived from the issue list and the mode, never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub issues: Vec<ValidationIssue>,
    /// Number of rules that applied to the document category.
    pub rules_checked: usize,
    /// Number of applicable rules that ran and produced no issues.
    pub rules_passed: usize,
    /// When set, warnings invalidate the result as well as errors.
    pub strict_mode: bool,
}

impl ValidationOutput {
    pub fn new(rules_checked: usize, strict_mode: bool) -> Self {
        Self {
            issues: Vec::new(),
            rules_checked,
            rules_passed: 0,
            strict_mode,
        }
    }

    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    /// Zero errors, and in strict mode zero warnings too.
    pub fn is_valid(&self) -> bool {
        if self.strict_mode {
            self.error_count() == 0 && self.warning_count() == 0
        } else {
            self.error_count() == 0
        }
    }

    /// Issues reported against a specific field.
    pub fn issues_for_field(&self, field: &str) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.field == field).collect()
    }

    /// JSON summary including the derived validity and per-severity counts.
    pub fn to_value(&self) -> Value {
        json!({
            "valid": self.is_valid(),
            "strict_mode": self.strict_mode,
            "error_count": self.error_count(),
            "warning_count": self.warning_count(),
            "info_count": self.info_count(),
            "rules_checked": self.rules_checked,
            "rules_passed": self.rules_passed,
            "issues": self.issues,
        })
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> ValidationIssue {
        ValidationIssue::new("total_amount", severity, "bad total", "test_rule")
    }

    #[test]
    fn test_severity_roundtrip() {
        for severity in [Severity::Error, Severity::Warning, Severity::Info] {
            let parsed: Severity = severity.to_string().parse().unwrap();
            assert_eq!(parsed, severity);
        }
    }

    #[test]
    fn test_warning_only_valid_in_normal_mode() {
        let mut output = ValidationOutput::new(1, false);
        output.add_issue(issue(Severity::Warning));
        assert!(output.is_valid());

        output.strict_mode = true;
        assert!(!output.is_valid());
    }

    #[test]
    fn test_error_invalidates_in_both_modes() {
        let mut output = ValidationOutput::new(2, false);
        output.add_issue(issue(Severity::Error));
        assert!(!output.is_valid());
        output.strict_mode = true;
        assert!(!output.is_valid());
    }

    #[test]
    fn test_info_never_invalidates() {
        let mut output = ValidationOutput::new(1, true);
        output.add_issue(issue(Severity::Info));
        assert!(output.is_valid());
        assert_eq!(output.info_count(), 1);
    }

    #[test]
    fn test_to_value_reports_counts() {
        let mut output = ValidationOutput::new(3, false);
        output.rules_passed = 2;
        output.add_issue(issue(Severity::Warning).with_expected(110.0).with_actual(200.0));
        let value = output.to_value();
        assert_eq!(value["valid"], true);
        assert_eq!(value["warning_count"], 1);
        assert_eq!(value["rules_checked"], 3);
        assert_eq!(value["issues"][0]["expected"], 110.0);
        assert_eq!(output.issues_for_field("total_amount").len(), 1);
    }
}
