//! Runs the applicable rules against one extraction.

use std::sync::Arc;

use docflow_types::extraction::Extraction;
use docflow_types::validation::ValidationOutput;

use super::registry::ValidationRuleRegistry;

/// Applies a shared rule catalog. Cheap to clone; holds no per-run state.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<ValidationRuleRegistry>,
    strict_mode: bool,
}

impl Validator {
    pub fn new(registry: Arc<ValidationRuleRegistry>, strict_mode: bool) -> Self {
        Self {
            registry,
            strict_mode,
        }
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn registry(&self) -> &ValidationRuleRegistry {
        &self.registry
    }

    /// Validate `extraction` with this validator's mode.
    pub fn validate(&self, extraction: &Extraction) -> ValidationOutput {
        validate_with(&self.registry, extraction, self.strict_mode)
    }
}

/// Run every rule that applies to the extraction's category.
///
/// A rule that errors is logged and counted as neither passed nor
/// issue-producing; the remaining rules still run.
pub fn validate_with(
    registry: &ValidationRuleRegistry,
    extraction: &Extraction,
    strict_mode: bool,
) -> ValidationOutput {
    let rules = registry.get_rules(extraction.category);
    let mut output = ValidationOutput::new(rules.len(), strict_mode);

    for rule in &rules {
        match rule.validate(extraction) {
            Ok(issues) if issues.is_empty() => output.rules_passed += 1,
            Ok(issues) => {
                for issue in issues {
                    output.add_issue(issue);
                }
            }
            Err(e) => {
                tracing::warn!(
                    rule = rule.name(),
                    category = %extraction.category,
                    error = %e,
                    "validation rule failed"
                );
            }
        }
    }

    tracing::info!(
        category = %extraction.category,
        valid = output.is_valid(),
        errors = output.error_count(),
        warnings = output.warning_count(),
        rules_checked = output.rules_checked,
        rules_passed = output.rules_passed,
        "validation completed"
    );

    output
}
