//! Ordered rule catalog.
//!
//! Populated during setup, then shared read-only (behind an `Arc`) by every
//! validation that runs. Registration takes `&mut self`, so adding rules
//! while validations are in flight cannot compile.

use std::sync::Arc;

use docflow_types::document::DocumentCategory;

use super::rule::{RuleScope, ValidationRule};
use super::rules::{
    DateFormatRule, DateOrderRule, LineItemsTotalRule, PositiveAmountRule, RequiredFieldRule,
    TotalMatchesSubtotalPlusTaxRule,
};

#[derive(Clone, Default)]
pub struct ValidationRuleRegistry {
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl ValidationRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the standard invoice, receipt and contract rules.
    pub fn with_default_rules() -> Self {
        use DocumentCategory::{Contract, Invoice, Receipt};

        let mut registry = Self::new();
        registry.register(RequiredFieldRule::new("invoice_number", RuleScope::only([Invoice])));
        registry.register(RequiredFieldRule::new(
            "total_amount",
            RuleScope::only([Invoice, Receipt]),
        ));
        registry.register(DateFormatRule::new("invoice_date", RuleScope::only([Invoice])));
        registry.register(DateOrderRule::new(
            "invoice_date",
            "due_date",
            RuleScope::only([Invoice]),
        ));
        registry.register(PositiveAmountRule::new(
            "total_amount",
            RuleScope::only([Invoice, Receipt]),
        ));
        registry.register(RequiredFieldRule::new("merchant_name", RuleScope::only([Receipt])));
        registry.register(DateFormatRule::new("transaction_date", RuleScope::only([Receipt])));
        registry.register(DateOrderRule::new(
            "effective_date",
            "expiration_date",
            RuleScope::only([Contract]),
        ));
        registry.register(TotalMatchesSubtotalPlusTaxRule::new(RuleScope::only([
            Invoice, Receipt,
        ])));
        registry.register(LineItemsTotalRule::new(RuleScope::only([Invoice, Receipt])));
        registry
    }

    /// Append a rule. Rules are evaluated in registration order.
    pub fn register<R: ValidationRule + 'static>(&mut self, rule: R) {
        tracing::debug!(rule = rule.name(), "registered validation rule");
        self.rules.push(Arc::new(rule));
    }

    /// Rules that apply to `category`, in registration order.
    pub fn get_rules(&self, category: DocumentCategory) -> Vec<Arc<dyn ValidationRule>> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to(category))
            .cloned()
            .collect()
    }

    pub fn all_rules(&self) -> &[Arc<dyn ValidationRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for ValidationRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("ValidationRuleRegistry")
            .field("rules", &names)
            .finish()
    }
}
