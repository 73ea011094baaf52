//! Rule-based validation of extracted fields.

pub mod registry;
pub mod rule;
pub mod rules;
pub mod validator;

pub use registry::ValidationRuleRegistry;
pub use rule::{RuleError, RuleScope, ValidationRule};
pub use validator::{validate_with, Validator};
