//! Validation stage: run the rule catalog over the extraction.

use std::sync::Arc;

use tracing::debug;

use docflow_types::document::Document;

use crate::validation::{ValidationRuleRegistry, Validator};
use crate::workflow::context::WorkflowContext;
use crate::workflow::handler::{StepError, StepHandler, StepOutcome};

use super::extract::extraction_from_context;

#[derive(Debug, Clone)]
pub struct ValidateHandler {
    validator: Validator,
}

impl ValidateHandler {
    pub fn new(registry: Arc<ValidationRuleRegistry>, strict_mode: bool) -> Self {
        Self {
            validator: Validator::new(registry, strict_mode),
        }
    }
}

impl StepHandler for ValidateHandler {
    async fn execute<'a>(
        &'a self,
        document: &'a Document,
        context: WorkflowContext<'a>,
    ) -> Result<StepOutcome, StepError> {
        let extraction = extraction_from_context(&context)?
            .ok_or_else(|| StepError::MissingInput("extraction not set in context".to_string()))?;

        debug!(
            run_id = %context.run_id(),
            document_id = %document.id,
            document_type = %extraction.category,
            strict_mode = self.validator.strict_mode(),
            "validating extraction"
        );

        let output = self.validator.validate(&extraction);
        let issues = serde_json::to_value(&output.issues)
            .map_err(|e| StepError::Failed(format!("failed to serialize issues: {e}")))?;

        Ok(StepOutcome::new(output.to_value())
            .with_context("validation_valid", output.is_valid())
            .with_context("validation_issues", issues)
            .with_metric("rules_checked", output.rules_checked)
            .with_metric("rules_passed", output.rules_passed))
    }
}
