//! Inference provider implementations and the provider factory.
//!
//! [`create_provider`] builds the backend selected by [`InferenceSettings`]:
//! the canned-response mock, or Bedrock with its key read from the
//! environment variable named in `api_key_env`.

pub mod bedrock;

use std::time::Duration;

use secrecy::SecretString;

use docflow_core::llm::mock::MockProvider;
use docflow_core::llm::BoxInferenceProvider;
use docflow_types::config::InferenceSettings;
use docflow_types::llm::{LlmError, ProviderKind};

use self::bedrock::BedrockProvider;

/// Create a [`BoxInferenceProvider`] from settings, resolving the API key
/// from the process environment.
pub fn create_provider(settings: &InferenceSettings) -> Result<BoxInferenceProvider, LlmError> {
    let api_key = match settings.provider {
        ProviderKind::Mock => None,
        ProviderKind::Bedrock => std::env::var(&settings.api_key_env).ok(),
    };
    create_provider_with_key(settings, api_key.as_deref())
}

/// Create a [`BoxInferenceProvider`] from settings and an already-resolved key.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] if Bedrock is selected and
/// no key is provided.
pub fn create_provider_with_key(
    settings: &InferenceSettings,
    api_key: Option<&str>,
) -> Result<BoxInferenceProvider, LlmError> {
    let provider = match settings.provider {
        ProviderKind::Mock => BoxInferenceProvider::new(MockProvider::document_pipeline()),
        ProviderKind::Bedrock => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or(LlmError::AuthenticationFailed)?;
            let provider = BedrockProvider::new(
                SecretString::from(key.to_string()),
                &settings.model_id,
                settings.region.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )?;
            BoxInferenceProvider::new(provider)
        }
    };

    tracing::info!(
        provider = provider.name(),
        model_id = provider.model_id(),
        "inference provider ready"
    );
    Ok(provider)
}
