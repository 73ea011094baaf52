//! BedrockProvider -- concrete [`InferenceProvider`] implementation for AWS Bedrock.
//!
//! Sends requests to the Bedrock Runtime `invoke` action using Bearer token
//! authentication. The API key is wrapped in [`secrecy::SecretString`] and
//! is never logged or included in `Debug` output.

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use docflow_core::llm::InferenceProvider;
use docflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};

use super::types::{BedrockMessage, BedrockRequest, BedrockResponse};

/// AWS Bedrock Claude inference provider.
pub struct BedrockProvider {
    client: reqwest::Client,
    api_key: SecretString,
    region: String,
    model_id: String,
    timeout: Duration,
}

impl BedrockProvider {
    /// The Anthropic API version for Bedrock.
    const API_VERSION: &'static str = "bedrock-2023-05-31";

    /// Prefix used to identify Bedrock API keys.
    const KEY_PREFIX: &'static str = "bedrock-api-key-";

    /// Create a new Bedrock provider.
    ///
    /// A `bedrock-api-key-` prefix on the key is stripped and the remainder
    /// is sent as the Bearer token. `model` may be a full Bedrock model ID
    /// or a bare Claude model name (see [`Self::to_bedrock_model_id`]).
    pub fn new(
        api_key: SecretString,
        model: &str,
        region: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
                retryable: false,
            })?;

        let raw_key = api_key.expose_secret();
        let token = raw_key.strip_prefix(Self::KEY_PREFIX).unwrap_or(raw_key);
        if token.trim().is_empty() {
            return Err(LlmError::AuthenticationFailed);
        }
        let bearer_token = SecretString::from(token.to_string());

        let region = region.into();
        let model_id = Self::to_bedrock_model_id(model, &region);

        Ok(Self {
            client,
            api_key: bearer_token,
            region,
            model_id,
            timeout,
        })
    }

    /// Convert a bare Claude model name to a Bedrock inference profile ID.
    ///
    /// A model that already contains a `.` is returned unchanged.
    ///
    /// ```text
    /// ("claude-3-5-haiku-20241022", "eu-west-1") -> "eu.anthropic.claude-3-5-haiku-20241022-v1:0"
    /// ("anthropic.claude-3-5-sonnet-20241022-v2:0", _) -> unchanged
    /// ```
    pub fn to_bedrock_model_id(model: &str, region: &str) -> String {
        if model.contains('.') {
            model.to_string()
        } else {
            let region_prefix = region.split('-').next().unwrap_or("us");
            format!("{region_prefix}.anthropic.{model}-v1:0")
        }
    }

    /// Build the full Bedrock Runtime URL for a given action.
    fn url(&self, action: &str) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/{}",
            self.region, self.model_id, action
        )
    }

    /// Convert a generic [`CompletionRequest`] into a [`BedrockRequest`].
    ///
    /// A response schema becomes an instruction appended to the system
    /// prompt, since `invoke` has no native output-schema parameter.
    fn to_bedrock_request(&self, request: &CompletionRequest) -> BedrockRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| BedrockMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let system = match (&request.system, &request.response_schema) {
            (system, Some(schema)) => {
                let instruction = schema_instruction(schema);
                Some(match system {
                    Some(s) => format!("{s}\n\n{instruction}"),
                    None => instruction,
                })
            }
            (system, None) => system.clone(),
        };

        BedrockRequest {
            anthropic_version: Self::API_VERSION.to_string(),
            max_tokens: request.max_tokens,
            messages,
            system,
            temperature: request.temperature,
            stop_sequences: request.stop_sequences.clone(),
        }
    }
}

fn schema_instruction(schema: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "You must respond with valid JSON matching this schema:\n\n{pretty}\n\n\
         Respond ONLY with the JSON object, no additional text or markdown formatting."
    )
}

/// Strip a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_prefix("json").unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// `Retry-After` in delay-seconds form, as milliseconds. Saturates rather
/// than overflowing on absurd values.
fn parse_retry_after(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

/// Map a non-success HTTP status to an [`LlmError`].
fn map_error_status(status: u16, body: String, retry_after_ms: Option<u64>) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        529 => LlmError::Overloaded(body),
        s if s >= 500 => LlmError::Provider {
            message: format!("Bedrock server error HTTP {s}: {body}"),
            retryable: true,
        },
        400 => LlmError::InvalidRequest(body),
        s => LlmError::Provider {
            message: format!("HTTP {s}: {body}"),
            retryable: false,
        },
    }
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

// No Debug derive: keeps the bearer token out of formatted output.

impl InferenceProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_bedrock_request(request);
        let url = self.url("invoke");
        let started = Instant::now();

        debug!(url = %url, model_id = %self.model_id, region = %self.region, "Bedrock invoke request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout.as_secs())
                } else {
                    LlmError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        retryable: true,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %error_body, url = %url, "Bedrock API error response");
            return Err(map_error_status(status.as_u16(), error_body, retry_after_ms));
        }

        let bedrock_resp: BedrockResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let mut content = bedrock_resp.text();
        if request.response_schema.is_some() {
            let json = strip_code_fence(&content);
            if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
                return Err(LlmError::Provider {
                    message: format!("model returned invalid JSON: {e}"),
                    retryable: true,
                });
            }
            content = json.to_string();
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(
            model_id = %self.model_id,
            latency_ms,
            input_tokens = bedrock_resp.usage.input_tokens,
            output_tokens = bedrock_resp.usage.output_tokens,
            "Bedrock invoke completed"
        );

        Ok(CompletionResponse {
            content,
            model: self.model_id.clone(),
            stop_reason: map_stop_reason(bedrock_resp.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: bedrock_resp.usage.input_tokens,
                output_tokens: bedrock_resp.usage.output_tokens,
            },
            latency_ms,
        })
    }
}
