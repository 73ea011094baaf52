//! AWS Bedrock inference provider.
//!
//! Implements [`InferenceProvider`](docflow_core::llm::InferenceProvider)
//! for the Bedrock Runtime `invoke` action with Bearer token authentication.

mod client;
pub mod types;

pub use client::BedrockProvider;
