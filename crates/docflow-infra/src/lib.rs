//! I/O implementations for docflow.
//!
//! - `config` -- TOML configuration loader with `DOCFLOW_*` environment overrides
//! - `llm` -- AWS Bedrock inference provider and the provider factory

pub mod config;
pub mod llm;
