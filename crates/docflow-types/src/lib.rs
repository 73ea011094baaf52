//! Shared domain types for docflow.
//!
//! This crate contains the data shapes that flow through the document
//! pipeline: documents, extraction records, validation issues, workflow
//! run state, inference requests/responses and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod validation;
pub mod workflow;
