//! Business logic for docflow.
//!
//! This crate holds the workflow engine, the retry executor, the validation
//! rule engine, the inference provider abstraction and the standard
//! classify/extract/validate pipeline handlers, plus an evaluation harness
//! that scores an engine against labelled documents. It depends only on
//! `docflow-types` -- never on `docflow-infra` or any network/IO crate.

pub mod evaluation;
pub mod llm;
pub mod pipeline;
pub mod validation;
pub mod workflow;
