//! Workflow engine core.
//!
//! - `definition` -- immutable step/workflow definitions and `WorkflowError`
//! - `context` -- read-only context view for handlers, engine-side updates
//! - `handler` -- `StepHandler` trait, boxed handlers, handler registry
//! - `retry` -- retry executor with capped exponential backoff
//! - `engine` -- sequential executor with dependency/condition gating

pub mod context;
pub mod definition;
pub mod engine;
pub mod handler;
pub mod retry;

pub use context::WorkflowContext;
pub use definition::{StepDefinition, WorkflowDefinition, WorkflowError};
pub use engine::WorkflowEngine;
pub use handler::{BoxStepHandler, HandlerRegistry, StepError, StepHandler, StepOutcome};
pub use retry::{RetryClassify, RetryPolicy};
