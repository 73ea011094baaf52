//! Inference provider abstraction.
//!
//! - `provider` -- the `InferenceProvider` trait (RPITIT)
//! - `box_provider` -- object-safe `BoxInferenceProvider` wrapper
//! - `mock` -- pattern-matching provider with canned responses

pub mod box_provider;
pub mod mock;
pub mod provider;

pub use box_provider::BoxInferenceProvider;
pub use provider::InferenceProvider;
