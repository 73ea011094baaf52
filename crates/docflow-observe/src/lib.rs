//! Observability setup for docflow: `tracing` subscriber initialisation
//! with console or JSON output and optional OpenTelemetry export.

pub mod tracing_setup;

pub use tracing_setup::{build_env_filter, init_tracing, shutdown_tracing};
