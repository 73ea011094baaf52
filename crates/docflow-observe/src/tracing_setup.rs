//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use docflow_types::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! docflow_observe::tracing_setup::init_tracing(&config).unwrap();
//! // ... run pipelines ...
//! docflow_observe::tracing_setup::shutdown_tracing();
//! ```

use docflow_types::config::{LogFormat, LoggingConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Initialize the global tracing subscriber.
///
/// - Installs a `fmt` layer in console or JSON format, with target
///   visibility and span close timing.
/// - When `config.otel` is set, additionally bridges spans to OpenTelemetry
///   through a stdout exporter.
/// - `RUST_LOG` takes precedence over `config.level`.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Console => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let otel_layer = if config.otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("docflow");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(build_env_filter(&config.level))
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Build the log filter: `RUST_LOG` if set, else `level`.
pub fn build_env_filter(level: &str) -> EnvFilter {
    let directive = resolve_directive(std::env::var("RUST_LOG").ok(), level);
    EnvFilter::new(directive)
}

fn resolve_directive(env_value: Option<String>, level: &str) -> String {
    match env_value {
        Some(value) if !value.trim().is_empty() => value,
        _ if level.trim().is_empty() => "info".to_string(),
        _ => level.to_string(),
    }
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
