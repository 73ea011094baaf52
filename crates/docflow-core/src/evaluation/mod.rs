//! Offline evaluation of a workflow engine against labelled documents.
//!
//! - `framework` -- test cases, per-case scoring and aggregate reports
//! - `metrics` -- accuracy, field-level F1 and latency metrics

pub mod framework;
pub mod metrics;

pub use framework::{
    DEFAULT_PASS_THRESHOLD, EvaluationFramework, EvaluationReport, TestCase, TestResult,
    field_score,
};
pub use metrics::{AccuracyMetric, F1Metric, LatencyMetric, Metric, MetricError, MetricResult};
