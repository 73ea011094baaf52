//! Labelled test cases run through a [`WorkflowEngine`] and scored.
//!
//! A case passes when the document is classified as expected and the
//! extracted fields score at or above the pass threshold. Field scores treat
//! strings case-insensitively after trimming and numbers by value.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use docflow_types::document::{Document, DocumentCategory};
use docflow_types::workflow::WorkflowResult;

use super::metrics::{AccuracyMetric, F1Metric, LatencyMetric, Metric, values_equal};
use crate::workflow::WorkflowEngine;

/// Minimum extraction score for a case to pass.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.8;

// ---------------------------------------------------------------------------
// Cases, results, reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub document: Document,
    pub expected_type: DocumentCategory,
    #[serde(default)]
    pub expected_fields: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl TestCase {
    pub fn new(id: impl Into<String>, document: Document, expected_type: DocumentCategory) -> Self {
        Self {
            id: id.into(),
            document,
            expected_type,
            expected_fields: Map::new(),
            tags: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_expected_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.expected_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case_id: String,
    pub passed: bool,
    pub classification_correct: bool,
    pub extraction_score: f64,
    /// `validation_valid` from the run; true when validation never ran.
    pub validation_passed: bool,
    pub latency_ms: f64,
    #[serde(default)]
    pub errors: Vec<String>,
    pub expected_type: DocumentCategory,
    pub actual_type: Option<String>,
    pub workflow_success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub classification_accuracy: f64,
    /// Mean extraction score across cases.
    pub extraction_f1: f64,
    pub average_latency_ms: f64,
    pub results: Vec<TestResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl EvaluationReport {
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests == 0 {
            return 0.0;
        }
        self.passed_tests as f64 / self.total_tests as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.completed_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    /// Headline figures without the per-case results.
    pub fn summary(&self) -> Value {
        json!({
            "total_tests": self.total_tests,
            "passed_tests": self.passed_tests,
            "failed_tests": self.failed_tests,
            "pass_rate": self.pass_rate(),
            "classification_accuracy": self.classification_accuracy,
            "extraction_f1": self.extraction_f1,
            "average_latency_ms": self.average_latency_ms,
            "started_at": self.started_at.to_rfc3339(),
            "completed_at": self.completed_at.to_rfc3339(),
            "duration_seconds": self.duration_seconds(),
        })
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Share of expected fields matched by the extracted data.
///
/// An empty expectation scores 1.0; missing extracted data scores 0.0.
pub fn field_score(expected: &Map<String, Value>, actual: Option<&Map<String, Value>>) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }
    let Some(actual) = actual else {
        return 0.0;
    };

    let matches = expected
        .iter()
        .filter(|(key, want)| {
            actual
                .get(key.as_str())
                .is_some_and(|got| field_matches(want, got))
        })
        .count();
    matches as f64 / expected.len() as f64
}

fn field_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(want), Value::String(got)) => {
            want.trim().to_lowercase() == got.trim().to_lowercase()
        }
        _ => values_equal(expected, actual),
    }
}

// ---------------------------------------------------------------------------
// EvaluationFramework
// ---------------------------------------------------------------------------

/// Runs test cases through an engine and aggregates the outcome.
pub struct EvaluationFramework<'a> {
    engine: &'a WorkflowEngine,
    pass_threshold: f64,
}

impl<'a> EvaluationFramework<'a> {
    pub fn new(engine: &'a WorkflowEngine) -> Self {
        Self {
            engine,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub async fn run_test(&self, case: &TestCase) -> TestResult {
        self.evaluate(case).await.0
    }

    /// Run every case in order and aggregate the results.
    pub async fn run_evaluation(&self, cases: &[TestCase]) -> EvaluationReport {
        let started_at = Utc::now();
        info!(test_count = cases.len(), "starting evaluation");

        let mut results = Vec::with_capacity(cases.len());
        let mut extracted = Vec::with_capacity(cases.len());
        for case in cases {
            debug!(test_id = case.id.as_str(), "running test case");
            let (result, fields) = self.evaluate(case).await;
            results.push(result);
            extracted.push(fields);
        }
        let completed_at = Utc::now();

        let predicted: Vec<String> = results
            .iter()
            .map(|r| r.actual_type.clone().unwrap_or_default())
            .collect();
        let expected: Vec<String> = results.iter().map(|r| r.expected_type.to_string()).collect();
        let latencies: Vec<f64> = results.iter().map(|r| r.latency_ms).collect();
        let truth: Vec<Map<String, Value>> =
            cases.iter().map(|c| c.expected_fields.clone()).collect();

        let mut metrics = Map::new();
        let classification_accuracy =
            record(&mut metrics, &AccuracyMetric, predicted.as_slice(), expected.as_slice());
        let average_latency_ms = record(&mut metrics, &LatencyMetric, latencies.as_slice(), &[]);
        record(&mut metrics, &F1Metric, extracted.as_slice(), truth.as_slice());

        let total_tests = results.len();
        let passed_tests = results.iter().filter(|r| r.passed).count();
        let extraction_f1 = if total_tests == 0 {
            0.0
        } else {
            results.iter().map(|r| r.extraction_score).sum::<f64>() / total_tests as f64
        };

        let mut metadata = Map::new();
        metadata.insert("pass_threshold".into(), json!(self.pass_threshold));
        metadata.insert("metrics".into(), Value::Object(metrics));

        let report = EvaluationReport {
            total_tests,
            passed_tests,
            failed_tests: total_tests - passed_tests,
            classification_accuracy,
            extraction_f1,
            average_latency_ms,
            results,
            started_at,
            completed_at,
            metadata,
        };

        info!(
            total = report.total_tests,
            passed = report.passed_tests,
            accuracy = report.classification_accuracy,
            f1 = report.extraction_f1,
            "evaluation completed"
        );
        report
    }

    /// Score one case, also returning the extracted fields for aggregate metrics.
    async fn evaluate(&self, case: &TestCase) -> (TestResult, Map<String, Value>) {
        let started = Instant::now();
        let result = self.engine.process(&case.document).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let extracted = result
            .context_value("extracted_data")
            .and_then(Value::as_object)
            .cloned();
        let scored = self.score(case, &result, extracted.as_ref(), latency_ms);
        (scored, extracted.unwrap_or_default())
    }

    fn score(
        &self,
        case: &TestCase,
        result: &WorkflowResult,
        extracted: Option<&Map<String, Value>>,
        latency_ms: f64,
    ) -> TestResult {
        let actual_type = result
            .context_value("document_type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let classification_correct =
            actual_type.as_deref() == Some(case.expected_type.to_string().as_str());
        let extraction_score = field_score(&case.expected_fields, extracted);
        let validation_passed = result
            .context_value("validation_valid")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut errors = Vec::new();
        if !result.success {
            errors.push(format!(
                "Workflow failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }

        TestResult {
            test_case_id: case.id.clone(),
            passed: classification_correct && extraction_score >= self.pass_threshold,
            classification_correct,
            extraction_score,
            validation_passed,
            latency_ms,
            errors,
            expected_type: case.expected_type,
            actual_type,
            workflow_success: result.success,
        }
    }
}

/// Compute `metric`, store it under its name and return its value. Failures
/// are logged and count as zero.
fn record<T, M: Metric<T>>(
    metrics: &mut Map<String, Value>,
    metric: &M,
    predictions: &[T],
    ground_truth: &[T],
) -> f64 {
    match metric.compute(predictions, ground_truth) {
        Ok(result) => {
            let value = result.value;
            let stored = serde_json::to_value(&result).unwrap_or(Value::Null);
            metrics.insert(metric.name().to_string(), stored);
            value
        }
        Err(e) => {
            warn!(metric = metric.name(), error = %e, "metric computation failed");
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
