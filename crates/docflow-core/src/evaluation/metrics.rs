//! Aggregate metrics over evaluation runs.
//!
//! Each [`Metric`] reduces parallel slices of predictions and ground truth to
//! a single [`MetricResult`] with a headline value and named details.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("predictions ({predictions}) and ground truth ({ground_truth}) must have the same length")]
    LengthMismatch {
        predictions: usize,
        ground_truth: usize,
    },
}

/// Outcome of computing one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub name: String,
    pub value: f64,
    pub details: Map<String, Value>,
}

impl MetricResult {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// A metric computed over predictions of type `T`.
pub trait Metric<T> {
    fn name(&self) -> &'static str;

    fn compute(&self, predictions: &[T], ground_truth: &[T]) -> Result<MetricResult, MetricError>;
}

/// JSON equality where numbers compare by value, so `2160` matches `2160.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn check_lengths<T>(predictions: &[T], ground_truth: &[T]) -> Result<(), MetricError> {
    if predictions.len() != ground_truth.len() {
        return Err(MetricError::LengthMismatch {
            predictions: predictions.len(),
            ground_truth: ground_truth.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------

/// Share of predictions equal to their ground truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyMetric;

impl<T: PartialEq> Metric<T> for AccuracyMetric {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn compute(&self, predictions: &[T], ground_truth: &[T]) -> Result<MetricResult, MetricError> {
        check_lengths(predictions, ground_truth)?;
        if predictions.is_empty() {
            return Ok(MetricResult::new("accuracy", 0.0));
        }

        let correct = predictions
            .iter()
            .zip(ground_truth)
            .filter(|(p, g)| p == g)
            .count();
        let total = predictions.len();
        Ok(MetricResult::new("accuracy", correct as f64 / total as f64)
            .with_detail("correct", correct)
            .with_detail("total", total))
    }
}

// ---------------------------------------------------------------------------
// Field-level F1
// ---------------------------------------------------------------------------

/// Field-level F1 over extracted field maps.
///
/// Precision and recall are computed per pair and averaged; pairs with an
/// empty ground truth are ignored. Null predicted values count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct F1Metric;

impl Metric<Map<String, Value>> for F1Metric {
    fn name(&self) -> &'static str {
        "f1"
    }

    fn compute(
        &self,
        predictions: &[Map<String, Value>],
        ground_truth: &[Map<String, Value>],
    ) -> Result<MetricResult, MetricError> {
        check_lengths(predictions, ground_truth)?;

        let mut total_precision = 0.0;
        let mut total_recall = 0.0;
        let mut count = 0usize;

        for (pred, truth) in predictions.iter().zip(ground_truth) {
            if truth.is_empty() {
                continue;
            }
            let agrees = |key: &str| match (pred.get(key), truth.get(key)) {
                (Some(p), Some(t)) => values_equal(p, t),
                _ => false,
            };

            let predicted: Vec<&str> = pred
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k.as_str())
                .collect();
            let precision = if predicted.is_empty() {
                0.0
            } else {
                let correct = predicted.iter().filter(|k| agrees(**k)).count();
                correct as f64 / predicted.len() as f64
            };

            let found = truth.keys().filter(|k| agrees(k.as_str())).count();
            let recall = found as f64 / truth.len() as f64;

            total_precision += precision;
            total_recall += recall;
            count += 1;
        }

        if count == 0 {
            return Ok(MetricResult::new("f1", 0.0));
        }

        let precision = total_precision / count as f64;
        let recall = total_recall / count as f64;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Ok(MetricResult::new("f1", f1)
            .with_detail("precision", precision)
            .with_detail("recall", recall))
    }
}

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------

/// Latency distribution in milliseconds. Ground truth is not consulted.
///
/// p95 and p99 fall back to the maximum until there are 20 and 100 samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyMetric;

impl Metric<f64> for LatencyMetric {
    fn name(&self) -> &'static str {
        "latency"
    }

    fn compute(&self, predictions: &[f64], _ground_truth: &[f64]) -> Result<MetricResult, MetricError> {
        let mut sorted = predictions.to_vec();
        sorted.sort_by(f64::total_cmp);
        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return Ok(MetricResult::new("latency", 0.0));
        };

        let n = sorted.len();
        let average = sorted.iter().sum::<f64>() / n as f64;
        let p50 = sorted[n / 2];
        let p95 = if n >= 20 { sorted[n * 95 / 100] } else { max };
        let p99 = if n >= 100 { sorted[n * 99 / 100] } else { max };

        Ok(MetricResult::new("latency", average)
            .with_detail("average_ms", average)
            .with_detail("p50_ms", p50)
            .with_detail("p95_ms", p95)
            .with_detail("p99_ms", p99)
            .with_detail("min_ms", min)
            .with_detail("max_ms", max))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
