use serde_json::json;

use stockwatch_anomalies::{AnomalyType, DetectedAnomaly, DetectionPass, Severity};

use crate::job::AiJob;
use crate::result::AiError;
use crate::snapshot::{InventorySnapshot, ProductSnapshot};

/// Rolling z-score over ledger deltas.
///
/// Model:
/// - Take the signed delta of each recorded transaction.
/// - Compare the most recent delta against a rolling window of previous deltas.
/// - Flag if the z-score exceeds `z_threshold`.
#[derive(Debug, Clone)]
pub struct MovementSpikeJob {
    /// Rolling window size for baseline deltas (must be >= 2 to compute stddev).
    window: usize,
    /// Z-score threshold (e.g., 3.0).
    z_threshold: f64,
    pass: DetectionPass,
}

impl MovementSpikeJob {
    pub fn new(pass: DetectionPass) -> Self {
        Self {
            window: 10,
            z_threshold: 3.0,
            pass,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_z_threshold(mut self, z_threshold: f64) -> Self {
        self.z_threshold = z_threshold;
        self
    }
}

impl AiJob for MovementSpikeJob {
    fn name(&self) -> &'static str {
        "movement_spike"
    }

    fn run(&self, snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError> {
        if self.window < 2 {
            return Err(AiError::InvalidInput(
                "window must be >= 2 to compute standard deviation".to_string(),
            ));
        }

        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(AiError::InvalidInput(
                "z_threshold must be a finite positive number".to_string(),
            ));
        }

        Ok(snapshot
            .items
            .iter()
            .filter_map(|item| self.detect_item(item))
            .collect())
    }
}

impl MovementSpikeJob {
    fn detect_item(&self, item: &ProductSnapshot) -> Option<DetectedAnomaly> {
        // Baseline deltas count = window, plus the delta under evaluation.
        if item.history.len() < self.window + 1 {
            return None;
        }

        let deltas: Vec<f64> = item.history.iter().map(|m| m.delta as f64).collect();
        let last_delta = *deltas.last()?;

        // Rolling baseline: previous `window` deltas immediately preceding the last delta.
        let end = deltas.len() - 1;
        let baseline = &deltas[end - self.window..end];

        let mean = mean(baseline);
        let std = stddev_sample(baseline, mean);

        let (score, explanation) = if std <= f64::EPSILON {
            if (last_delta - mean).abs() <= f64::EPSILON {
                return None;
            }
            // Constant baseline: any deviation is notable but we keep it conservative.
            (
                1.0,
                format!(
                    "{} moved by {last_delta:.0} units; baseline movement is constant at {mean:.2}",
                    item.name
                ),
            )
        } else {
            let z = (last_delta - mean) / std;
            if z.abs() < self.z_threshold {
                return None;
            }
            (
                z.abs() / self.z_threshold,
                format!(
                    "{} moved by {last_delta:.0} units; baseline mean={mean:.2}, std={std:.2}, z={z:.2} (threshold={:.2})",
                    item.name, self.z_threshold
                ),
            )
        };

        Some(DetectedAnomaly {
            product_id: item.product_id,
            anomaly_type: AnomalyType::UnusualMovement,
            severity: Severity::from_score(score),
            ai_confidence: Some((0.5 + 0.1 * score).min(0.95)),
            description: explanation,
            metadata: Some(json!({
                "job": self.name(),
                "window": self.window,
                "zThreshold": self.z_threshold,
                "lastDelta": last_delta,
                "baselineMean": mean,
                "baselineStd": std,
            })),
            detected_by: self.pass,
        })
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Sample standard deviation (n-1), deterministic.
fn stddev_sample(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / ((xs.len() - 1) as f64);
    var.sqrt()
}
