use serde_json::json;

use stockwatch_anomalies::{AnomalyType, DetectedAnomaly, DetectionPass, Severity};

use crate::job::AiJob;
use crate::result::AiError;
use crate::snapshot::{InventorySnapshot, ProductSnapshot};

/// Ledger reconciliation: stock that disappeared without a transaction.
///
/// Walks the ledger chain since the last recount. Wherever a record's
/// `previous_quantity` is lower than the preceding record's `new_quantity`
/// (or the current on-hand is lower than the last record), units left
/// without a ledger entry.
///
/// - several small gaps → `shrinkage`
/// - a single gap, or any gap above `small_gap_max` → `theft`
#[derive(Debug, Clone)]
pub struct ReconciliationJob {
    pass: DetectionPass,
    small_gap_max: i64,
}

/// One unexplained loss between two ledger observations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Gap {
    units: i64,
    /// Quantity the ledger expected at that point.
    expected: i64,
}

impl ReconciliationJob {
    pub fn new(pass: DetectionPass) -> Self {
        Self {
            pass,
            small_gap_max: 3,
        }
    }

    pub fn with_small_gap_max(mut self, units: i64) -> Self {
        self.small_gap_max = units;
        self
    }

    fn gaps(item: &ProductSnapshot) -> Vec<Gap> {
        let chain = item.since_last_recount();
        let mut gaps = Vec::new();
        for pair in chain.windows(2) {
            let units = pair[0].new_quantity - pair[1].previous_quantity;
            if units > 0 {
                gaps.push(Gap {
                    units,
                    expected: pair[0].new_quantity,
                });
            }
        }
        if let Some(last) = chain.last() {
            let units = last.new_quantity - item.quantity;
            if units > 0 {
                gaps.push(Gap {
                    units,
                    expected: last.new_quantity,
                });
            }
        }
        gaps
    }

    fn classify(&self, item: &ProductSnapshot, gaps: &[Gap]) -> Option<DetectedAnomaly> {
        if gaps.is_empty() {
            return None;
        }
        let total: i64 = gaps.iter().map(|g| g.units).sum();
        let largest = gaps.iter().map(|g| g.units).max().unwrap_or(0);
        let baseline = gaps.iter().map(|g| g.expected).max().unwrap_or(0).max(1);
        let loss_ratio = total as f64 / baseline as f64;

        let shrinkage = gaps.len() >= 2 && largest <= self.small_gap_max;
        let (anomaly_type, severity, confidence, description) = if shrinkage {
            let severity = if loss_ratio >= 0.10 {
                Severity::High
            } else {
                Severity::Medium
            };
            (
                AnomalyType::Shrinkage,
                severity,
                (0.5 + 0.05 * gaps.len() as f64).min(0.95),
                format!(
                    "{} units of {} unaccounted for across {} small gaps",
                    total,
                    item.name,
                    gaps.len()
                ),
            )
        } else {
            let severity = if loss_ratio >= 0.25 {
                Severity::Critical
            } else if loss_ratio >= 0.05 {
                Severity::High
            } else {
                Severity::Medium
            };
            (
                AnomalyType::Theft,
                severity,
                (0.6 + loss_ratio).min(0.95),
                format!(
                    "{} units of {} disappeared without a transaction (largest gap {})",
                    total, item.name, largest
                ),
            )
        };

        Some(DetectedAnomaly {
            product_id: item.product_id,
            anomaly_type,
            severity,
            ai_confidence: Some(confidence),
            description,
            metadata: Some(json!({
                "job": self.name(),
                "unitsMissing": total,
                "gaps": gaps.len(),
                "largestGap": largest,
                "lossRatio": loss_ratio,
            })),
            detected_by: self.pass,
        })
    }
}

impl AiJob for ReconciliationJob {
    fn name(&self) -> &'static str {
        "ledger_reconciliation"
    }

    fn run(&self, snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError> {
        if self.small_gap_max < 1 {
            return Err(AiError::InvalidInput("small_gap_max must be >= 1".to_string()));
        }
        Ok(snapshot
            .items
            .iter()
            .filter_map(|item| self.classify(item, &Self::gaps(item)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MovementSnapshot;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockwatch_core::ProductId;
    use stockwatch_inventory::TransactionType;

    fn movement(kind: TransactionType, previous: i64, new: i64) -> MovementSnapshot {
        MovementSnapshot {
            kind,
            delta: new - previous,
            previous_quantity: previous,
            new_quantity: new,
            actor: None,
            at: Utc::now(),
        }
    }

    fn item(quantity: i64, history: Vec<MovementSnapshot>) -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::new(),
            name: "Headphones".to_string(),
            quantity,
            minimum_stock: 10,
            price: Decimal::new(9999, 2),
            expiry_date: None,
            history,
        }
    }

    fn run(item: ProductSnapshot) -> Vec<DetectedAnomaly> {
        ReconciliationJob::new(DetectionPass::Theft)
            .run(&InventorySnapshot::new(Utc::now(), vec![item]))
            .unwrap()
    }

    #[test]
    fn consistent_ledger_yields_nothing() {
        let history = vec![
            movement(TransactionType::Sale, 100, 90),
            movement(TransactionType::Restock, 90, 120),
        ];
        assert!(run(item(120, history)).is_empty());
    }

    #[test]
    fn single_trailing_gap_is_theft() {
        // Sale 100 → 90, then the on-hand count drops to 85 off-ledger.
        let found = run(item(85, vec![movement(TransactionType::Sale, 100, 90)]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::Theft);
        assert_eq!(found[0].severity, Severity::High);
        assert_eq!(found[0].metadata.as_ref().unwrap()["unitsMissing"], 5);
    }

    #[test]
    fn repeated_small_gaps_are_shrinkage() {
        let history = vec![
            movement(TransactionType::Sale, 200, 198),
            movement(TransactionType::Sale, 197, 195),
            movement(TransactionType::Sale, 195, 193),
            movement(TransactionType::Sale, 192, 190),
        ];
        let found = run(item(190, history));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::Shrinkage);
        assert_eq!(found[0].metadata.as_ref().unwrap()["gaps"], 2);
    }

    #[test]
    fn recount_rebaselines_history() {
        let history = vec![
            movement(TransactionType::Sale, 100, 90),
            // 10 units vanished here, then a recount acknowledged it.
            movement(TransactionType::Adjustment, 80, 80),
            movement(TransactionType::Sale, 80, 75),
        ];
        assert!(run(item(75, history)).is_empty());
    }
}
