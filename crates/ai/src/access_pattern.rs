use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::json;

use stockwatch_anomalies::{AnomalyType, DetectedAnomaly, DetectionPass, Severity};
use stockwatch_core::UserId;
use stockwatch_inventory::TransactionType;

use crate::job::AiJob;
use crate::result::AiError;
use crate::snapshot::{InventorySnapshot, MovementSnapshot, ProductSnapshot};

/// Flags bursts of manual write-downs by a single actor.
///
/// Adjustments, damage and expiry write-offs bypass the point of sale. When one
/// actor records `burst` or more of them against a product inside `window`,
/// the product is flagged `unauthorized_access`.
#[derive(Debug, Clone)]
pub struct AccessPatternJob {
    pass: DetectionPass,
    burst: usize,
    window: Duration,
}

impl AccessPatternJob {
    pub fn new(pass: DetectionPass) -> Self {
        Self {
            pass,
            burst: 5,
            window: Duration::hours(1),
        }
    }

    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn is_manual(kind: TransactionType) -> bool {
        matches!(
            kind,
            TransactionType::Adjustment | TransactionType::Damage | TransactionType::Expiry
        )
    }

    /// Largest number of manual movements by `actor` falling inside one window.
    fn densest_burst(&self, movements: &[&MovementSnapshot]) -> usize {
        let mut best = 0;
        let mut start = 0;
        for end in 0..movements.len() {
            while movements[end].at - movements[start].at > self.window {
                start += 1;
            }
            best = best.max(end - start + 1);
        }
        best
    }

    fn detect_item(&self, item: &ProductSnapshot) -> Option<DetectedAnomaly> {
        let mut by_actor: BTreeMap<UserId, Vec<&MovementSnapshot>> = BTreeMap::new();
        for m in item.history.iter().filter(|m| Self::is_manual(m.kind)) {
            if let Some(actor) = m.actor {
                by_actor.entry(actor).or_default().push(m);
            }
        }

        let (actor, count) = by_actor
            .iter_mut()
            .map(|(actor, movements)| {
                movements.sort_by_key(|m| m.at);
                (*actor, self.densest_burst(movements))
            })
            .max_by_key(|(_, count)| *count)?;

        if count < self.burst {
            return None;
        }

        Some(DetectedAnomaly {
            product_id: item.product_id,
            anomaly_type: AnomalyType::UnauthorizedAccess,
            severity: Severity::High,
            ai_confidence: Some(0.6),
            description: format!(
                "{count} manual stock write-downs on {} by one user within {} minutes",
                item.name,
                self.window.num_minutes()
            ),
            metadata: Some(json!({
                "job": self.name(),
                "actor": actor.to_string(),
                "movements": count,
                "windowMinutes": self.window.num_minutes(),
            })),
            detected_by: self.pass,
        })
    }
}

impl AiJob for AccessPatternJob {
    fn name(&self) -> &'static str {
        "access_pattern"
    }

    fn run(&self, snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError> {
        if self.burst < 2 {
            return Err(AiError::InvalidInput("burst must be >= 2".to_string()));
        }
        Ok(snapshot
            .items
            .iter()
            .filter_map(|item| self.detect_item(item))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use stockwatch_core::ProductId;

    fn manual(actor: UserId, at: DateTime<Utc>) -> MovementSnapshot {
        MovementSnapshot {
            kind: TransactionType::Adjustment,
            delta: -1,
            previous_quantity: 50,
            new_quantity: 49,
            actor: Some(actor),
            at,
        }
    }

    fn item(history: Vec<MovementSnapshot>) -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::new(),
            name: "Gift Card".to_string(),
            quantity: 45,
            minimum_stock: 5,
            price: Decimal::new(2500, 2),
            expiry_date: None,
            history,
        }
    }

    fn run(item: ProductSnapshot) -> Vec<DetectedAnomaly> {
        AccessPatternJob::new(DetectionPass::Theft)
            .run(&InventorySnapshot::new(Utc::now(), vec![item]))
            .unwrap()
    }

    #[test]
    fn burst_by_one_actor_is_flagged() {
        let actor = UserId::new();
        let t0 = Utc::now();
        let history = (0..5).map(|i| manual(actor, t0 + Duration::minutes(i * 5))).collect();
        let found = run(item(history));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anomaly_type, AnomalyType::UnauthorizedAccess);
        assert_eq!(found[0].severity, Severity::High);
    }

    #[test]
    fn spread_out_or_shared_activity_is_ignored() {
        let t0 = Utc::now();
        let actor = UserId::new();
        let spread = (0..5).map(|i| manual(actor, t0 + Duration::hours(i * 2))).collect();
        assert!(run(item(spread)).is_empty());

        let shared = (0..5).map(|i| manual(UserId::new(), t0 + Duration::minutes(i))).collect();
        assert!(run(item(shared)).is_empty());
    }

    #[test]
    fn sales_do_not_count_towards_bursts() {
        let actor = UserId::new();
        let t0 = Utc::now();
        let history = (0..8)
            .map(|i| MovementSnapshot {
                kind: TransactionType::Sale,
                ..manual(actor, t0 + Duration::minutes(i))
            })
            .collect();
        assert!(run(item(history)).is_empty());
    }

    #[test]
    fn damage_and_expiry_write_downs_count_as_manual() {
        let actor = UserId::new();
        let t0 = Utc::now();
        let history = (0..6)
            .map(|i| MovementSnapshot {
                kind: if i % 2 == 0 { TransactionType::Damage } else { TransactionType::Expiry },
                ..manual(actor, t0 + Duration::minutes(i * 3))
            })
            .collect();
        let found = run(item(history));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.as_ref().unwrap()["movements"], 6);
    }
}
