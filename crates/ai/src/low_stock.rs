use chrono::Duration;
use serde_json::json;

use stockwatch_anomalies::{AnomalyType, DetectedAnomaly, DetectionPass, Severity};

use crate::job::AiJob;
use crate::result::AiError;
use crate::snapshot::{InventorySnapshot, ProductSnapshot};

/// Threshold checks: stock at/below minimum, stock close to expiry.
#[derive(Debug, Clone)]
pub struct LowStockJob {
    pass: DetectionPass,
    expiry_horizon: Duration,
}

impl LowStockJob {
    pub fn new(pass: DetectionPass) -> Self {
        Self {
            pass,
            expiry_horizon: Duration::days(7),
        }
    }

    pub fn with_expiry_horizon(mut self, horizon: Duration) -> Self {
        self.expiry_horizon = horizon;
        self
    }

    fn low_stock(&self, item: &ProductSnapshot) -> Option<DetectedAnomaly> {
        if item.quantity > item.minimum_stock {
            return None;
        }
        let severity = if item.quantity == 0 {
            Severity::Critical
        } else if item.quantity <= item.minimum_stock / 2 {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(DetectedAnomaly {
            product_id: item.product_id,
            anomaly_type: AnomalyType::LowStock,
            severity,
            ai_confidence: Some(1.0),
            description: format!(
                "{} has {} units left (minimum {})",
                item.name, item.quantity, item.minimum_stock
            ),
            metadata: Some(json!({
                "job": self.name(),
                "quantity": item.quantity,
                "minimumStock": item.minimum_stock,
            })),
            detected_by: self.pass,
        })
    }

    fn expiry_risk(&self, item: &ProductSnapshot, snapshot: &InventorySnapshot) -> Option<DetectedAnomaly> {
        let expiry = item.expiry_date?;
        if item.quantity == 0 {
            return None;
        }
        let today = snapshot.taken_at.date_naive();
        let days_left = (expiry - today).num_days();
        if days_left > self.expiry_horizon.num_days() {
            return None;
        }
        let (severity, description) = if days_left < 0 {
            (
                Severity::High,
                format!("{} units of {} expired {} day(s) ago", item.quantity, item.name, -days_left),
            )
        } else {
            (
                Severity::Medium,
                format!("{} units of {} expire in {} day(s)", item.quantity, item.name, days_left),
            )
        };
        Some(DetectedAnomaly {
            product_id: item.product_id,
            anomaly_type: AnomalyType::ExpiryRisk,
            severity,
            ai_confidence: Some(1.0),
            description,
            metadata: Some(json!({
                "job": self.name(),
                "expiryDate": expiry,
                "daysLeft": days_left,
            })),
            detected_by: self.pass,
        })
    }
}

impl AiJob for LowStockJob {
    fn name(&self) -> &'static str {
        "low_stock"
    }

    fn run(&self, snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError> {
        let mut found = Vec::new();
        for item in &snapshot.items {
            found.extend(self.low_stock(item));
            found.extend(self.expiry_risk(item, snapshot));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use stockwatch_core::ProductId;

    fn item(quantity: i64, minimum_stock: i64, expiry_date: Option<NaiveDate>) -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::new(),
            name: "Yogurt".to_string(),
            quantity,
            minimum_stock,
            price: Decimal::ONE,
            expiry_date,
            history: vec![],
        }
    }

    fn snapshot(items: Vec<ProductSnapshot>) -> InventorySnapshot {
        InventorySnapshot::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(), items)
    }

    #[test]
    fn severity_scales_with_depletion() {
        let job = LowStockJob::new(DetectionPass::General);
        let found = job
            .run(&snapshot(vec![item(0, 10, None), item(5, 10, None), item(8, 10, None), item(11, 10, None)]))
            .unwrap();
        let severities: Vec<_> = found.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::High, Severity::Medium]);
        assert!(found.iter().all(|f| f.anomaly_type == AnomalyType::LowStock));
    }

    #[test]
    fn severity_holds_at_extreme_thresholds() {
        let job = LowStockJob::new(DetectionPass::General);
        let found = job
            .run(&snapshot(vec![
                item(i64::MAX, i64::MAX, None),
                item(i64::MAX / 2 + 1, i64::MAX, None),
                item(i64::MAX / 2, i64::MAX, None),
            ]))
            .unwrap();
        let severities: Vec<_> = found.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::Medium, Severity::Medium, Severity::High]);
    }

    #[test]
    fn flags_expired_and_soon_expiring_stock() {
        let job = LowStockJob::new(DetectionPass::General);
        let found = job
            .run(&snapshot(vec![
                item(50, 10, NaiveDate::from_ymd_opt(2024, 5, 30)),
                item(50, 10, NaiveDate::from_ymd_opt(2024, 6, 5)),
                item(50, 10, NaiveDate::from_ymd_opt(2024, 12, 1)),
                item(0, 0, NaiveDate::from_ymd_opt(2024, 5, 1)),
            ]))
            .unwrap();
        let expiry: Vec<_> = found
            .iter()
            .filter(|f| f.anomaly_type == AnomalyType::ExpiryRisk)
            .map(|f| f.severity)
            .collect();
        assert_eq!(expiry, vec![Severity::High, Severity::Medium]);
    }
}
