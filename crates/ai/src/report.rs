//! Detection result shapes at the service boundary.
//!
//! Detection services do not agree on a response shape: the general pass
//! reports `anomaliesDetected`, the theft pass `totalAnomaliesDetected`, and
//! some responses carry no count at all. [`RawDetectionResponse::normalize`]
//! folds all of them into one [`DetectionSummary`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockwatch_anomalies::{Anomaly, AnomalyType, DetectedAnomaly, DetectionPass, Severity};
use stockwatch_core::ProductId;

use crate::snapshot::InventorySnapshot;

/// Wire shape of one anomaly as a detection service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnomaly {
    pub product_id: String,
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// Wire shape of a detection pass response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDetectionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomalies_detected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_anomalies_detected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts_generated: Option<u64>,
    #[serde(default)]
    pub anomalies: Vec<RawAnomaly>,
}

/// Canonical result of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub pass: DetectionPass,
    pub anomalies_detected: u64,
    pub alerts_generated: u64,
    pub findings: Vec<DetectedAnomaly>,
    /// Reported anomalies dropped because of an unknown type, severity or product.
    pub discarded: usize,
}

impl From<&DetectedAnomaly> for RawAnomaly {
    fn from(d: &DetectedAnomaly) -> Self {
        Self {
            product_id: d.product_id.to_string(),
            anomaly_type: d.anomaly_type.as_str().to_string(),
            severity: d.severity.as_str().to_string(),
            ai_confidence: d.ai_confidence,
            description: d.description.clone(),
            metadata: d.metadata.clone(),
        }
    }
}

impl RawAnomaly {
    fn parse(&self, pass: DetectionPass) -> Result<DetectedAnomaly, String> {
        let product_id: ProductId = self
            .product_id
            .parse()
            .map_err(|_| format!("unparseable product id `{}`", self.product_id))?;
        let anomaly_type: AnomalyType = self.anomaly_type.parse().map_err(|e| format!("{e}"))?;
        let severity: Severity = self.severity.parse().map_err(|e| format!("{e}"))?;
        let description = if self.description.trim().is_empty() {
            format!("{} reported by {} pass", anomaly_type.label(), pass)
        } else {
            self.description.clone()
        };
        Ok(DetectedAnomaly {
            product_id,
            anomaly_type,
            severity,
            ai_confidence: self.ai_confidence.filter(|c| c.is_finite()).map(|c| c.clamp(0.0, 1.0)),
            description,
            metadata: self.metadata.clone(),
            detected_by: pass,
        })
    }
}

impl RawDetectionResponse {
    /// Response in the shape the given pass reports.
    pub fn from_findings(pass: DetectionPass, findings: &[DetectedAnomaly], alerts_generated: u64) -> Self {
        let count = Some(findings.len() as u64);
        let (anomalies_detected, total_anomalies_detected) = match pass {
            DetectionPass::General => (count, None),
            DetectionPass::Theft => (None, count),
        };
        Self {
            anomalies_detected,
            total_anomalies_detected,
            alerts_generated: Some(alerts_generated),
            anomalies: findings.iter().map(RawAnomaly::from).collect(),
        }
    }

    /// Fold the response into the canonical summary.
    ///
    /// The reported count wins over the number of listed anomalies; when no
    /// count is reported the listed anomalies are counted instead.
    pub fn normalize(self, pass: DetectionPass) -> DetectionSummary {
        let anomalies_detected = self
            .anomalies_detected
            .or(self.total_anomalies_detected)
            .unwrap_or(self.anomalies.len() as u64);

        let mut findings = Vec::with_capacity(self.anomalies.len());
        let mut discarded = 0;
        for raw in &self.anomalies {
            match raw.parse(pass) {
                Ok(f) => findings.push(f),
                Err(reason) => {
                    discarded += 1;
                    tracing::warn!(%pass, %reason, "discarding detection result");
                }
            }
        }

        DetectionSummary {
            pass,
            anomalies_detected,
            alerts_generated: self.alerts_generated.unwrap_or(0),
            findings,
            discarded,
        }
    }
}

/// Aggregate loss picture over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheftAnalytics {
    pub days: u32,
    pub since: DateTime<Utc>,
    pub summary: TheftSummary,
    pub high_risk_products: Vec<HighRiskProduct>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheftSummary {
    pub total_anomalies: usize,
    pub unresolved: usize,
    pub by_type: BTreeMap<AnomalyType, usize>,
    pub estimated_loss: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighRiskProduct {
    pub product_id: ProductId,
    pub name: String,
    pub loss_anomalies: usize,
    pub critical_anomalies: usize,
    pub estimated_loss: Decimal,
}

impl TheftAnalytics {
    /// Units reported missing by a loss anomaly.
    fn units_missing(anomaly: &Anomaly) -> i64 {
        anomaly
            .metadata()
            .and_then(|m| m.get("unitsMissing"))
            .and_then(JsonValue::as_i64)
            .unwrap_or(0)
            .max(0)
    }

    /// Compute analytics for anomalies created within `days` of `now`.
    ///
    /// Product names and prices come from `inventory`; anomalies whose product
    /// is no longer present still count, at zero estimated loss. A window
    /// reaching past the earliest representable time covers everything, and
    /// loss totals saturate at `Decimal::MAX`.
    pub fn compute(days: u32, now: DateTime<Utc>, anomalies: &[Anomaly], inventory: &InventorySnapshot) -> Self {
        let since = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut summary = TheftSummary::default();
        let mut per_product: BTreeMap<ProductId, HighRiskProduct> = BTreeMap::new();

        for a in anomalies.iter().filter(|a| a.created_at() >= since) {
            summary.total_anomalies += 1;
            if !a.is_resolved() {
                summary.unresolved += 1;
            }
            *summary.by_type.entry(a.anomaly_type()).or_insert(0) += 1;

            let item = inventory.item(a.product_id());
            let loss = if a.anomaly_type().is_loss() {
                item.map(|i| i.price.saturating_mul(Decimal::from(Self::units_missing(a))))
                    .unwrap_or(Decimal::ZERO)
            } else {
                Decimal::ZERO
            };
            summary.estimated_loss = summary.estimated_loss.saturating_add(loss);

            let entry = per_product.entry(a.product_id()).or_insert_with(|| HighRiskProduct {
                product_id: a.product_id(),
                name: item.map(|i| i.name.clone()).unwrap_or_default(),
                loss_anomalies: 0,
                critical_anomalies: 0,
                estimated_loss: Decimal::ZERO,
            });
            if a.anomaly_type().is_loss() {
                entry.loss_anomalies += 1;
            }
            if a.severity() == Severity::Critical {
                entry.critical_anomalies += 1;
            }
            entry.estimated_loss = entry.estimated_loss.saturating_add(loss);
        }

        let mut high_risk_products: Vec<HighRiskProduct> = per_product
            .into_values()
            .filter(|p| p.loss_anomalies >= 2 || p.critical_anomalies > 0)
            .collect();
        high_risk_products.sort_by(|a, b| {
            b.estimated_loss
                .cmp(&a.estimated_loss)
                .then(b.loss_anomalies.cmp(&a.loss_anomalies))
        });

        Self {
            days,
            since,
            summary,
            high_risk_products,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ProductSnapshot;
    use serde_json::json;
    use stockwatch_core::AnomalyId;

    fn raw(product_id: &str, kind: &str, severity: &str) -> RawAnomaly {
        RawAnomaly {
            product_id: product_id.to_string(),
            anomaly_type: kind.to_string(),
            severity: severity.to_string(),
            ai_confidence: Some(0.8),
            description: "flagged".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn both_count_fields_normalize_to_anomalies_detected() {
        let general: RawDetectionResponse =
            serde_json::from_value(json!({ "anomaliesDetected": 3, "alertsGenerated": 1 })).unwrap();
        let theft: RawDetectionResponse =
            serde_json::from_value(json!({ "totalAnomaliesDetected": 3 })).unwrap();

        let g = general.normalize(DetectionPass::General);
        let t = theft.normalize(DetectionPass::Theft);
        assert_eq!(g.anomalies_detected, 3);
        assert_eq!(t.anomalies_detected, 3);
        assert_eq!(g.alerts_generated, 1);
        assert_eq!(t.alerts_generated, 0);
    }

    #[test]
    fn missing_count_falls_back_to_listed_anomalies() {
        let id = ProductId::new().to_string();
        let resp = RawDetectionResponse {
            anomalies: vec![raw(&id, "theft", "high"), raw(&id, "low-stock", "medium")],
            ..Default::default()
        };
        let s = resp.normalize(DetectionPass::Theft);
        assert_eq!(s.anomalies_detected, 2);
        assert_eq!(s.findings.len(), 2);
        assert_eq!(s.findings[1].anomaly_type, AnomalyType::LowStock);
        assert!(s.findings.iter().all(|f| f.detected_by == DetectionPass::Theft));
    }

    #[test]
    fn unknown_values_are_discarded_and_counted() {
        let id = ProductId::new().to_string();
        let resp = RawDetectionResponse {
            anomalies_detected: Some(4),
            anomalies: vec![
                raw(&id, "theft", "critical"),
                raw(&id, "teleportation", "high"),
                raw(&id, "theft", "apocalyptic"),
                raw("not-a-uuid", "theft", "high"),
            ],
            ..Default::default()
        };
        let s = resp.normalize(DetectionPass::General);
        assert_eq!(s.anomalies_detected, 4);
        assert_eq!(s.findings.len(), 1);
        assert_eq!(s.discarded, 3);
    }

    #[test]
    fn from_findings_uses_the_pass_specific_count_field() {
        let json = serde_json::to_value(RawDetectionResponse::from_findings(DetectionPass::Theft, &[], 0)).unwrap();
        assert_eq!(json["totalAnomaliesDetected"], 0);
        assert!(json.get("anomaliesDetected").is_none());
    }

    #[test]
    fn analytics_estimate_loss_and_rank_high_risk_products() {
        let now = Utc::now();
        let product_id = ProductId::new();
        let inventory = InventorySnapshot::new(
            now,
            vec![ProductSnapshot {
                product_id,
                name: "Wireless Mouse".to_string(),
                quantity: 80,
                minimum_stock: 10,
                price: Decimal::new(2500, 2),
                expiry_date: None,
                history: vec![],
            }],
        );
        let loss = |units: i64, at: DateTime<Utc>| {
            Anomaly::open(
                AnomalyId::new(),
                DetectedAnomaly {
                    product_id,
                    anomaly_type: AnomalyType::Theft,
                    severity: Severity::High,
                    ai_confidence: None,
                    description: "missing units".to_string(),
                    metadata: Some(json!({ "unitsMissing": units })),
                    detected_by: DetectionPass::Theft,
                },
                at,
            )
            .unwrap()
        };
        let anomalies = vec![
            loss(4, now - Duration::days(1)),
            loss(2, now - Duration::days(2)),
            loss(100, now - Duration::days(60)),
        ];

        let report = TheftAnalytics::compute(30, now, &anomalies, &inventory);
        assert_eq!(report.summary.total_anomalies, 2);
        assert_eq!(report.summary.unresolved, 2);
        assert_eq!(report.summary.by_type.get(&AnomalyType::Theft), Some(&2));
        assert_eq!(report.summary.estimated_loss, Decimal::new(15000, 2));
        assert_eq!(report.high_risk_products.len(), 1);
        assert_eq!(report.high_risk_products[0].name, "Wireless Mouse");
    }

    #[test]
    fn huge_windows_and_prices_do_not_overflow() {
        let now = Utc::now();
        let product_id = ProductId::new();
        let inventory = InventorySnapshot::new(
            now,
            vec![ProductSnapshot {
                product_id,
                name: "Vault Display Piece".to_string(),
                quantity: 0,
                minimum_stock: 0,
                price: Decimal::MAX,
                expiry_date: None,
                history: vec![],
            }],
        );
        let theft = |units: i64| {
            Anomaly::open(
                AnomalyId::new(),
                DetectedAnomaly {
                    product_id,
                    anomaly_type: AnomalyType::Theft,
                    severity: Severity::Critical,
                    ai_confidence: None,
                    description: "missing units".to_string(),
                    metadata: Some(json!({ "unitsMissing": units })),
                    detected_by: DetectionPass::Theft,
                },
                now,
            )
            .unwrap()
        };
        let anomalies = vec![theft(10), theft(3)];

        let report = TheftAnalytics::compute(u32::MAX, now, &anomalies, &inventory);
        assert_eq!(report.since, DateTime::<Utc>::MIN_UTC);
        assert_eq!(report.summary.total_anomalies, 2);
        assert_eq!(report.summary.estimated_loss, Decimal::MAX);
        assert_eq!(report.high_risk_products[0].estimated_loss, Decimal::MAX);
    }
}
