use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockwatch_core::{AnomalyId, DomainError, DomainResult, Entity, ProductId};

use crate::kind::{AnomalyType, DetectionPass, Severity};

/// Detection output for a single product, before it enters the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedAnomaly {
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub ai_confidence: Option<f64>,
    pub description: String,
    pub metadata: Option<JsonValue>,
    pub detected_by: DetectionPass,
}

impl DetectedAnomaly {
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("anomaly description cannot be empty"));
        }
        if let Some(c) = self.ai_confidence {
            if !(c.is_finite() && (0.0..=1.0).contains(&c)) {
                return Err(DomainError::validation(format!(
                    "aiConfidence must be within [0, 1] (got {c})"
                )));
            }
        }
        Ok(())
    }
}

/// A triaged irregularity.
///
/// The only state transition is `resolve`, and it is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    id: AnomalyId,
    product_id: ProductId,
    #[serde(rename = "type")]
    anomaly_type: AnomalyType,
    severity: Severity,
    ai_confidence: Option<f64>,
    description: String,
    metadata: Option<JsonValue>,
    detected_by: DetectionPass,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Anomaly {
    pub fn open(id: AnomalyId, detected: DetectedAnomaly, created_at: DateTime<Utc>) -> DomainResult<Self> {
        detected.validate()?;
        Ok(Self {
            id,
            product_id: detected.product_id,
            anomaly_type: detected.anomaly_type,
            severity: detected.severity,
            ai_confidence: detected.ai_confidence,
            description: detected.description.trim().to_string(),
            metadata: detected.metadata,
            detected_by: detected.detected_by,
            resolved: false,
            resolved_at: None,
            created_at,
        })
    }

    pub fn id_typed(&self) -> AnomalyId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn anomaly_type(&self) -> AnomalyType {
        self.anomaly_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn ai_confidence(&self) -> Option<f64> {
        self.ai_confidence
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn metadata(&self) -> Option<&JsonValue> {
        self.metadata.as_ref()
    }

    pub fn detected_by(&self) -> DetectionPass {
        self.detected_by
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Resolve the anomaly.
    ///
    /// Returns the resolved record and whether this call changed anything;
    /// resolving an already-resolved anomaly is a no-op.
    pub fn resolve(&self, at: DateTime<Utc>) -> (Self, bool) {
        if self.resolved {
            return (self.clone(), false);
        }
        let mut next = self.clone();
        next.resolved = true;
        next.resolved_at = Some(at);
        (next, true)
    }

    /// Describes the condition `(product_id, anomaly_type)` for deduplication purposes.
    pub fn same_condition(&self, product_id: ProductId, anomaly_type: AnomalyType) -> bool {
        self.product_id == product_id && self.anomaly_type == anomaly_type
    }
}

impl Entity for Anomaly {
    type Id = AnomalyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detected() -> DetectedAnomaly {
        DetectedAnomaly {
            product_id: ProductId::new(),
            anomaly_type: AnomalyType::Shrinkage,
            severity: Severity::High,
            ai_confidence: Some(0.8),
            description: "4 units unaccounted for across 4 gaps".to_string(),
            metadata: Some(json!({ "gaps": 4 })),
            detected_by: DetectionPass::General,
        }
    }

    #[test]
    fn open_starts_unresolved() {
        let a = Anomaly::open(AnomalyId::new(), detected(), Utc::now()).unwrap();
        assert!(!a.is_resolved());
        assert_eq!(a.resolved_at(), None);
        assert_eq!(a.metadata(), Some(&json!({ "gaps": 4 })));
    }

    #[test]
    fn open_rejects_out_of_range_confidence() {
        let mut d = detected();
        d.ai_confidence = Some(1.2);
        assert!(Anomaly::open(AnomalyId::new(), d, Utc::now()).is_err());

        let mut d = detected();
        d.ai_confidence = Some(f64::NAN);
        assert!(Anomaly::open(AnomalyId::new(), d, Utc::now()).is_err());
    }

    #[test]
    fn resolve_twice_is_a_no_op() {
        let a = Anomaly::open(AnomalyId::new(), detected(), Utc::now()).unwrap();
        let first_at = Utc::now();
        let (resolved, changed) = a.resolve(first_at);
        assert!(changed);
        assert!(resolved.is_resolved());

        let (again, changed) = resolved.resolve(first_at + chrono::Duration::hours(1));
        assert!(!changed);
        assert_eq!(again, resolved);
        assert_eq!(again.resolved_at(), Some(first_at));
    }

    #[test]
    fn serializes_type_field_in_snake_case() {
        let a = Anomaly::open(AnomalyId::new(), detected(), Utc::now()).unwrap();
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "shrinkage");
        assert_eq!(v["severity"], "high");
        assert_eq!(v["aiConfidence"], 0.8);
        assert_eq!(v["resolved"], false);
    }
}
