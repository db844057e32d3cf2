use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{AlertId, AnomalyId, Entity, ProductId};

use crate::anomaly::Anomaly;
use crate::kind::Severity;

/// Operator alert raised for an urgent anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    id: AlertId,
    anomaly_id: AnomalyId,
    product_id: ProductId,
    severity: Severity,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl Alert {
    /// Alert for a freshly merged anomaly, if its severity warrants one.
    pub fn for_anomaly(id: AlertId, anomaly: &Anomaly, at: DateTime<Utc>) -> Option<Self> {
        if !anomaly.severity().is_alerting() {
            return None;
        }
        Some(Self {
            id,
            anomaly_id: anomaly.id_typed(),
            product_id: anomaly.product_id(),
            severity: anomaly.severity(),
            message: format!(
                "{} {}: {}",
                anomaly.severity(),
                anomaly.anomaly_type().label(),
                anomaly.description()
            ),
            read: false,
            created_at: at,
        })
    }

    pub fn id_typed(&self) -> AlertId {
        self.id
    }

    pub fn anomaly_id(&self) -> AnomalyId {
        self.anomaly_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn mark_read(&self) -> Self {
        let mut next = self.clone();
        next.read = true;
        next
    }
}

impl Entity for Alert {
    type Id = AlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::DetectedAnomaly;
    use crate::kind::{AnomalyType, DetectionPass};

    fn anomaly(severity: Severity) -> Anomaly {
        Anomaly::open(
            AnomalyId::new(),
            DetectedAnomaly {
                product_id: ProductId::new(),
                anomaly_type: AnomalyType::Theft,
                severity,
                ai_confidence: None,
                description: "5 units missing".to_string(),
                metadata: None,
                detected_by: DetectionPass::Theft,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn only_high_and_critical_raise_alerts() {
        assert!(Alert::for_anomaly(AlertId::new(), &anomaly(Severity::Medium), Utc::now()).is_none());
        let alert = Alert::for_anomaly(AlertId::new(), &anomaly(Severity::Critical), Utc::now()).unwrap();
        assert_eq!(alert.message(), "critical theft: 5 units missing");
        assert!(!alert.is_read());
        assert!(alert.mark_read().is_read());
    }
}
