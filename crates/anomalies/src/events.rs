use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_core::{AnomalyId, ProductId};
use stockwatch_events::Event;

use crate::kind::{AnomalyType, Severity};

/// Event: AnomalyMerged (a new open anomaly entered the registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyMerged {
    pub anomaly_id: AnomalyId,
    pub product_id: ProductId,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AnomalyResolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyResolved {
    pub anomaly_id: AnomalyId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyEvent {
    AnomalyMerged(AnomalyMerged),
    AnomalyResolved(AnomalyResolved),
}

impl Event for AnomalyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AnomalyEvent::AnomalyMerged(_) => "anomalies.anomaly.merged",
            AnomalyEvent::AnomalyResolved(_) => "anomalies.anomaly.resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AnomalyEvent::AnomalyMerged(e) => e.occurred_at,
            AnomalyEvent::AnomalyResolved(e) => e.occurred_at,
        }
    }
}
