//! Pipeline events published on the in-process bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockwatch_anomalies::AnomalyEvent;
use stockwatch_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use stockwatch_inventory::InventoryEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    Inventory(InventoryEvent),
    Anomaly(AnomalyEvent),
}

impl Event for PipelineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::Inventory(e) => e.event_type(),
            PipelineEvent::Anomaly(e) => e.event_type(),
        }
    }

    fn version(&self) -> u32 {
        match self {
            PipelineEvent::Inventory(e) => e.version(),
            PipelineEvent::Anomaly(e) => e.version(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PipelineEvent::Inventory(e) => e.occurred_at(),
            PipelineEvent::Anomaly(e) => e.occurred_at(),
        }
    }
}

impl From<InventoryEvent> for PipelineEvent {
    fn from(value: InventoryEvent) -> Self {
        PipelineEvent::Inventory(value)
    }
}

impl From<AnomalyEvent> for PipelineEvent {
    fn from(value: AnomalyEvent) -> Self {
        PipelineEvent::Anomaly(value)
    }
}

pub type PipelineBus = InMemoryEventBus<EventEnvelope<PipelineEvent>>;

/// Publish without failing the caller: by the time anything is published the
/// stores already hold the committed state.
pub fn publish(bus: &PipelineBus, event: impl Into<PipelineEvent>) {
    let envelope = EventEnvelope::wrap(event.into());
    let event_type = envelope.event_type().to_string();
    if let Err(e) = bus.publish(envelope) {
        tracing::warn!(event_type = %event_type, error = ?e, "failed to publish pipeline event");
    }
}
