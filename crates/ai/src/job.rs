use stockwatch_anomalies::DetectedAnomaly;

use crate::result::AiError;
use crate::snapshot::InventorySnapshot;

/// A deterministic detection unit.
///
/// Jobs read a consistent [`InventorySnapshot`]; they never see a store and
/// never mutate state. Each job returns zero or more triage candidates.
pub trait AiJob: Send + Sync + 'static {
    /// Stable job name, recorded in anomaly metadata.
    fn name(&self) -> &'static str;

    /// Execute inference over the snapshot.
    fn run(&self, snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError>;
}
