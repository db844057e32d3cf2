//! Anomaly triage domain module.
//!
//! Anomalies are flagged irregularities awaiting human triage. They are
//! created from detection output, resolved exactly once, and never deleted.

pub mod alert;
pub mod anomaly;
pub mod events;
pub mod kind;

pub use alert::Alert;
pub use anomaly::{Anomaly, DetectedAnomaly};
pub use events::{AnomalyEvent, AnomalyMerged, AnomalyResolved};
pub use kind::{AnomalyType, DetectionPass, Severity};
