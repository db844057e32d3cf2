//! `stockwatch-ai`
//!
//! **Responsibility:** detection subsystem boundary.
//!
//! This crate is intentionally **not** part of the mutation path:
//! - It reads immutable inventory snapshots, never stores.
//! - It must not mutate products, transactions or anomalies.
//! - It emits **detected anomalies** (triage candidates), not domain events.

pub mod access_pattern;
pub mod job;
pub mod low_stock;
pub mod movement_spike;
pub mod reconciliation;
pub mod report;
pub mod result;
pub mod scheduler;
pub mod snapshot;

pub use access_pattern::AccessPatternJob;
pub use job::AiJob;
pub use low_stock::LowStockJob;
pub use movement_spike::MovementSpikeJob;
pub use reconciliation::ReconciliationJob;
pub use report::{
    DetectionSummary, HighRiskProduct, RawAnomaly, RawDetectionResponse, TheftAnalytics, TheftSummary,
};
pub use result::AiError;
pub use scheduler::{DetectionScheduler, PassOutcome};
pub use snapshot::{InventorySnapshot, MovementSnapshot, ProductSnapshot};
