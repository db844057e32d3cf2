//! Infrastructure layer: stores, the mutation pipeline and its collaborators.
//!
//! ```text
//! caller
//!   ↓
//! MutationOrchestrator ── StockLedger ── ProductStore
//!   │                   └ TransactionRecorder ── TransactionStore
//!   ├ DetectionTrigger ── DetectionService (local engine | remote HTTP)
//!   └ AnomalyTriageRegistry ── AnomalyStore, AlertStore
//! ```
//!
//! Every store and detection call is async, bounded by a timeout, and
//! reached through a trait so tests can swap in failing implementations.

pub mod catalog;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod harness;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod recorder;
pub mod registry;
pub mod session;
pub mod store;


pub use catalog::ProductCatalog;
pub use config::PipelineConfig;
pub use detection::{DetectionService, DetectionTrigger, LocalDetectionEngine, RemoteDetectionService};
pub use error::{DetectionError, PipelineError, StoreError};
pub use events::{PipelineBus, PipelineEvent};
pub use harness::{DetectionRunResult, Scenario, ScenarioHarness};
pub use ledger::{LedgerGuard, StockLedger};
pub use orchestrator::{
    DetectionRound, MutationFailure, MutationOrchestrator, MutationOutcome, MutationRequest, MutationState, PartialFailure,
};
pub use pipeline::{StockPipeline, Stores};
pub use recorder::TransactionRecorder;
pub use registry::{AnomalyTriageRegistry, MergeReport};
