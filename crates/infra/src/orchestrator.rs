//! Mutation orchestrator: apply → record → detect → merge.
//!
//! ```text
//! Requested ─▶ Validated ─▶ Applied ─▶ Recorded ─▶ Detecting ─▶ Completed
//!     │            │           │                        │
//!     ▼            ▼           ▼                        ▼
//! RejectedAtValidation   FailedAfterApply        FailedAfterRecord
//!     │            │
//!     ▼            ▼
//!       FailedAtApply
//! ```
//!
//! - Nothing is written before `Applied`; a rejection has no side effects.
//! - `FailedAtApply`: the product store could not be read or written (timeout,
//!   unavailable, version conflict). Nothing moved, but the request was valid.
//! - `FailedAfterApply`: the quantity moved but the transaction was not
//!   recorded. Reported as `PersistenceInconsistency`, published to operators,
//!   never retried.
//! - Detection failures do not fail the request; they are collected as
//!   partial failures and the committed mutation stands.
//! - `FailedAfterRecord`: findings could not be merged into the registry.
//! - Exactly one terminal notification per request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockwatch_ai::DetectionSummary;
use stockwatch_anomalies::{DetectedAnomaly, DetectionPass};
use stockwatch_core::{ProductId, UserId};
use stockwatch_events::{Notification, NotificationSink};
use stockwatch_inventory::{
    InventoryEvent, LedgerDiverged, MAX_REASON_LEN, StockChanged, StockMovement, Transaction, TransactionType,
};

use crate::detection::DetectionTrigger;
use crate::error::PipelineError;
use crate::events::{PipelineBus, publish};
use crate::ledger::StockLedger;
use crate::recorder::TransactionRecorder;
use crate::registry::{AnomalyTriageRegistry, MergeReport};

const TOPIC: &str = "inventory.mutation";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Requested,
    Validated,
    Applied,
    Recorded,
    Detecting,
    Completed,
    RejectedAtValidation,
    FailedAtApply,
    FailedAfterApply,
    FailedAfterRecord,
}

impl MutationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MutationState::Completed
                | MutationState::RejectedAtValidation
                | MutationState::FailedAtApply
                | MutationState::FailedAfterApply
                | MutationState::FailedAfterRecord
        )
    }
}

/// One stock mutation, with the detection passes to run after it commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub product_id: ProductId,
    pub movement: StockMovement,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
    /// Run in order after the transaction is recorded.
    pub passes: Vec<DetectionPass>,
}

impl MutationRequest {
    fn new(product_id: ProductId, movement: StockMovement) -> Self {
        Self {
            product_id,
            movement,
            reason: None,
            actor: None,
            passes: vec![DetectionPass::General, DetectionPass::Theft],
        }
    }

    pub fn delta(product_id: ProductId, kind: TransactionType, quantity: i64) -> Self {
        Self::new(product_id, StockMovement::delta(kind, quantity))
    }

    /// Absolute recount (`adjustment`).
    pub fn set(product_id: ProductId, target: i64) -> Self {
        Self::new(product_id, StockMovement::set(target))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_passes(mut self, passes: Vec<DetectionPass>) -> Self {
        self.passes = passes;
        self
    }

    pub fn without_detection(self) -> Self {
        self.with_passes(Vec::new())
    }

    fn validate(&self) -> Result<(), PipelineError> {
        match self.movement {
            StockMovement::Delta { kind, .. } if kind == TransactionType::Adjustment => {
                return Err(PipelineError::validation(
                    "adjustment sets an absolute quantity; use a set movement",
                ));
            }
            StockMovement::Delta { quantity, .. } if quantity <= 0 => {
                return Err(PipelineError::validation(format!(
                    "quantity must be greater than zero (got {quantity})"
                )));
            }
            StockMovement::Set { target } if target < 0 => {
                return Err(PipelineError::validation(format!(
                    "adjustment target cannot be negative (got {target})"
                )));
            }
            _ => {}
        }
        if let Some(reason) = &self.reason {
            if reason.trim().chars().count() > MAX_REASON_LEN {
                return Err(PipelineError::validation(format!(
                    "reason exceeds {MAX_REASON_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

/// A detection pass that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub pass: DetectionPass,
    pub reason: String,
}

/// Detection passes run back to back, and the merge of their findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRound {
    pub detections: Vec<DetectionSummary>,
    pub partial_failures: Vec<PartialFailure>,
    pub merged: MergeReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub transaction: Transaction,
    pub detections: Vec<DetectionSummary>,
    pub merged: MergeReport,
    pub partial_failures: Vec<PartialFailure>,
    pub trail: Vec<MutationState>,
}

impl MutationOutcome {
    pub fn is_partial(&self) -> bool {
        !self.partial_failures.is_empty()
    }
}

/// A request that ended in a failure state.
#[derive(Debug, Error)]
#[error("mutation failed in state {state:?}: {error}")]
pub struct MutationFailure {
    pub state: MutationState,
    pub trail: Vec<MutationState>,
    #[source]
    pub error: PipelineError,
}

struct Trail(Vec<MutationState>);

impl Trail {
    fn enter(&mut self, state: MutationState) {
        tracing::debug!(?state, "mutation state");
        self.0.push(state);
    }

    fn fail(&mut self, state: MutationState, error: PipelineError) -> MutationFailure {
        self.enter(state);
        MutationFailure {
            state,
            trail: std::mem::take(&mut self.0),
            error,
        }
    }
}

pub struct MutationOrchestrator {
    ledger: Arc<StockLedger>,
    recorder: Arc<TransactionRecorder>,
    trigger: DetectionTrigger,
    registry: Arc<AnomalyTriageRegistry>,
    notifier: Arc<dyn NotificationSink>,
    bus: Option<Arc<PipelineBus>>,
}

impl MutationOrchestrator {
    pub fn new(
        ledger: Arc<StockLedger>,
        recorder: Arc<TransactionRecorder>,
        trigger: DetectionTrigger,
        registry: Arc<AnomalyTriageRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            recorder,
            trigger,
            registry,
            notifier,
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<PipelineBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    fn emit(&self, event: InventoryEvent) {
        if let Some(bus) = &self.bus {
            publish(bus, event);
        }
    }

    /// Execute one mutation request to a terminal state.
    pub async fn execute(&self, request: MutationRequest) -> Result<MutationOutcome, MutationFailure> {
        let product_id = request.product_id;
        let kind = request.movement.kind();
        let result = self.drive(request).await;

        let notification = match &result {
            Ok(outcome) if outcome.is_partial() => {
                let failed: Vec<&str> = outcome.partial_failures.iter().map(|f| f.pass.as_str()).collect();
                Notification::partial(
                    TOPIC,
                    format!(
                        "{kind} recorded for product {product_id} ({} -> {}); detection unavailable for: {}",
                        outcome.transaction.previous_quantity(),
                        outcome.transaction.new_quantity(),
                        failed.join(", ")
                    ),
                )
            }
            Ok(outcome) => Notification::success(
                TOPIC,
                format!(
                    "{kind} recorded for product {product_id} ({} -> {}); {} new anomalies",
                    outcome.transaction.previous_quantity(),
                    outcome.transaction.new_quantity(),
                    outcome.merged.created.len()
                ),
            ),
            Err(failure) => Notification::failure(TOPIC, failure.error.to_string()),
        };
        self.notifier.notify(notification);
        result
    }

    fn ledger_failure(product_id: ProductId, error: &PipelineError) -> MutationState {
        if error.is_rejection() {
            tracing::info!(%product_id, %error, "stock mutation rejected");
            MutationState::RejectedAtValidation
        } else {
            tracing::error!(%product_id, %error, "product store failed before the mutation applied");
            MutationState::FailedAtApply
        }
    }

    async fn drive(&self, request: MutationRequest) -> Result<MutationOutcome, MutationFailure> {
        let mut trail = Trail(Vec::new());
        trail.enter(MutationState::Requested);

        if let Err(e) = request.validate() {
            return Err(trail.fail(MutationState::RejectedAtValidation, e));
        }

        let guard = self.ledger.lock(request.product_id).await;
        if let Err(e) = self.ledger.current(&guard).await {
            return Err(trail.fail(Self::ledger_failure(request.product_id, &e), e));
        }
        trail.enter(MutationState::Validated);

        let change = match self.ledger.apply(&guard, request.movement).await {
            Ok(change) => change,
            Err(e) => return Err(trail.fail(Self::ledger_failure(request.product_id, &e), e)),
        };
        trail.enter(MutationState::Applied);

        let transaction = match self
            .recorder
            .record(&guard, &change, request.reason.clone(), request.actor)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    product_id = %change.product_id,
                    kind = %change.kind,
                    previous = change.previous,
                    new = change.new,
                    error = %reason,
                    "stock committed without a transaction record; manual reconciliation required"
                );
                self.emit(InventoryEvent::LedgerDiverged(LedgerDiverged {
                    product_id: change.product_id,
                    kind: change.kind,
                    previous_quantity: change.previous,
                    new_quantity: change.new,
                    reason: reason.clone(),
                    occurred_at: Utc::now(),
                }));
                return Err(trail.fail(
                    MutationState::FailedAfterApply,
                    PipelineError::PersistenceInconsistency { change, reason },
                ));
            }
        };
        drop(guard);
        trail.enter(MutationState::Recorded);

        tracing::info!(
            transaction_id = %transaction.id_typed(),
            product_id = %transaction.product_id(),
            kind = %transaction.kind(),
            previous = transaction.previous_quantity(),
            new = transaction.new_quantity(),
            "stock mutation committed"
        );
        self.emit(InventoryEvent::StockChanged(StockChanged {
            product_id: transaction.product_id(),
            transaction_id: transaction.id_typed(),
            kind: transaction.kind(),
            previous_quantity: transaction.previous_quantity(),
            new_quantity: transaction.new_quantity(),
            occurred_at: transaction.created_at(),
        }));

        trail.enter(MutationState::Detecting);
        let round = match self.detect_and_merge(&request.passes).await {
            Ok(round) => round,
            Err(e) => {
                tracing::error!(transaction_id = %transaction.id_typed(), error = %e, "failed to merge detection results");
                return Err(trail.fail(
                    MutationState::FailedAfterRecord,
                    PipelineError::RegistryUnavailable {
                        transaction: Box::new(transaction),
                        reason: e.to_string(),
                    },
                ));
            }
        };
        trail.enter(MutationState::Completed);

        Ok(MutationOutcome {
            transaction,
            detections: round.detections,
            merged: round.merged,
            partial_failures: round.partial_failures,
            trail: trail.0,
        })
    }

    /// Run `passes` sequentially and merge every finding into the registry.
    ///
    /// A failed pass is recorded and the remaining passes still run. Findings
    /// for products missing from the catalog are skipped and counted as
    /// rejected. Only a store or registry failure is an error.
    pub async fn detect_and_merge(&self, passes: &[DetectionPass]) -> Result<DetectionRound, PipelineError> {
        let mut round = DetectionRound::default();
        for &pass in passes {
            match self.trigger.run_detection(pass).await {
                Ok(summary) => round.detections.push(summary),
                Err(e) => {
                    tracing::warn!(%pass, error = %e, "detection pass failed; mutation stands");
                    round.partial_failures.push(PartialFailure {
                        pass,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut known: HashMap<ProductId, bool> = HashMap::new();
        let mut findings: Vec<DetectedAnomaly> = Vec::new();
        let mut orphaned = 0;
        for finding in round.detections.iter().flat_map(|d| d.findings.iter()) {
            let exists = match known.get(&finding.product_id) {
                Some(&exists) => exists,
                None => {
                    let exists = self.ledger.contains(finding.product_id).await?;
                    known.insert(finding.product_id, exists);
                    exists
                }
            };
            if exists {
                findings.push(finding.clone());
            } else {
                tracing::warn!(
                    product_id = %finding.product_id,
                    anomaly_type = %finding.anomaly_type,
                    pass = %finding.detected_by,
                    "skipping finding for unknown product"
                );
                orphaned += 1;
            }
        }
        if !findings.is_empty() {
            round.merged = self.registry.merge(&findings).await?;
        }
        round.merged.rejected += orphaned;
        Ok(round)
    }
}
