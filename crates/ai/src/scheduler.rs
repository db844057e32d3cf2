use serde::{Deserialize, Serialize};

use stockwatch_anomalies::{DetectedAnomaly, DetectionPass};

use crate::access_pattern::AccessPatternJob;
use crate::job::AiJob;
use crate::low_stock::LowStockJob;
use crate::movement_spike::MovementSpikeJob;
use crate::reconciliation::ReconciliationJob;
use crate::result::AiError;
use crate::snapshot::InventorySnapshot;

/// Findings of one pass, as run by the in-process scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub pass: DetectionPass,
    pub findings: Vec<DetectedAnomaly>,
    /// Findings urgent enough to raise an operator alert once merged.
    pub alerts_generated: u64,
}

/// Runs the jobs registered for a detection pass, synchronously and in order.
///
/// Storage and runtime agnostic: callers build the snapshot, the scheduler
/// only runs inference over it.
pub struct DetectionScheduler {
    general: Vec<Box<dyn AiJob>>,
    theft: Vec<Box<dyn AiJob>>,
}

impl Default for DetectionScheduler {
    fn default() -> Self {
        Self::new()
            .register(DetectionPass::General, LowStockJob::new(DetectionPass::General))
            .register(DetectionPass::General, MovementSpikeJob::new(DetectionPass::General))
            .register(DetectionPass::General, ReconciliationJob::new(DetectionPass::General))
            .register(DetectionPass::Theft, ReconciliationJob::new(DetectionPass::Theft))
            .register(DetectionPass::Theft, AccessPatternJob::new(DetectionPass::Theft))
    }
}

impl DetectionScheduler {
    /// Scheduler with no jobs registered.
    pub fn new() -> Self {
        Self {
            general: Vec::new(),
            theft: Vec::new(),
        }
    }

    pub fn register<J: AiJob>(mut self, pass: DetectionPass, job: J) -> Self {
        self.jobs_mut(pass).push(Box::new(job));
        self
    }

    pub fn job_names(&self, pass: DetectionPass) -> Vec<&'static str> {
        self.jobs(pass).iter().map(|j| j.name()).collect()
    }

    fn jobs(&self, pass: DetectionPass) -> &[Box<dyn AiJob>] {
        match pass {
            DetectionPass::General => &self.general,
            DetectionPass::Theft => &self.theft,
        }
    }

    fn jobs_mut(&mut self, pass: DetectionPass) -> &mut Vec<Box<dyn AiJob>> {
        match pass {
            DetectionPass::General => &mut self.general,
            DetectionPass::Theft => &mut self.theft,
        }
    }

    /// Run every job of `pass` against the same snapshot.
    ///
    /// A failing job fails the pass; findings of a pass are never partial.
    pub fn run_pass(&self, pass: DetectionPass, snapshot: &InventorySnapshot) -> Result<PassOutcome, AiError> {
        let mut findings = Vec::new();
        for job in self.jobs(pass) {
            let found = job.run(snapshot).map_err(|e| {
                tracing::warn!(%pass, job = job.name(), error = %e, "detection job failed");
                e
            })?;
            tracing::debug!(%pass, job = job.name(), found = found.len(), "detection job finished");
            findings.extend(found);
        }
        let alerts_generated = findings.iter().filter(|f| f.severity.is_alerting()).count() as u64;
        Ok(PassOutcome {
            pass,
            findings,
            alerts_generated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MovementSnapshot, ProductSnapshot};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockwatch_anomalies::AnomalyType;
    use stockwatch_core::ProductId;
    use stockwatch_inventory::TransactionType;

    struct Failing;

    impl AiJob for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&self, _snapshot: &InventorySnapshot) -> Result<Vec<DetectedAnomaly>, AiError> {
            Err(AiError::InferenceFailed("model offline".to_string()))
        }
    }

    fn theft_victim() -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::new(),
            name: "Smart Watch".to_string(),
            quantity: 85,
            minimum_stock: 10,
            price: Decimal::new(19900, 2),
            expiry_date: None,
            history: vec![MovementSnapshot {
                kind: TransactionType::Sale,
                delta: -10,
                previous_quantity: 100,
                new_quantity: 90,
                actor: None,
                at: Utc::now(),
            }],
        }
    }

    #[test]
    fn default_passes_register_their_jobs() {
        let s = DetectionScheduler::default();
        assert_eq!(
            s.job_names(DetectionPass::General),
            vec!["low_stock", "movement_spike", "ledger_reconciliation"]
        );
        assert_eq!(s.job_names(DetectionPass::Theft), vec!["ledger_reconciliation", "access_pattern"]);
    }

    #[test]
    fn theft_pass_flags_unexplained_loss_and_counts_alerts() {
        let snapshot = InventorySnapshot::new(Utc::now(), vec![theft_victim()]);
        let outcome = DetectionScheduler::default()
            .run_pass(DetectionPass::Theft, &snapshot)
            .unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].anomaly_type, AnomalyType::Theft);
        assert_eq!(outcome.findings[0].detected_by, DetectionPass::Theft);
        assert_eq!(outcome.alerts_generated, 1);
    }

    #[test]
    fn failing_job_fails_the_pass() {
        let snapshot = InventorySnapshot::new(Utc::now(), vec![theft_victim()]);
        let s = DetectionScheduler::new().register(DetectionPass::General, Failing);
        assert!(matches!(
            s.run_pass(DetectionPass::General, &snapshot),
            Err(AiError::InferenceFailed(_))
        ));
        assert!(s.run_pass(DetectionPass::Theft, &snapshot).unwrap().findings.is_empty());
    }
}
