//! Anomaly triage registry: dedup on merge, one-way resolve, alert inbox.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use stockwatch_anomalies::{Alert, Anomaly, AnomalyEvent, AnomalyMerged, AnomalyResolved, DetectedAnomaly};
use stockwatch_core::{AlertId, AnomalyId};

use crate::error::{PipelineError, StoreError};
use crate::events::{PipelineBus, publish};
use crate::store::{AlertStore, AnomalyFilter, AnomalyStore, bounded};

/// What a merge did with a batch of findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub created: Vec<Anomaly>,
    /// Findings absorbed by an open anomaly for the same product and type.
    pub duplicates: usize,
    /// Findings that failed validation (empty description, bad confidence)
    /// or name a product missing from the catalog.
    pub rejected: usize,
    pub alerts: Vec<Alert>,
}

pub struct AnomalyTriageRegistry {
    anomalies: Arc<dyn AnomalyStore>,
    alerts: Arc<dyn AlertStore>,
    bus: Option<Arc<PipelineBus>>,
    dedup_window: ChronoDuration,
    timeout: Duration,
    merging: AsyncMutex<()>,
}

impl AnomalyTriageRegistry {
    pub fn new(
        anomalies: Arc<dyn AnomalyStore>,
        alerts: Arc<dyn AlertStore>,
        dedup_window: ChronoDuration,
        timeout: Duration,
    ) -> Self {
        Self {
            anomalies,
            alerts,
            bus: None,
            dedup_window,
            timeout,
            merging: AsyncMutex::new(()),
        }
    }

    pub fn with_bus(mut self, bus: Arc<PipelineBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    fn emit(&self, event: AnomalyEvent) {
        if let Some(bus) = &self.bus {
            publish(bus, event);
        }
    }

    /// Merge detection findings.
    ///
    /// A finding is a duplicate when an anomaly with the same
    /// `(product_id, type)` was created within the dedup window, including
    /// one created earlier in the same batch. A resolved anomaly keeps
    /// absorbing its condition until the window has passed since it was
    /// resolved, so re-running detection over an unchanged ledger does not
    /// reopen it.
    pub async fn merge(&self, findings: &[DetectedAnomaly]) -> Result<MergeReport, PipelineError> {
        self.merge_at(findings, Utc::now()).await
    }

    pub async fn merge_at(
        &self,
        findings: &[DetectedAnomaly],
        now: DateTime<Utc>,
    ) -> Result<MergeReport, PipelineError> {
        let _merging = self.merging.lock().await;
        let cutoff = now - self.dedup_window;
        let mut recent: Vec<Anomaly> = bounded(
            "anomalies.list",
            self.timeout,
            self.anomalies.list(&AnomalyFilter::default()),
        )
        .await?
        .into_iter()
        .filter(|a| a.created_at() >= cutoff || a.resolved_at().is_some_and(|at| at >= cutoff))
        .collect();

        let mut report = MergeReport::default();
        for finding in findings {
            if recent
                .iter()
                .any(|a| a.same_condition(finding.product_id, finding.anomaly_type))
            {
                report.duplicates += 1;
                continue;
            }

            let anomaly = match Anomaly::open(AnomalyId::new(), finding.clone(), now) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(product_id = %finding.product_id, error = %e, "rejecting invalid finding");
                    report.rejected += 1;
                    continue;
                }
            };
            bounded("anomalies.insert", self.timeout, self.anomalies.insert(anomaly.clone())).await?;

            if let Some(alert) = Alert::for_anomaly(AlertId::new(), &anomaly, now) {
                bounded("alerts.insert", self.timeout, self.alerts.insert(alert.clone())).await?;
                report.alerts.push(alert);
            }

            tracing::info!(
                anomaly_id = %anomaly.id_typed(),
                product_id = %anomaly.product_id(),
                anomaly_type = %anomaly.anomaly_type(),
                severity = %anomaly.severity(),
                "anomaly merged"
            );
            self.emit(AnomalyEvent::AnomalyMerged(AnomalyMerged {
                anomaly_id: anomaly.id_typed(),
                product_id: anomaly.product_id(),
                anomaly_type: anomaly.anomaly_type(),
                severity: anomaly.severity(),
                occurred_at: now,
            }));

            recent.push(anomaly.clone());
            report.created.push(anomaly);
        }
        Ok(report)
    }

    pub async fn get(&self, id: AnomalyId) -> Result<Anomaly, PipelineError> {
        bounded("anomalies.get", self.timeout, self.anomalies.get(id))
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("anomaly {id}")))
    }

    /// Resolve an anomaly. Resolving twice is a no-op that returns the same state.
    pub async fn resolve(&self, id: AnomalyId) -> Result<Anomaly, PipelineError> {
        let current = self.get(id).await?;
        let (resolved, changed) = current.resolve(Utc::now());
        if !changed {
            return Ok(resolved);
        }

        match bounded("anomalies.save", self.timeout, self.anomalies.save(resolved.clone())).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(PipelineError::NotFound(format!("anomaly {id}"))),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(anomaly_id = %id, "anomaly resolved");
        if let Some(resolved_at) = resolved.resolved_at() {
            self.emit(AnomalyEvent::AnomalyResolved(AnomalyResolved {
                anomaly_id: id,
                product_id: resolved.product_id(),
                occurred_at: resolved_at,
            }));
        }
        Ok(resolved)
    }

    /// Matching anomalies, newest first.
    pub async fn list(&self, filter: &AnomalyFilter) -> Result<Vec<Anomaly>, PipelineError> {
        Ok(bounded("anomalies.list", self.timeout, self.anomalies.list(filter)).await?)
    }

    pub async fn list_alerts(&self, unread_only: bool) -> Result<Vec<Alert>, PipelineError> {
        Ok(bounded("alerts.list", self.timeout, self.alerts.list(unread_only)).await?)
    }

    pub async fn mark_alert_read(&self, id: AlertId) -> Result<Alert, PipelineError> {
        match bounded("alerts.mark_read", self.timeout, self.alerts.mark_read(id)).await {
            Ok(alert) => Ok(alert),
            Err(StoreError::NotFound) => Err(PipelineError::NotFound(format!("alert {id}"))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAlertStore, InMemoryAnomalyStore};
    use stockwatch_anomalies::{AnomalyType, DetectionPass, Severity};
    use stockwatch_core::ProductId;
    use stockwatch_events::EventBus;

    fn registry() -> AnomalyTriageRegistry {
        AnomalyTriageRegistry::new(
            Arc::new(InMemoryAnomalyStore::new()),
            Arc::new(InMemoryAlertStore::new()),
            ChronoDuration::hours(24),
            Duration::from_secs(1),
        )
    }

    fn finding(product_id: ProductId, anomaly_type: AnomalyType, severity: Severity) -> DetectedAnomaly {
        DetectedAnomaly {
            product_id,
            anomaly_type,
            severity,
            ai_confidence: Some(0.7),
            description: format!("{} detected", anomaly_type.label()),
            metadata: None,
            detected_by: DetectionPass::General,
        }
    }

    #[tokio::test]
    async fn merge_dedups_open_anomalies_within_window() {
        let r = registry();
        let p = ProductId::new();
        let first = r
            .merge(&[
                finding(p, AnomalyType::LowStock, Severity::Medium),
                finding(p, AnomalyType::LowStock, Severity::Medium),
                finding(p, AnomalyType::Theft, Severity::High),
            ])
            .await
            .unwrap();
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.duplicates, 1);
        assert_eq!(first.alerts.len(), 1);

        let again = r.merge(&[finding(p, AnomalyType::LowStock, Severity::High)]).await.unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.duplicates, 1);
    }

    #[tokio::test]
    async fn findings_outside_window_create_new_anomalies() {
        let r = registry();
        let p = ProductId::new();
        let now = Utc::now();
        let old = r
            .merge_at(&[finding(p, AnomalyType::LowStock, Severity::Low)], now - ChronoDuration::hours(30))
            .await
            .unwrap();
        assert_eq!(old.created.len(), 1);

        let fresh = r
            .merge_at(&[finding(p, AnomalyType::LowStock, Severity::Low)], now)
            .await
            .unwrap();
        assert_eq!(fresh.created.len(), 1);

        let again = r
            .merge_at(&[finding(p, AnomalyType::LowStock, Severity::Low)], now + ChronoDuration::hours(25))
            .await
            .unwrap();
        assert_eq!(again.created.len(), 1);
    }

    #[tokio::test]
    async fn resolved_condition_stays_quiet_for_the_window() {
        let r = registry();
        let p = ProductId::new();
        let now = Utc::now();
        let merged = r
            .merge_at(&[finding(p, AnomalyType::Theft, Severity::High)], now)
            .await
            .unwrap();
        r.resolve(merged.created[0].id_typed()).await.unwrap();

        let rerun = r.merge(&[finding(p, AnomalyType::Theft, Severity::High)]).await.unwrap();
        assert!(rerun.created.is_empty());
        assert_eq!(rerun.duplicates, 1);

        let later = r
            .merge_at(&[finding(p, AnomalyType::Theft, Severity::High)], Utc::now() + ChronoDuration::hours(25))
            .await
            .unwrap();
        assert_eq!(later.created.len(), 1);
        let open = r.list(&AnomalyFilter::unresolved()).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let bus = Arc::new(PipelineBus::new());
        let events = bus.subscribe();
        let r = registry().with_bus(bus);
        let p = ProductId::new();
        let merged = r.merge(&[finding(p, AnomalyType::Shrinkage, Severity::Medium)]).await.unwrap();
        let id = merged.created[0].id_typed();

        let first = r.resolve(id).await.unwrap();
        let second = r.resolve(id).await.unwrap();
        assert!(first.is_resolved());
        assert_eq!(first, second);

        let types: Vec<String> = events.drain().iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(types, vec!["anomalies.anomaly.merged", "anomalies.anomaly.resolved"]);
    }

    #[tokio::test]
    async fn resolve_unknown_anomaly_is_not_found() {
        let err = registry().resolve(AnomalyId::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_and_alert_inbox() {
        let r = registry();
        let p = ProductId::new();
        r.merge(&[
            finding(p, AnomalyType::Theft, Severity::Critical),
            finding(p, AnomalyType::ExpiryRisk, Severity::Medium),
            finding(ProductId::new(), AnomalyType::Theft, Severity::High),
        ])
        .await
        .unwrap();

        let critical = r
            .list(&AnomalyFilter {
                severity: Some(Severity::Critical),
                ..AnomalyFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(critical.len(), 1);

        let for_product = r
            .list(&AnomalyFilter {
                product_id: Some(p),
                anomaly_type: Some(AnomalyType::ExpiryRisk),
                ..AnomalyFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(for_product.len(), 1);

        let unread = r.list_alerts(true).await.unwrap();
        assert_eq!(unread.len(), 2);
        r.mark_alert_read(unread[0].id_typed()).await.unwrap();
        assert_eq!(r.list_alerts(true).await.unwrap().len(), 1);
        assert_eq!(r.list_alerts(false).await.unwrap().len(), 2);
    }
}
