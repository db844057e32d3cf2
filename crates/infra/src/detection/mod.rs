//! Detection boundary: services that run passes, and the trigger adapter the
//! orchestrator talks to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stockwatch_ai::{DetectionSummary, RawDetectionResponse, TheftAnalytics};
use stockwatch_anomalies::DetectionPass;

use crate::error::DetectionError;

mod local;
mod remote;

pub use local::LocalDetectionEngine;
pub use remote::RemoteDetectionService;

/// A detection capability, local or remote.
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Run one pass over the current inventory state.
    async fn detect(&self, pass: DetectionPass) -> Result<RawDetectionResponse, DetectionError>;

    async fn theft_analytics(&self, days: u32) -> Result<TheftAnalytics, DetectionError>;
}

/// Invokes detection passes under a timeout and normalizes their results.
#[derive(Clone)]
pub struct DetectionTrigger {
    service: Arc<dyn DetectionService>,
    timeout: Duration,
}

impl DetectionTrigger {
    pub fn new(service: Arc<dyn DetectionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    fn timed_out(&self, what: &str) -> DetectionError {
        DetectionError::Unavailable(format!("{what} timed out after {}ms", self.timeout.as_millis()))
    }

    /// Run `pass` and fold its response into a [`DetectionSummary`].
    ///
    /// A zero count is a successful pass; only transport failures, bad
    /// payloads and timeouts are errors.
    pub async fn run_detection(&self, pass: DetectionPass) -> Result<DetectionSummary, DetectionError> {
        let raw = tokio::time::timeout(self.timeout, self.service.detect(pass))
            .await
            .map_err(|_| self.timed_out(&format!("{pass} detection pass")))??;

        let summary = raw.normalize(pass);
        tracing::info!(
            %pass,
            anomalies_detected = summary.anomalies_detected,
            alerts_generated = summary.alerts_generated,
            findings = summary.findings.len(),
            discarded = summary.discarded,
            "detection pass finished"
        );
        Ok(summary)
    }

    pub async fn theft_analytics(&self, days: u32) -> Result<TheftAnalytics, DetectionError> {
        tokio::time::timeout(self.timeout, self.service.theft_analytics(days))
            .await
            .map_err(|_| self.timed_out("theft analytics"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Canned(serde_json::Value);

    #[async_trait]
    impl DetectionService for Canned {
        async fn detect(&self, _pass: DetectionPass) -> Result<RawDetectionResponse, DetectionError> {
            serde_json::from_value(self.0.clone()).map_err(|e| DetectionError::Malformed(e.to_string()))
        }

        async fn theft_analytics(&self, _days: u32) -> Result<TheftAnalytics, DetectionError> {
            Err(DetectionError::Unavailable("not offered".to_string()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl DetectionService for Hanging {
        async fn detect(&self, _pass: DetectionPass) -> Result<RawDetectionResponse, DetectionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RawDetectionResponse::default())
        }

        async fn theft_analytics(&self, _days: u32) -> Result<TheftAnalytics, DetectionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(DetectionError::Unavailable("unreachable".to_string()))
        }
    }

    fn trigger(service: impl DetectionService + 'static) -> DetectionTrigger {
        DetectionTrigger::new(Arc::new(service), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn either_count_field_reports_anomalies_detected() {
        let general = trigger(Canned(json!({ "anomaliesDetected": 3 })))
            .run_detection(DetectionPass::General)
            .await
            .unwrap();
        let theft = trigger(Canned(json!({ "totalAnomaliesDetected": 3 })))
            .run_detection(DetectionPass::Theft)
            .await
            .unwrap();
        assert_eq!(general.anomalies_detected, 3);
        assert_eq!(theft.anomalies_detected, 3);
    }

    #[tokio::test]
    async fn zero_count_is_success() {
        let summary = trigger(Canned(json!({ "anomaliesDetected": 0 })))
            .run_detection(DetectionPass::General)
            .await
            .unwrap();
        assert_eq!(summary.anomalies_detected, 0);
        assert!(summary.findings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_unavailable() {
        let err = trigger(Hanging).run_detection(DetectionPass::Theft).await.unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(msg) if msg.contains("timed out")));
    }
}
