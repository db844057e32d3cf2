use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use stockwatch_ai::{RawDetectionResponse, TheftAnalytics};
use stockwatch_anomalies::DetectionPass;

use super::DetectionService;
use crate::error::DetectionError;

/// HTTP client for a remote detection service.
///
/// - `POST {base}/ai/detect-anomalies` (general pass)
/// - `POST {base}/ai/detect-theft` (theft pass)
/// - `GET {base}/analytics/theft?days=N`
#[derive(Debug, Clone)]
pub struct RemoteDetectionService {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteDetectionService {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, DetectionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn path_for(pass: DetectionPass) -> &'static str {
        match pass {
            DetectionPass::General => "/ai/detect-anomalies",
            DetectionPass::Theft => "/ai/detect-theft",
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, DetectionError> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let resp = req
            .send()
            .await
            .map_err(|e| DetectionError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DetectionError::Unavailable(format!("detection service returned {status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| DetectionError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl DetectionService for RemoteDetectionService {
    async fn detect(&self, pass: DetectionPass) -> Result<RawDetectionResponse, DetectionError> {
        let url = format!("{}{}", self.base_url, Self::path_for(pass));
        tracing::debug!(%pass, %url, "requesting remote detection pass");
        self.send(self.client.post(&url)).await
    }

    async fn theft_analytics(&self, days: u32) -> Result<TheftAnalytics, DetectionError> {
        let url = format!("{}/analytics/theft", self.base_url);
        self.send(self.client.get(&url).query(&[("days", days)])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::json;
    use std::collections::HashMap;

    struct StubServer {
        base_url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    impl StubServer {
        async fn spawn(app: Router) -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind ephemeral port");
            let addr = listener.local_addr().unwrap();
            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self {
                base_url: format!("http://{addr}"),
                handle,
            }
        }
    }

    impl Drop for StubServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer s3cret")
    }

    fn stub() -> Router {
        Router::new()
            .route(
                "/ai/detect-anomalies",
                post(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": "no token" })));
                    }
                    (StatusCode::OK, axum::Json(json!({ "anomaliesDetected": 3, "alertsGenerated": 1 })))
                }),
            )
            .route(
                "/ai/detect-theft",
                post(|| async {
                    axum::Json(json!({
                        "totalAnomaliesDetected": 1,
                        "anomalies": [{
                            "productId": "not-a-product",
                            "type": "theft",
                            "severity": "high",
                            "description": "gap"
                        }]
                    }))
                }),
            )
            .route(
                "/analytics/theft",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let days: u32 = q.get("days").and_then(|d| d.parse().ok()).unwrap_or(0);
                    axum::Json(json!({
                        "days": days,
                        "since": "2026-01-01T00:00:00Z",
                        "summary": {
                            "totalAnomalies": 0,
                            "unresolved": 0,
                            "byType": {},
                            "estimatedLoss": "0"
                        },
                        "highRiskProducts": []
                    }))
                }),
            )
    }

    fn client(base_url: &str, token: Option<&str>) -> RemoteDetectionService {
        RemoteDetectionService::new(base_url, token.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn general_pass_sends_bearer_token() {
        let server = StubServer::spawn(stub()).await;

        let raw = client(&server.base_url, Some("s3cret"))
            .detect(DetectionPass::General)
            .await
            .unwrap();
        assert_eq!(raw.anomalies_detected, Some(3));

        let err = client(&server.base_url, None)
            .detect(DetectionPass::General)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn theft_pass_reports_total_count() {
        let server = StubServer::spawn(stub()).await;
        let raw = client(&server.base_url, None).detect(DetectionPass::Theft).await.unwrap();
        let summary = raw.normalize(DetectionPass::Theft);
        assert_eq!(summary.anomalies_detected, 1);
        assert_eq!(summary.discarded, 1);
    }

    #[tokio::test]
    async fn analytics_pass_days_as_query() {
        let server = StubServer::spawn(stub()).await;
        let report = client(&server.base_url, None).theft_analytics(30).await.unwrap();
        assert_eq!(report.days, 30);
        assert!(report.high_risk_products.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let err = client("http://127.0.0.1:9", None)
            .detect(DetectionPass::General)
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::Unavailable(_)));
    }
}
