//! Pipeline configuration, read from `STOCKWATCH_*` environment variables.

use std::time::Duration;

use chrono::Duration as ChronoDuration;

pub const ENV_STORE_TIMEOUT_MS: &str = "STOCKWATCH_STORE_TIMEOUT_MS";
pub const ENV_DETECTION_TIMEOUT_MS: &str = "STOCKWATCH_DETECTION_TIMEOUT_MS";
pub const ENV_DEDUP_WINDOW_HOURS: &str = "STOCKWATCH_DEDUP_WINDOW_HOURS";
pub const ENV_DETECTION_URL: &str = "STOCKWATCH_DETECTION_URL";
pub const ENV_API_TOKEN: &str = "STOCKWATCH_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bound on every store call.
    pub store_timeout: Duration,
    /// Bound on every detection call.
    pub detection_timeout: Duration,
    /// Unresolved anomalies younger than this absorb repeated findings.
    pub dedup_window: ChronoDuration,
    /// Remote detection endpoint; `None` runs the in-process engine.
    pub detection_url: Option<String>,
    pub api_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5_000),
            detection_timeout: Duration::from_millis(10_000),
            dedup_window: ChronoDuration::hours(24),
            detection_url: None,
            api_token: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let store_timeout = parse_positive(&lookup, ENV_STORE_TIMEOUT_MS)
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout);
        let detection_timeout = parse_positive(&lookup, ENV_DETECTION_TIMEOUT_MS)
            .map(Duration::from_millis)
            .unwrap_or(defaults.detection_timeout);
        let dedup_window = parse_positive(&lookup, ENV_DEDUP_WINDOW_HOURS)
            .and_then(|h| i64::try_from(h).ok())
            .map(ChronoDuration::hours)
            .unwrap_or(defaults.dedup_window);

        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            store_timeout,
            detection_timeout,
            dedup_window,
            detection_url: non_empty(ENV_DETECTION_URL).map(|u| u.trim_end_matches('/').to_string()),
            api_token: non_empty(ENV_API_TOKEN),
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid configuration value; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(PipelineConfig::from_lookup(lookup(&[])), PipelineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            (ENV_STORE_TIMEOUT_MS, "250"),
            (ENV_DEDUP_WINDOW_HOURS, "6"),
            (ENV_DETECTION_URL, "http://detector.local/api/"),
            (ENV_API_TOKEN, "secret"),
        ]));
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert_eq!(cfg.dedup_window, ChronoDuration::hours(6));
        assert_eq!(cfg.detection_url.as_deref(), Some("http://detector.local/api"));
        assert_eq!(cfg.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = PipelineConfig::from_lookup(lookup(&[
            (ENV_DETECTION_TIMEOUT_MS, "soon"),
            (ENV_STORE_TIMEOUT_MS, "0"),
            (ENV_API_TOKEN, "   "),
        ]));
        assert_eq!(cfg.detection_timeout, Duration::from_millis(10_000));
        assert_eq!(cfg.store_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.api_token, None);
    }
}
