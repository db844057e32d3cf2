//! Operator-facing notifications (the toast/inbox channel of outer layers).
//!
//! Sinks are fire-and-forget: `notify` cannot fail and must not block the
//! caller for long. The mutation pipeline emits exactly one terminal
//! notification per request.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a terminal notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    /// The core mutation committed but a downstream step (detection) failed.
    PartialSuccess,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    /// Stable topic (e.g. "inventory.mutation").
    pub topic: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            topic: topic.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn success(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, topic, message)
    }

    pub fn partial(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::PartialSuccess, topic, message)
    }

    pub fn failure(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Failure, topic, message)
    }
}

/// Sink for user-visible notifications.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, notification: Notification);
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    inner: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.push(notification);
        }
    }
}

/// Sink that only logs; used when no UI is attached (CLI, workers).
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Success => {
                tracing::info!(topic = %n.topic, "{}", n.message)
            }
            NotificationLevel::PartialSuccess => {
                tracing::warn!(topic = %n.topic, "{}", n.message)
            }
            NotificationLevel::Failure => {
                tracing::error!(topic = %n.topic, "{}", n.message)
            }
        }
    }
}
