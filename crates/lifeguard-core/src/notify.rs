//! In-memory notification log with optional forwarding backends.
//!
//! Notifications are appended under a single write lock, so every reader
//! sees them in one total order. Forwarding to backends (syslog) is
//! best-effort: a failing backend is logged and otherwise ignored.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::NotifyError;

/// How urgent a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    /// Syslog severity code (RFC 5424 table 2).
    pub fn syslog_code(self) -> u8 {
        match self {
            Self::Critical => 2,
            Self::Warning => 4,
            Self::Info => 6,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    /// Kind of change; see `history::PoolEvent::id`.
    #[serde(rename = "ID")]
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID {:03} ({}): {}", self.id, self.severity, self.message)
    }
}

/// Destination that mirrors notifications outside the process.
#[async_trait::async_trait]
pub trait NotificationBackend: Send + Sync {
    /// The backend's name (for error reporting).
    fn name(&self) -> &str;

    /// Forward one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn forward(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Append-only notification log shared by the poller and the API.
pub struct NotificationSink {
    entries: RwLock<VecDeque<Notification>>,
    /// Oldest entries are dropped beyond this many. `None` keeps everything.
    limit: Option<usize>,
    backends: RwLock<Vec<Arc<dyn NotificationBackend>>>,
}

impl NotificationSink {
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            limit,
            backends: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_backend(&self, backend: Arc<dyn NotificationBackend>) {
        self.backends.write().await.push(backend);
    }

    /// Record a notification stamped with the current time and forward it.
    pub async fn send(&self, id: u32, severity: Severity, message: String) -> Notification {
        let notification = Notification {
            id,
            timestamp: Utc::now(),
            severity,
            message,
        };
        self.record(notification.clone()).await;
        notification
    }

    /// Append an already built notification and forward it.
    pub async fn record(&self, notification: Notification) {
        info!(notification = %notification, "got notification");

        {
            let mut entries = self.entries.write().await;
            entries.push_back(notification.clone());
            if let Some(limit) = self.limit {
                while entries.len() > limit {
                    entries.pop_front();
                }
            }
        }

        for backend in self.backends.read().await.iter() {
            if let Err(e) = backend.forward(&notification).await {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    "notification backend failed"
                );
            }
        }
    }

    /// Snapshot of the log, oldest first.
    pub async fn list(&self) -> Vec<Notification> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationSink")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl NotificationBackend for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn forward(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(notification.message.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl NotificationBackend for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn forward(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::BackendFailure {
                name: "broken".to_owned(),
                reason: "always".to_owned(),
            })
        }
    }

    #[test]
    fn display_pads_id() {
        let n = Notification {
            id: 4,
            timestamp: Utc::now(),
            severity: Severity::Info,
            message: "Pool \"tank\" scrub: started".to_owned(),
        };
        assert_eq!(n.to_string(), "ID 004 (info): Pool \"tank\" scrub: started");
    }

    #[test]
    fn serializes_for_the_ui() {
        let n = Notification {
            id: 1,
            timestamp: Utc::now(),
            severity: Severity::Critical,
            message: "m".to_owned(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["ID"], 1);
        assert_eq!(json["Severity"], "critical");
        assert!(json["Timestamp"].is_string());
    }

    #[tokio::test]
    async fn keeps_append_order() {
        let sink = NotificationSink::new(None);
        for i in 0..5 {
            sink.send(i, Severity::Info, format!("n{i}")).await;
        }
        let ids: Vec<u32> = sink.list().await.iter().map(|n| n.id).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn limit_drops_oldest() {
        let sink = NotificationSink::new(Some(2));
        for i in 0..4 {
            sink.send(i, Severity::Warning, String::new()).await;
        }
        let ids: Vec<u32> = sink.list().await.iter().map(|n| n.id).collect();
        assert_eq!(ids, [2, 3]);
    }

    #[tokio::test]
    async fn failing_backend_does_not_block_others() {
        let sink = NotificationSink::new(None);
        let recording = Arc::new(Recording::default());
        sink.add_backend(Arc::new(Broken)).await;
        sink.add_backend(Arc::clone(&recording) as Arc<dyn NotificationBackend>).await;

        sink.send(2, Severity::Warning, "hello".to_owned()).await;

        assert_eq!(sink.len().await, 1);
        assert_eq!(*recording.seen.lock().unwrap(), ["hello"]);
    }

    #[tokio::test]
    async fn concurrent_sends_are_all_kept() {
        let sink = Arc::new(NotificationSink::new(None));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { sink.send(i, Severity::Info, String::new()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(sink.len().await, 16);
    }
}
