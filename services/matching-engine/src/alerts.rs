//! Admin-notification sink
//!
//! Lifecycle events (startup, shutdown) and fatal per-market failures
//! are pushed to an `AlertSink`. The production sink logs through
//! `tracing`; operators route those records to their paging
//! infrastructure. Tests use `RecordingAlertSink`.

use std::sync::Mutex;

use tracing::{error, info, warn};

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// An operator-facing notification.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            metric: metric.into(),
            message: message.into(),
        }
    }
}

/// Destination for operator notifications.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert);
}

/// Sink that emits alerts as tracing records.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => info!(metric = %alert.metric, "{}", alert.message),
            AlertLevel::Warning => warn!(metric = %alert.metric, "{}", alert.message),
            AlertLevel::Critical => error!(metric = %alert.metric, "{}", alert.message),
        }
    }
}

/// Sink that records alerts for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All alerts received so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Number of alerts at or above the given level.
    pub fn count_at_least(&self, level: AlertLevel) -> usize {
        let rank = |l: AlertLevel| match l {
            AlertLevel::Info => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Critical => 2,
        };
        self.alerts()
            .iter()
            .filter(|a| rank(a.level) >= rank(level))
            .count()
    }
}

impl AlertSink for RecordingAlertSink {
    fn notify(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}
