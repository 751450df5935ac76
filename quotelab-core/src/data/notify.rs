//! Side-channel notifications for the presentation layer.
//!
//! The fetcher reports retryable failures as warnings and exhausted retries as
//! errors. `NotificationLog` forwards each one to `tracing` and keeps it so the
//! caller can surface it to a user.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{label}: {}", self.message)
    }
}

/// Sink for notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs every notification through `tracing` and retains it until drained.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all retained notifications, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.severity == severity)
            .count()
    }
}

impl Notifier for NotificationLog {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Warning => tracing::warn!("{}", notification.message),
            Severity::Error => tracing::error!("{}", notification.message),
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_counts_and_drains() {
        let log = NotificationLog::new();
        log.notify(Notification::warning("attempt 1 failed"));
        log.notify(Notification::warning("attempt 2 failed"));
        log.notify(Notification::error("gave up"));

        assert_eq!(log.count(Severity::Warning), 2);
        assert_eq!(log.count(Severity::Error), 1);
        assert_eq!(log.snapshot().len(), 3);

        let drained = log.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[2].severity, Severity::Error);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn display_includes_severity() {
        assert_eq!(
            Notification::error("no data").to_string(),
            "ERROR: no data"
        );
    }
}
