//! User-facing notifications for failed requests.
//!
//! The request pipeline reports every unsuppressed failure as exactly one
//! [`Notice`] to a [`NotificationSink`]. Sinks are fire-and-forget.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::api::{ApiError, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notice {
    pub severity: Severity,
    pub category: ErrorCategory,
    pub message: String,
}

impl Notice {
    /// Conflicts are reported as warnings, everything else as errors.
    pub fn from_error(err: &ApiError) -> Self {
        let severity = match err {
            ApiError::Conflict(_) => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            severity,
            category: err.category(),
            message: err.message().to_string(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sink that only writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Warning => warn!(category = %notice.category, "{}", notice.message),
            Severity::Error => error!(category = %notice.category, "{}", notice.message),
        }
    }
}

/// Sink forwarding notices to a UI task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            warn!("Notification dropped - receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_warning() {
        let notice = Notice::from_error(&ApiError::Conflict("Mailbox scan already running".into()));
        assert_eq!(notice.severity, Severity::Warning);
        assert_eq!(notice.category, ErrorCategory::Conflict);
        assert_eq!(notice.message, "Mailbox scan already running");
    }

    #[test]
    fn test_other_errors_are_errors() {
        let notice = Notice::from_error(&ApiError::TransientConnectivity {
            timed_out: true,
            message: "timed out".into(),
        });
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.category, ErrorCategory::TransientConnectivity);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(Notice::from_error(&ApiError::Forbidden("no".into())));
        let received = rx.recv().await.expect("notice delivered");
        assert_eq!(received.category, ErrorCategory::Forbidden);
    }
}
