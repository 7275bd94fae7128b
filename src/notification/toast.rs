use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::notification::{NotificationRecord, Severity};

/// A transient, auto-expiring visual notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: Uuid,
    pub notification_id: String,
    pub severity: Severity,
    pub glyph: &'static str,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub duration: Duration,
}

impl Toast {
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id: record.id.clone(),
            severity: record.severity,
            glyph: record.glyph(),
            title: record.title.clone(),
            message: record.message.clone(),
            link: record.link().map(str::to_string),
            duration: record.severity.toast_duration(),
        }
    }
}

/// Renders toasts for newly delivered notifications.
pub trait ToastPresenter: Send + Sync {
    fn present(&self, toast: Toast);
}

/// Renders toasts as log lines. Used by the CLI.
#[derive(Debug, Default, Clone)]
pub struct TracingToastPresenter;

impl ToastPresenter for TracingToastPresenter {
    fn present(&self, toast: Toast) {
        let text = format!("{} {}: {}", toast.glyph, toast.title, toast.message);
        match toast.severity {
            Severity::Error | Severity::Warning => tracing::warn!(
                notification_id = %toast.notification_id,
                severity = ?toast.severity,
                duration_ms = toast.duration.as_millis() as u64,
                link = toast.link.as_deref().unwrap_or(""),
                "{}",
                text
            ),
            Severity::Info | Severity::Success => tracing::info!(
                notification_id = %toast.notification_id,
                severity = ?toast.severity,
                duration_ms = toast.duration.as_millis() as u64,
                link = toast.link.as_deref().unwrap_or(""),
                "{}",
                text
            ),
        }
    }
}

/// Forwards toasts to a channel so an embedding UI can render them.
#[derive(Debug, Clone)]
pub struct ChannelToastPresenter {
    tx: mpsc::UnboundedSender<Toast>,
}

impl ChannelToastPresenter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Toast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ToastPresenter for ChannelToastPresenter {
    fn present(&self, toast: Toast) {
        if self.tx.send(toast).is_err() {
            tracing::debug!("toast receiver dropped, discarding toast");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(severity: Severity) -> NotificationRecord {
        NotificationRecord {
            id: "n1".into(),
            r#type: "ticket_reply".into(),
            title: "Support replied".into(),
            message: "We've updated your ticket".into(),
            icon: Some("ticket".into()),
            severity,
            data: serde_json::json!({ "url": "/support/tickets/7" }),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[test]
    fn test_toast_from_record() {
        let toast = Toast::from_record(&record(Severity::Info));
        assert_eq!(toast.notification_id, "n1");
        assert_eq!(toast.glyph, "🎫");
        assert_eq!(toast.link.as_deref(), Some("/support/tickets/7"));
        assert_eq!(toast.duration, Duration::from_secs(4));
    }

    #[test]
    fn test_error_toast_duration() {
        let toast = Toast::from_record(&record(Severity::Error));
        assert_eq!(toast.duration, Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_channel_presenter_forwards() {
        let (presenter, mut rx) = ChannelToastPresenter::channel();
        presenter.present(Toast::from_record(&record(Severity::Success)));
        let toast = rx.recv().await.unwrap();
        assert_eq!(toast.severity, Severity::Success);
    }

    #[test]
    fn test_channel_presenter_survives_dropped_receiver() {
        let (presenter, rx) = ChannelToastPresenter::channel();
        drop(rx);
        presenter.present(Toast::from_record(&record(Severity::Warning)));
        TracingToastPresenter.present(Toast::from_record(&record(Severity::Warning)));
    }
}
