use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{NotifyError, Result};
use crate::models::notification::NotificationRecord;

/// Standard `{ success, data, message }` wrapper used by every endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(NotifyError::Rejected(
                self.message.unwrap_or_else(|| "request unsuccessful".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| NotifyError::Rejected("response missing data".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsPage {
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: u64,
}

/// Result of `GET /notifications/poll?since=...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    #[serde(default)]
    pub has_new: bool,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    /// Absent when the server did not report a count.
    #[serde(default)]
    pub unread_count: Option<u64>,
    /// Server "as of" time; becomes the next `since` watermark.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_unwraps_data() {
        let env: ApiEnvelope<UnreadCount> =
            serde_json::from_str(r#"{"success":true,"data":{"unreadCount":7}}"#).unwrap();
        assert_eq!(env.into_data().unwrap().unread_count, 7);
    }

    #[test]
    fn test_envelope_unsuccessful_is_rejected() {
        let env: ApiEnvelope<UnreadCount> =
            serde_json::from_str(r#"{"success":false,"message":"token expired"}"#).unwrap();
        match env.into_data() {
            Err(NotifyError::Rejected(msg)) => assert_eq!(msg, "token expired"),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_poll_result_without_new_data() {
        let env: ApiEnvelope<PollResult> = serde_json::from_str(
            r#"{"success":true,"data":{"hasNew":false,"timestamp":"2024-05-01T10:00:10Z"}}"#,
        )
        .unwrap();
        let poll = env.into_data().unwrap();
        assert!(!poll.has_new);
        assert!(poll.notifications.is_empty());
        assert_eq!(poll.unread_count, None);
    }

    #[test]
    fn test_poll_result_reports_count_when_present() {
        let env: ApiEnvelope<PollResult> = serde_json::from_str(
            r#"{"data":{"hasNew":true,"notifications":[],"unreadCount":0,"timestamp":"2024-05-01T10:00:10Z"}}"#,
        )
        .unwrap();
        assert_eq!(env.into_data().unwrap().unread_count, Some(0));
    }

    #[test]
    fn test_mark_read_request_shape() {
        let body = MarkReadRequest {
            notification_ids: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "notificationIds": ["a", "b"] })
        );
    }
}
