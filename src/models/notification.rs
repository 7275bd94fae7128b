use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse classification driving toast styling and lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "warning" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl Severity {
    /// How long a toast of this severity stays on screen.
    pub fn toast_duration(self) -> Duration {
        match self {
            Severity::Error => Duration::from_secs(6),
            _ => Duration::from_secs(4),
        }
    }

    pub fn default_glyph(self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Success => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
        }
    }
}

/// A server-side notification as delivered by the REST API and the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub r#type: String, // e.g. "order_placed", "ticket_reply"
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl NotificationRecord {
    /// Glyph for the symbolic `icon`, or the severity default when the
    /// icon is missing or unknown.
    pub fn glyph(&self) -> &'static str {
        match self.icon.as_deref() {
            Some("bell") => "🔔",
            Some("package") | Some("order") => "📦",
            Some("truck") | Some("delivery") => "🚚",
            Some("check") | Some("check-circle") => "✅",
            Some("alert") | Some("warning") => "⚠️",
            Some("x") | Some("error") => "❌",
            Some("dollar") | Some("payment") | Some("credit-card") => "💳",
            Some("ticket") | Some("support") => "🎫",
            Some("star") => "⭐",
            Some("user") => "👤",
            Some("settings") => "⚙️",
            _ => self.severity.default_glyph(),
        }
    }

    /// Deep link carried in the payload, if any.
    pub fn link(&self) -> Option<&str> {
        self.data
            .get("link")
            .or_else(|| self.data.get("url"))
            .and_then(|v| v.as_str())
    }

    /// Relative age for list display, e.g. "5m ago".
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.created_at).num_seconds().max(0);
        match secs {
            0..=59 => "just now".to_string(),
            60..=3599 => format!("{}m ago", secs / 60),
            3600..=86_399 => format!("{}h ago", secs / 3600),
            86_400..=604_799 => format!("{}d ago", secs / 86_400),
            _ => self.created_at.format("%b %-d, %Y").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(json: serde_json::Value) -> NotificationRecord {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_deserialize_wire_record() {
        let rec = record(serde_json::json!({
            "_id": "n1",
            "type": "order_placed",
            "title": "New order",
            "message": "Order #42 was placed",
            "icon": "package",
            "severity": "success",
            "data": { "link": "/orders/42" },
            "createdAt": "2024-05-01T10:00:00.000Z",
            "isRead": false
        }));
        assert_eq!(rec.id, "n1");
        assert_eq!(rec.r#type, "order_placed");
        assert_eq!(rec.severity, Severity::Success);
        assert_eq!(rec.link(), Some("/orders/42"));
        assert_eq!(rec.glyph(), "📦");
        assert!(!rec.is_read);
    }

    #[test]
    fn test_unknown_severity_falls_back_to_info() {
        let rec = record(serde_json::json!({
            "id": "n2",
            "severity": "critical",
            "createdAt": "2024-05-01T10:00:00Z"
        }));
        assert_eq!(rec.severity, Severity::Info);
        assert_eq!(rec.glyph(), "ℹ️");
        assert!(rec.link().is_none());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Severity::Warning).unwrap(), "warning");
    }

    #[test]
    fn test_error_toasts_last_longer() {
        assert!(Severity::Error.toast_duration() > Severity::Info.toast_duration());
        assert_eq!(Severity::Success.toast_duration(), Severity::Warning.toast_duration());
    }

    #[test]
    fn test_time_ago_buckets() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let rec = NotificationRecord {
            id: "n".into(),
            r#type: String::new(),
            title: String::new(),
            message: String::new(),
            icon: None,
            severity: Severity::Info,
            data: serde_json::Value::Null,
            created_at: created,
            is_read: false,
        };
        assert_eq!(rec.time_ago(created + chrono::Duration::seconds(30)), "just now");
        assert_eq!(rec.time_ago(created + chrono::Duration::minutes(5)), "5m ago");
        assert_eq!(rec.time_ago(created + chrono::Duration::hours(3)), "3h ago");
        assert_eq!(rec.time_ago(created + chrono::Duration::days(2)), "2d ago");
        assert_eq!(rec.time_ago(created + chrono::Duration::days(30)), "May 1, 2024");
        // clock skew never yields a negative age
        assert_eq!(rec.time_ago(created - chrono::Duration::minutes(1)), "just now");
    }
}
