//! Push channel framing.
//!
//! Every text frame carries a JSON envelope `{"event": "<name>", "data": ...}`.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::notification::NotificationRecord;

#[derive(Debug, Deserialize, Serialize)]
struct PushEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Which server-side claim changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimsChange {
    Permissions,
    Role,
}

impl std::fmt::Display for ClaimsChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimsChange::Permissions => write!(f, "permissionsUpdated"),
            ClaimsChange::Role => write!(f, "roleChanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Notification(NotificationRecord),
    ClaimsChanged(ClaimsChange),
    Unknown(String),
}

impl PushEvent {
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: PushEnvelope = serde_json::from_str(text)?;
        Ok(match envelope.event.as_str() {
            "notification" => PushEvent::Notification(serde_json::from_value(envelope.data)?),
            "permissionsUpdated" => PushEvent::ClaimsChanged(ClaimsChange::Permissions),
            "roleChanged" => PushEvent::ClaimsChanged(ClaimsChange::Role),
            _ => PushEvent::Unknown(envelope.event),
        })
    }

    /// Encode as a push frame. Used by servers and test fixtures.
    pub fn frame(event: &str, data: serde_json::Value) -> String {
        serde_json::to_string(&PushEnvelope {
            event: event.to_string(),
            data,
        })
        .unwrap_or_default()
    }
}
