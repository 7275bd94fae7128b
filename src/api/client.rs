//! REST client for the notification endpoints.
//!
//! Every request carries `Authorization: Bearer <token>` and shares a cookie
//! store so server-side sessions continue across calls.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::errors::{NotifyError, Result};
use crate::models::api::{
    ApiEnvelope, MarkReadRequest, NotificationsPage, PollResult, UnreadCount,
};
use crate::models::notification::NotificationRecord;

#[derive(Clone)]
pub struct NotificationApi {
    base: Url,
    http: Client,
    token: Arc<RwLock<Option<String>>>,
}

impl NotificationApi {
    pub fn new(config: &Config, token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("laundry-notify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base: config.api_base()?,
            http,
            token: Arc::new(RwLock::new(token)),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.read().map(|t| t.is_some()).unwrap_or(false)
    }

    /// Swap the bearer token, e.g. on login/logout. Clones share it.
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self
            .token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or(NotifyError::MissingToken)?;
        let url = self.base.join(path)?;
        Ok(self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token)))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(NotifyError::Api { status, body });
        }
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
        envelope.into_data()
    }

    /// Acknowledgment-only endpoints: a 2xx is enough, unless the body
    /// explicitly says `success: false`.
    async fn send_ack(&self, req: RequestBuilder) -> Result<()> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::Api { status, body });
        }
        if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
            if !envelope.success {
                return Err(NotifyError::Rejected(
                    envelope.message.unwrap_or_else(|| "request unsuccessful".to_string()),
                ));
            }
        }
        Ok(())
    }

    /// `GET /notifications?limit=N`
    pub async fn list(&self, limit: u32) -> Result<Vec<NotificationRecord>> {
        let req = self
            .request(Method::GET, "notifications")?
            .query(&[("limit", limit)]);
        let page: NotificationsPage = self.send(req).await?;
        tracing::debug!(count = page.notifications.len(), "fetched notifications");
        Ok(page.notifications)
    }

    /// `GET /notifications/unread-count`
    pub async fn unread_count(&self) -> Result<u64> {
        let req = self.request(Method::GET, "notifications/unread-count")?;
        let count: UnreadCount = self.send(req).await?;
        Ok(count.unread_count)
    }

    /// `GET /notifications/poll?since=<ISO8601>`
    pub async fn poll(&self, since: DateTime<Utc>) -> Result<PollResult> {
        let req = self
            .request(Method::GET, "notifications/poll")?
            .query(&[("since", format_watermark(since))]);
        self.send(req).await
    }

    /// `PUT /notifications/mark-read`
    pub async fn mark_read(&self, ids: &[String]) -> Result<()> {
        let req = self
            .request(Method::PUT, "notifications/mark-read")?
            .json(&MarkReadRequest {
                notification_ids: ids.to_vec(),
            });
        self.send_ack(req).await
    }

    /// `PUT /notifications/read-all`
    pub async fn mark_all_read(&self) -> Result<()> {
        let req = self.request(Method::PUT, "notifications/read-all")?;
        self.send_ack(req).await
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
