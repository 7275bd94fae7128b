//! Push transport over WebSocket.
//!
//! One connection per session, authenticated at handshake time with the
//! bearer token (query parameter and `Authorization` header). Frames are
//! decoded into [`PushEvent`]s and handed to a [`PushHandler`] in receipt
//! order.
//!
//! Failure policy:
//!   - the first connect fails or times out  → `Degraded`
//!   - an established connection drops       → `Disconnected`, retry on the
//!     backoff schedule; schedule exhausted  → `Degraded`

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::ConnectionState;
use crate::errors::{NotifyError, Result};
use crate::models::event::PushEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receives connection state changes and decoded events.
#[async_trait]
pub trait PushHandler: Send + Sync + 'static {
    async fn on_state(&self, state: ConnectionState);

    async fn on_event(&self, event: PushEvent);
}

/// How a single connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Ended {
    Shutdown,
    Dropped,
}

pub struct PushTransport {
    url: Url,
    token: String,
    connect_timeout: Duration,
    backoff: Vec<Duration>,
}

impl PushTransport {
    pub fn new(url: Url, token: String, connect_timeout: Duration, backoff: Vec<Duration>) -> Self {
        Self {
            url,
            token,
            connect_timeout,
            backoff,
        }
    }

    fn handshake_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", &self.token);
        url
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self.handshake_url().as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| NotifyError::Internal(anyhow::anyhow!("invalid token header: {}", e)))?;
        request.headers_mut().insert("Authorization", bearer);

        match tokio::time::timeout(self.connect_timeout, connect_async(request)).await {
            Err(_) => Err(NotifyError::ConnectTimeout),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok((ws, _resp))) => Ok(ws),
        }
    }

    /// Drive the connection until shutdown is signalled or reconnection
    /// gives up.
    pub async fn run<H: PushHandler>(self, handler: H, mut shutdown: watch::Receiver<bool>) {
        handler.on_state(ConnectionState::Connecting).await;

        let ws = tokio::select! {
            res = self.connect() => res,
            _ = shutdown.changed() => return,
        };
        let ws = match ws {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "push connect failed, falling back to polling");
                handler.on_state(ConnectionState::Degraded).await;
                return;
            }
        };

        tracing::info!(url = %self.url, "push connected");
        handler.on_state(ConnectionState::Connected).await;
        if pump(ws, &handler, &mut shutdown).await == Ended::Shutdown {
            return;
        }

        let mut attempt = 0;
        while attempt < self.backoff.len() {
            handler.on_state(ConnectionState::Disconnected).await;
            let delay = self.backoff[attempt];
            attempt += 1;
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "push reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = shutdown.changed() => return,
            }

            let ws = tokio::select! {
                res = self.connect() => res,
                _ = shutdown.changed() => return,
            };
            match ws {
                Ok(ws) => {
                    tracing::info!(url = %self.url, attempt, "push reconnected");
                    handler.on_state(ConnectionState::Connected).await;
                    attempt = 0;
                    if pump(ws, &handler, &mut shutdown).await == Ended::Shutdown {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt, error = %e, "push reconnect failed");
                }
            }
        }

        tracing::warn!(url = %self.url, "push reconnection exhausted, falling back to polling");
        handler.on_state(ConnectionState::Degraded).await;
    }
}

async fn pump<H: PushHandler>(
    ws: WsStream,
    handler: &H,
    shutdown: &mut watch::Receiver<bool>,
) -> Ended {
    let (mut sink, mut stream) = ws.split();
    let mut received: u64 = 0;

    let ended = loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                break Ended::Shutdown;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                received += 1;
                match PushEvent::parse(&text) {
                    Ok(PushEvent::Unknown(name)) => {
                        tracing::debug!(event = %name, "ignoring unknown push event");
                    }
                    Ok(event) => handler.on_event(event).await,
                    Err(e) => tracing::warn!(error = %e, "malformed push frame skipped"),
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                if sink.send(Message::Pong(payload)).await.is_err() {
                    break Ended::Dropped;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "push closed by server");
                break Ended::Dropped;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "push connection error");
                break Ended::Dropped;
            }
            None => break Ended::Dropped,
        }
    };

    tracing::debug!(received, ?ended, "push connection ended");
    ended
}
