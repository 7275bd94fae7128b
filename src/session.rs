//! Notification session: the public interface over store and transports.
//!
//! A session is started once a user is logged in and stopped on logout.
//! While running it:
//!   1. hydrates the store (recent page + unread count)
//!   2. keeps one push connection open
//!   3. starts polling when push is degraded, or when push has not
//!      connected within the fallback delay
//!   4. presents a toast for every newly delivered record
//!
//! Failures of any network call are logged and leave the last known state
//! in place.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::NotificationApi;
use crate::auth::{get_auth_token, ClientStorage};
use crate::config::Config;
use crate::errors::{NotifyError, Result};
use crate::models::event::{ClaimsChange, PushEvent};
use crate::models::notification::NotificationRecord;
use crate::notification::{NotificationStore, Toast, ToastPresenter};
use crate::transport::{ConnectionState, Poller, PushHandler, PushTransport};

/// Point-in-time view for UI consumers.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: u64,
    pub state: ConnectionState,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A record reached the store for the first time.
    Delivered(NotificationRecord),
    /// Server-side permissions or role changed; permission-derived state
    /// must be re-derived.
    ClaimsInvalidated(ClaimsChange),
    /// The API no longer accepts the stored token.
    Unauthorized,
}

struct Shared {
    config: Config,
    api: NotificationApi,
    store: NotificationStore,
    presenter: Arc<dyn ToastPresenter>,
    poller: Poller,
    state_tx: watch::Sender<ConnectionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    /// Bumped on every start/stop; work begun under an older value is dropped.
    generation: AtomicU64,
    running: AtomicBool,
}

#[derive(Default)]
struct Tasks {
    push: Option<JoinHandle<()>>,
    fallback: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

pub struct NotificationSession {
    shared: Arc<Shared>,
    storage: Arc<dyn ClientStorage>,
    tasks: Mutex<Tasks>,
}

impl NotificationSession {
    pub fn new(
        config: Config,
        storage: Arc<dyn ClientStorage>,
        presenter: Arc<dyn ToastPresenter>,
    ) -> Result<Self> {
        if config.poll_interval.is_zero() {
            return Err(NotifyError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        let api = NotificationApi::new(&config, None)?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(64);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                api,
                store: NotificationStore::new(),
                presenter,
                poller: Poller::new(),
                state_tx,
                snapshot_tx,
                events_tx,
                generation: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            storage,
            tasks: Mutex::new(Tasks::default()),
        })
    }

    /// Start delivery. Requires a stored auth token; calling it on a
    /// running session is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let prepared = get_auth_token(self.storage.as_ref())
            .ok_or(NotifyError::MissingToken)
            .and_then(|token| Ok((token, self.shared.config.socket_url()?)));
        let (token, socket_url) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(error = %e, "notification session not started");
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        self.shared.api.set_token(Some(token.clone()));
        self.shared.poller.open();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.store.advance_watermark(Utc::now()).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport = PushTransport::new(
            socket_url,
            token,
            self.shared.config.connect_timeout,
            self.shared.config.reconnect_backoff.clone(),
        );
        let push = tokio::spawn(transport.run(self.shared.clone(), shutdown_rx));

        let shared = self.shared.clone();
        let delay = self.shared.config.fallback_delay;
        let fallback = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if shared.is_current(generation) && !shared.is_connected() {
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    "push not connected in time, starting fallback polling"
                );
                shared.start_polling();
            }
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            *tasks = Tasks {
                push: Some(push),
                fallback: Some(fallback),
                shutdown: Some(shutdown_tx),
            };
        }

        tracing::info!(generation, "notification session started");
        let (list, count) = tokio::join!(
            self.shared.fetch_notifications(),
            self.shared.fetch_unread_count()
        );
        if let Err(e) = list.and(count) {
            tracing::warn!(error = %e, "initial notification fetch incomplete");
        }
        Ok(())
    }

    /// Stop delivery: close the push connection, cancel the fallback timer,
    /// stop polling and discard all state.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Tasks::default(),
        };
        if let Some(shutdown) = tasks.shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(fallback) = tasks.fallback {
            fallback.abort();
        }
        self.shared.poller.close();
        if let Some(mut push) = tasks.push {
            if tokio::time::timeout(Duration::from_secs(1), &mut push).await.is_err() {
                push.abort();
            }
        }

        self.shared.api.set_token(None);
        self.shared.store.clear().await;
        self.shared.state_tx.send_replace(ConnectionState::Disconnected);
        self.shared.publish().await;
        tracing::info!("notification session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.shared.store.notifications().await
    }

    pub async fn unread_count(&self) -> u64 {
        self.shared.store.unread_count().await
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.poller.is_running()
    }

    /// Watch the session's state; updated after every store mutation or
    /// connection change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Re-fetch the recent page, replacing the local list.
    pub async fn fetch_notifications(&self) -> Result<()> {
        self.shared.fetch_notifications().await
    }

    pub async fn fetch_unread_count(&self) -> Result<()> {
        self.shared.fetch_unread_count().await
    }

    /// Mark records read. Local state is updated whatever the server says;
    /// an `Err` only reports that the server call failed.
    pub async fn mark_as_read<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Ok(());
        }

        let result = self.shared.api.mark_read(&ids).await;
        if let Err(e) = &result {
            self.shared.report("mark-read", e);
        }
        let dropped = self.shared.store.mark_read(&ids).await;
        tracing::debug!(ids = ids.len(), dropped, "marked notifications read");
        self.shared.publish().await;
        result
    }

    /// Mark everything read. Same failure semantics as `mark_as_read`.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let result = self.shared.api.mark_all_read().await;
        if let Err(e) = &result {
            self.shared.report("read-all", e);
        }
        self.shared.store.mark_all_read().await;
        self.shared.publish().await;
        result
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.poller.close();
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(shutdown) = tasks.shutdown.take() {
                let _ = shutdown.send(true);
            }
            for handle in [tasks.push.take(), tasks.fallback.take()].into_iter().flatten() {
                handle.abort();
            }
        }
    }
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    fn report(&self, op: &str, e: &NotifyError) {
        tracing::warn!(op, error = %e, "notification request failed");
        if e.is_unauthorized() {
            let _ = self.events_tx.send(SessionEvent::Unauthorized);
        }
    }

    async fn publish(&self) {
        let state = self.store.snapshot().await;
        self.snapshot_tx.send_replace(SessionSnapshot {
            notifications: state.records().to_vec(),
            unread_count: state.unread_count(),
            state: *self.state_tx.borrow(),
        });
    }

    fn deliver(&self, record: NotificationRecord) {
        self.presenter.present(Toast::from_record(&record));
        let _ = self.events_tx.send(SessionEvent::Delivered(record));
    }

    async fn fetch_notifications(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        let since = self.store.version().await;
        match self.api.list(self.config.page_size).await {
            Ok(page) => {
                if !self.is_current(generation) {
                    tracing::debug!("discarding notifications fetched for a stopped session");
                    return Ok(());
                }
                self.store.hydrate(page, since).await;
                self.publish().await;
                Ok(())
            }
            Err(e) => {
                self.report("list", &e);
                Err(e)
            }
        }
    }

    async fn fetch_unread_count(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        match self.api.unread_count().await {
            Ok(count) => {
                if !self.is_current(generation) {
                    return Ok(());
                }
                self.store.set_unread_count(count).await;
                self.publish().await;
                Ok(())
            }
            Err(e) => {
                self.report("unread-count", &e);
                Err(e)
            }
        }
    }

    async fn poll_once(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let since = match self.store.watermark().await {
            Some(ts) => ts,
            None => self.store.advance_watermark(Utc::now()).await,
        };

        let result = match self.api.poll(since).await {
            Ok(result) => result,
            Err(e) => {
                self.report("poll", &e);
                return;
            }
        };
        if !self.is_current(generation) {
            return;
        }

        if !result.has_new {
            self.store.advance_watermark(result.timestamp).await;
            return;
        }

        let inserted = self
            .store
            .receive_polled(result.notifications, result.unread_count, result.timestamp)
            .await;
        tracing::debug!(new = inserted.len(), unread = ?result.unread_count, "poll applied");
        for record in inserted {
            self.deliver(record);
        }
        self.publish().await;
    }

    fn start_polling(self: &Arc<Self>) {
        let shared = self.clone();
        self.poller.start(self.config.poll_interval, move || {
            let shared = shared.clone();
            async move { shared.poll_once().await }
        });
    }

    async fn refresh_claims(self: Arc<Self>, change: ClaimsChange, generation: u64) {
        tokio::time::sleep(self.config.claims_refresh_delay).await;
        if !self.is_current(generation) {
            return;
        }
        tracing::info!(reason = %change, "session claims invalidated, refreshing");
        let _ = self.events_tx.send(SessionEvent::ClaimsInvalidated(change));
        let _ = tokio::join!(self.fetch_notifications(), self.fetch_unread_count());
    }
}

#[async_trait]
impl PushHandler for Arc<Shared> {
    async fn on_state(&self, state: ConnectionState) {
        tracing::debug!(%state, "push state changed");
        self.state_tx.send_replace(state);
        if state == ConnectionState::Degraded && self.running.load(Ordering::SeqCst) {
            self.start_polling();
        }
        self.publish().await;
    }

    async fn on_event(&self, event: PushEvent) {
        match event {
            PushEvent::Notification(record) => {
                if self.store.receive_push(record.clone()).await {
                    self.deliver(record);
                    self.publish().await;
                } else {
                    tracing::debug!(id = %record.id, "duplicate pushed notification ignored");
                }
            }
            PushEvent::ClaimsChanged(change) => {
                let generation = self.generation.load(Ordering::SeqCst);
                tokio::spawn(self.clone().refresh_claims(change, generation));
            }
            PushEvent::Unknown(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use crate::notification::TracingToastPresenter;

    fn session(config: Config) -> Result<NotificationSession> {
        NotificationSession::new(
            config,
            Arc::new(MemoryStorage::with_token("t")),
            Arc::new(TracingToastPresenter),
        )
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let config = Config {
            poll_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(session(config), Err(NotifyError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_polling_cannot_restart_after_stop() {
        let config = Config {
            // Nothing listens here; push degrades and polling starts at once.
            api_url: "http://127.0.0.1:9/api".to_string(),
            poll_interval: Duration::from_secs(60),
            fallback_delay: Duration::from_secs(60),
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let session = session(config).unwrap();
        session.start().await.unwrap();
        session.shared.start_polling();
        assert!(session.is_polling());

        session.stop().await;
        // A degraded push report racing with stop() lands here.
        session.shared.start_polling();
        assert!(!session.is_polling());

        session.start().await.unwrap();
        session.shared.start_polling();
        assert!(session.is_polling());
        session.stop().await;
    }
}
