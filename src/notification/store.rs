//! In-memory notification state for one session.
//!
//! Records are kept newest-first and unique by id. Both transports and the
//! user-facing actions mutate this store; nothing here touches the network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::notification::NotificationRecord;

#[derive(Debug, Default, Clone)]
pub struct StoreState {
    records: Vec<NotificationRecord>,
    unread_count: u64,
    watermark: Option<DateTime<Utc>>,
    /// Bumped on every push/poll insertion.
    version: u64,
    /// Version at which each pushed or polled record arrived.
    arrivals: HashMap<String, u64>,
}

impl StoreState {
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Current arrival version. Capture it before issuing a fetch and pass
    /// it to [`StoreState::hydrate`].
    pub fn version(&self) -> u64 {
        self.version
    }

    fn record_arrival(&mut self, id: &str) {
        self.version += 1;
        self.arrivals.insert(id.to_string(), self.version);
    }

    fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Replace the list with a freshly fetched page.
    ///
    /// `since` is the [`version`](StoreState::version) observed when the
    /// fetch was issued. Records pushed or polled after that point and
    /// absent from the page stay at the head, so a slow fetch cannot erase
    /// arrivals that beat it. Everything else is dropped, including when
    /// the page is empty.
    pub fn hydrate(&mut self, page: Vec<NotificationRecord>, since: u64) {
        let fetched_ids: HashSet<String> = page.iter().map(|r| r.id.clone()).collect();
        let arrivals = &self.arrivals;

        let mut merged: Vec<NotificationRecord> = self
            .records
            .drain(..)
            .filter(|r| !fetched_ids.contains(&r.id))
            .filter(|r| arrivals.get(&r.id).is_some_and(|&v| v > since))
            .collect();

        let mut seen: HashSet<String> = merged.iter().map(|r| r.id.clone()).collect();
        self.arrivals.retain(|id, _| seen.contains(id));
        merged.extend(page.into_iter().filter(|r| seen.insert(r.id.clone())));
        self.records = merged;
    }

    pub fn set_unread_count(&mut self, count: u64) {
        self.unread_count = count;
    }

    /// Insert a pushed record at the head. Returns false for a duplicate id.
    pub fn receive_push(&mut self, record: NotificationRecord) -> bool {
        if self.contains(&record.id) {
            return false;
        }
        if !record.is_read {
            self.unread_count += 1;
        }
        self.record_arrival(&record.id);
        self.records.insert(0, record);
        true
    }

    /// Apply one poll batch: records go to the head in server order, the
    /// unread count takes the server's value (kept as is when the server
    /// omitted it) and the watermark advances. Returns the records that
    /// were actually inserted.
    pub fn receive_polled(
        &mut self,
        batch: Vec<NotificationRecord>,
        server_unread: Option<u64>,
        as_of: DateTime<Utc>,
    ) -> Vec<NotificationRecord> {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.id.clone()).collect();
        let inserted: Vec<NotificationRecord> = batch
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();

        for record in &inserted {
            self.record_arrival(&record.id);
        }
        self.records.splice(0..0, inserted.iter().cloned());
        if let Some(count) = server_unread {
            self.unread_count = count;
        }
        self.advance_watermark(as_of);
        inserted
    }

    /// Move the watermark forward; an older timestamp is ignored.
    pub fn advance_watermark(&mut self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self.watermark {
            Some(current) if current >= ts => current,
            _ => {
                self.watermark = Some(ts);
                ts
            }
        }
    }

    /// Mark the given ids read. Ids already read locally are not counted
    /// again; ids outside the local page still are, since the server count
    /// covers more than the page. Returns how much the counter dropped.
    pub fn mark_read(&mut self, ids: &[String]) -> u64 {
        let unique: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut newly_read = 0u64;
        for id in unique {
            match self.records.iter_mut().find(|r| r.id == id) {
                Some(record) if record.is_read => {}
                Some(record) => {
                    record.is_read = true;
                    newly_read += 1;
                }
                None => newly_read += 1,
            }
        }
        let before = self.unread_count;
        self.unread_count = self.unread_count.saturating_sub(newly_read);
        before - self.unread_count
    }

    pub fn mark_all_read(&mut self) {
        for record in self.records.iter_mut() {
            record.is_read = true;
        }
        self.unread_count = 0;
    }
}

/// Shared, cheaply-cloneable notification store.
#[derive(Clone, Default)]
pub struct NotificationStore(Arc<RwLock<StoreState>>);

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.0.read().await.records.clone()
    }

    pub async fn unread_count(&self) -> u64 {
        self.0.read().await.unread_count
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        self.0.read().await.watermark
    }

    pub async fn version(&self) -> u64 {
        self.0.read().await.version
    }

    pub async fn snapshot(&self) -> StoreState {
        self.0.read().await.clone()
    }

    pub async fn hydrate(&self, page: Vec<NotificationRecord>, since: u64) {
        self.0.write().await.hydrate(page, since);
    }

    pub async fn set_unread_count(&self, count: u64) {
        self.0.write().await.set_unread_count(count);
    }

    pub async fn receive_push(&self, record: NotificationRecord) -> bool {
        self.0.write().await.receive_push(record)
    }

    pub async fn receive_polled(
        &self,
        batch: Vec<NotificationRecord>,
        server_unread: Option<u64>,
        as_of: DateTime<Utc>,
    ) -> Vec<NotificationRecord> {
        self.0.write().await.receive_polled(batch, server_unread, as_of)
    }

    pub async fn advance_watermark(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        self.0.write().await.advance_watermark(ts)
    }

    pub async fn mark_read(&self, ids: &[String]) -> u64 {
        self.0.write().await.mark_read(ids)
    }

    pub async fn mark_all_read(&self) {
        self.0.write().await.mark_all_read();
    }

    /// Drop everything; used when a session stops.
    pub async fn clear(&self) {
        *self.0.write().await = StoreState::default();
    }
}
