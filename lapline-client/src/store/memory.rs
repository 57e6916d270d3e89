//! In-memory store backend.
//!
//! Same semantics as the SQLite backend, kept in process memory. Useful for
//! tests and for short-lived capture sessions that never touch disk.

use super::{EventStore, Origin, SessionRecord, StoredEvent};
use crate::error::StoreResult;
use async_trait::async_trait;
use lapline_core::replay_order;
use lapline_types::{EventId, RunEvent, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory event store.
///
/// Clones share the same underlying data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    sessions: BTreeMap<SessionId, SessionRecord>,
    events: HashMap<EventId, StoredEvent>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select<F>(&self, session_id: &SessionId, keep: F) -> Vec<StoredEvent>
    where
        F: Fn(&StoredEvent) -> bool,
    {
        let inner = self.lock();
        let mut selected: Vec<StoredEvent> = inner
            .events
            .values()
            .filter(|stored| stored.session_id == *session_id && keep(stored))
            .cloned()
            .collect();
        selected.sort_by(|a, b| replay_order(&a.event, &b.event));
        selected
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn save_session(&self, session: &SessionRecord) -> StoreResult<()> {
        let mut inner = self.lock();
        let mut record = session.clone();
        if let Some(existing) = inner.sessions.get(&session.id) {
            record.pull_watermark_ms = record.pull_watermark_ms.max(existing.pull_watermark_ms);
            record.reset_watermark_ms = record.reset_watermark_ms.max(existing.reset_watermark_ms);
            record.created_at_ms = existing.created_at_ms;
        }
        inner.sessions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        Ok(self.lock().sessions.get(id).cloned())
    }

    async fn sessions(&self) -> StoreResult<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sessions)
    }

    async fn advance_watermarks(
        &self,
        id: &SessionId,
        pull_watermark_ms: i64,
        reset_watermark_ms: i64,
    ) -> StoreResult<()> {
        if let Some(record) = self.lock().sessions.get_mut(id) {
            record.pull_watermark_ms = record.pull_watermark_ms.max(pull_watermark_ms);
            record.reset_watermark_ms = record.reset_watermark_ms.max(reset_watermark_ms);
        }
        Ok(())
    }

    async fn append(&self, session_id: &SessionId, event: &RunEvent) -> StoreResult<bool> {
        let mut inner = self.lock();
        if inner.events.contains_key(&event.id) {
            return Ok(false);
        }
        inner.events.insert(
            event.id.clone(),
            StoredEvent {
                event: event.clone(),
                session_id: session_id.clone(),
                synced_at_ms: None,
                origin: Origin::Local,
            },
        );
        Ok(true)
    }

    async fn upsert_remote(
        &self,
        session_id: &SessionId,
        events: &[RunEvent],
        synced_at_ms: i64,
    ) -> StoreResult<usize> {
        let mut inner = self.lock();
        for event in events {
            inner.events.insert(
                event.id.clone(),
                StoredEvent {
                    event: event.clone(),
                    session_id: session_id.clone(),
                    synced_at_ms: Some(synced_at_ms),
                    origin: Origin::Remote,
                },
            );
        }
        Ok(events.len())
    }

    async fn events(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>> {
        Ok(self
            .select(session_id, |_| true)
            .into_iter()
            .map(|s| s.event)
            .collect())
    }

    async fn stored_events(&self, session_id: &SessionId) -> StoreResult<Vec<StoredEvent>> {
        Ok(self.select(session_id, |_| true))
    }

    async fn events_in_range(
        &self,
        session_id: &SessionId,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<RunEvent>> {
        Ok(self
            .select(session_id, |s| {
                (from_ms..to_ms).contains(&s.event.captured_at_ms)
            })
            .into_iter()
            .map(|s| s.event)
            .collect())
    }

    async fn event(&self, id: &EventId) -> StoreResult<Option<StoredEvent>> {
        Ok(self.lock().events.get(id).cloned())
    }

    async fn unsynced(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>> {
        Ok(self
            .select(session_id, |s| !s.is_synced())
            .into_iter()
            .map(|s| s.event)
            .collect())
    }

    async fn mark_synced(&self, ids: &[EventId], synced_at_ms: i64) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut changed = 0;
        for id in ids {
            if let Some(stored) = inner.events.get_mut(id) {
                if stored.synced_at_ms.is_none() {
                    stored.synced_at_ms = Some(synced_at_ms);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn delete_session_events(&self, session_id: &SessionId) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.events.len();
        inner.events.retain(|_, stored| stored.session_id != *session_id);
        Ok((before - inner.events.len()) as u64)
    }

    async fn wipe_for_reset(&self, session_id: &SessionId, reset_at_ms: i64) -> StoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.events.len();
        inner.events.retain(|_, stored| {
            stored.session_id != *session_id
                || (!stored.is_synced() && stored.event.captured_at_ms > reset_at_ms)
        });
        Ok((before - inner.events.len()) as u64)
    }
}
