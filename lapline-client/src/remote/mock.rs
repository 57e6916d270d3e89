//! Mock remote for testing.
//!
//! Keeps one merged log per credential in memory, so several engines paired
//! with the same credential behave like devices sharing a remote session.
//! Failures and partial acknowledgements can be injected per call.

use super::Remote;
use crate::error::RemoteError;
use async_trait::async_trait;
use lapline_core::replay_order;
use lapline_types::{EventId, IngestRequest, IngestResponse, RunEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock remote authority.
///
/// Clones share the same underlying logs.
#[derive(Debug, Default, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    logs: HashMap<String, Vec<RunEvent>>,
    requests: Vec<IngestRequest>,
    pull_calls: usize,
    fail_next_ingest: Option<String>,
    fail_next_pull: Option<String>,
    reject_next: Option<HashSet<EventId>>,
    respond_bare_next: bool,
}

impl MockRemoteInner {
    fn store(&mut self, credential: &str, events: impl IntoIterator<Item = RunEvent>) {
        let log = self.logs.entry(credential.to_string()).or_default();
        for event in events {
            if !log.iter().any(|known| known.id == event.id) {
                log.push(event);
            }
        }
    }
}

impl MockRemote {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert events directly, as if another device had pushed them.
    pub fn seed(&self, credential: &str, events: Vec<RunEvent>) {
        self.lock().store(credential, events);
    }

    /// Events held for `credential`, in replay order.
    pub fn events(&self, credential: &str) -> Vec<RunEvent> {
        let mut events = self
            .lock()
            .logs
            .get(credential)
            .cloned()
            .unwrap_or_default();
        events.sort_by(replay_order);
        events
    }

    /// Every ingest request received, including failed ones.
    pub fn requests(&self) -> Vec<IngestRequest> {
        self.lock().requests.clone()
    }

    /// Number of ingest calls received.
    pub fn ingest_calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of pull calls received.
    pub fn pull_calls(&self) -> usize {
        self.lock().pull_calls
    }

    /// Cause the next ingest to fail with a connection error.
    pub fn fail_next_ingest(&self, error: &str) {
        self.lock().fail_next_ingest = Some(error.to_string());
    }

    /// Cause the next pull to fail with a connection error.
    pub fn fail_next_pull(&self, error: &str) {
        self.lock().fail_next_pull = Some(error.to_string());
    }

    /// Refuse these ids on the next ingest; they come back in `failedIds`.
    pub fn reject_next(&self, ids: &[EventId]) {
        self.lock().reject_next = Some(ids.iter().cloned().collect());
    }

    /// Answer the next ingest with an empty body.
    pub fn respond_bare_next(&self) {
        self.lock().respond_bare_next = true;
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn ingest(
        &self,
        credential: &str,
        request: &IngestRequest,
    ) -> Result<IngestResponse, RemoteError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());

        if let Some(error) = inner.fail_next_ingest.take() {
            return Err(RemoteError::ConnectionFailed(error));
        }

        let rejected = inner.reject_next.take().unwrap_or_default();
        let (failed, stored): (Vec<RunEvent>, Vec<RunEvent>) = request
            .events
            .iter()
            .cloned()
            .partition(|event| rejected.contains(&event.id));
        let accepted_ids: Vec<EventId> = stored.iter().map(|e| e.id.clone()).collect();
        inner.store(credential, stored);

        if std::mem::take(&mut inner.respond_bare_next) {
            return Ok(IngestResponse::default());
        }
        if failed.is_empty() {
            return Ok(IngestResponse {
                accepted_ids: Some(accepted_ids),
                ..Default::default()
            });
        }
        Ok(IngestResponse {
            accepted_ids: Some(accepted_ids),
            failed_ids: Some(failed.into_iter().map(|e| e.id).collect()),
            error: Some("partial ingest".to_string()),
        })
    }

    async fn events_since(
        &self,
        credential: &str,
        since_ms: i64,
    ) -> Result<Vec<RunEvent>, RemoteError> {
        let mut inner = self.lock();
        inner.pull_calls += 1;

        if let Some(error) = inner.fail_next_pull.take() {
            return Err(RemoteError::ConnectionFailed(error));
        }

        let mut events: Vec<RunEvent> = inner
            .logs
            .get(credential)
            .map(|log| {
                log.iter()
                    .filter(|e| e.captured_at_ms > since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by(replay_order);
        Ok(events)
    }
}
