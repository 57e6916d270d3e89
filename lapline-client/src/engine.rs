//! Sync engine: moves events between the local store and the remote.
//!
//! The engine drives a [`SyncState`] machine and executes the actions it
//! produces. Push and pull run on independent timers; only push is guarded
//! against overlap. Every store write is an idempotent merge by event id, so
//! an interleaved or late-finishing operation is always safe to apply.

use crate::error::{ClientError, Result};
use crate::remote::Remote;
use crate::store::{EventStore, SessionRecord};
use lapline_core::{
    plan_pull, resolve_ingest, Action, Event, PullOutcome, PushOutcome, SyncEvent, SyncState,
    Watermark,
};
use lapline_types::{EventId, IngestRequest, SessionId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of one push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushReport {
    /// Another push was in flight, or the engine is stopped.
    Skipped,
    /// No unsynced events.
    Empty,
    /// The remote answered.
    Delivered {
        /// Events marked synced.
        accepted: usize,
        /// Events left pending for the next push.
        pending: usize,
    },
}

/// Result of one pull attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Events upserted from the remote.
    pub count: usize,
    /// Whether the local session log was wiped by a newer CLEAR_ALL.
    pub reset: bool,
}

/// Result of a push followed by a pull.
///
/// The halves are independent; a failed push does not prevent the pull.
#[derive(Debug)]
pub struct SyncReport {
    /// Push half.
    pub push: Result<PushReport>,
    /// Pull half.
    pub pull: Result<PullReport>,
}

impl SyncReport {
    /// Whether both halves succeeded.
    pub fn is_ok(&self) -> bool {
        self.push.is_ok() && self.pull.is_ok()
    }

    /// Both reports, or the first error (push before pull).
    pub fn into_result(self) -> Result<(PushReport, PullReport)> {
        Ok((self.push?, self.pull?))
    }
}

/// Sync engine for one session.
pub struct SyncEngine<S: EventStore, R: Remote> {
    store: Arc<S>,
    remote: Arc<R>,
    session_id: SessionId,
    state: Arc<Mutex<SyncState>>,
    events: broadcast::Sender<SyncEvent>,
}

impl<S: EventStore, R: Remote> Clone for SyncEngine<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            remote: Arc::clone(&self.remote),
            session_id: self.session_id.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        }
    }
}

impl<S: EventStore, R: Remote> SyncEngine<S, R> {
    /// Create an engine for `session_id`.
    pub fn new(store: Arc<S>, remote: Arc<R>, session_id: SessionId) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            remote,
            session_id,
            state: Arc::new(Mutex::new(SyncState::new())),
            events,
        }
    }

    /// Session this engine syncs.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Subscribe to sync events. Re-derive standings on `Pushed` or `Pulled`.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the lane state.
    pub fn state(&self) -> SyncState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one event to the state machine, emit what it reports and return
    /// the I/O actions left to execute.
    fn step(&self, event: Event) -> Vec<Action> {
        let actions = {
            let mut state = self.lock_state();
            let (next, actions) = state.clone().on_event(event);
            *state = next;
            actions
        };

        let mut pending = Vec::new();
        for action in actions {
            match action {
                Action::EmitEvent(event) => self.emit(event),
                other => pending.push(other),
            }
        }
        pending
    }

    fn emit(&self, event: SyncEvent) {
        let session = &self.session_id;
        match &event {
            SyncEvent::Pushed { accepted, pending } => {
                tracing::info!(%session, accepted, pending, "pushed events");
            }
            SyncEvent::PushFailed { error } => {
                tracing::warn!(%session, %error, "push failed, will retry");
            }
            SyncEvent::Pulled { count, reset } => {
                tracing::info!(%session, count, reset, "pulled events");
            }
            SyncEvent::PullFailed { error } => {
                tracing::warn!(%session, %error, "pull failed, will retry");
            }
            SyncEvent::Stopped => tracing::info!(%session, "sync stopped"),
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn session(&self) -> Result<SessionRecord> {
        self.store
            .session(&self.session_id)
            .await?
            .ok_or_else(|| ClientError::SessionNotFound {
                session_id: self.session_id.to_string(),
            })
    }

    fn credential(record: &SessionRecord) -> Result<&str> {
        record
            .credential
            .as_deref()
            .ok_or_else(|| ClientError::NotPaired {
                session_id: record.id.to_string(),
            })
    }

    /// Push unsynced events once.
    ///
    /// Returns [`PushReport::Skipped`] without touching the store when a
    /// push is already in flight.
    pub async fn push_once(&self) -> Result<PushReport> {
        if !self.step(Event::PushTick).contains(&Action::Push) {
            tracing::debug!(session = %self.session_id, "push skipped");
            return Ok(PushReport::Skipped);
        }

        let result = self.push_batch().await;
        let outcome = match &result {
            Ok(PushReport::Delivered { accepted, pending }) => PushOutcome::Delivered {
                accepted: *accepted,
                pending: *pending,
            },
            Ok(_) => PushOutcome::Nothing,
            Err(e) => PushOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.step(Event::PushSettled { outcome });
        result
    }

    async fn push_batch(&self) -> Result<PushReport> {
        let record = self.session().await?;
        let credential = Self::credential(&record)?;

        let events = self.store.unsynced(&record.id).await?;
        if events.is_empty() {
            return Ok(PushReport::Empty);
        }

        let batch: Vec<EventId> = events.iter().map(|e| e.id.clone()).collect();
        let request = IngestRequest {
            session_id: record
                .remote_session_id
                .clone()
                .unwrap_or_else(|| record.id.to_string()),
            run_config_id: record.run_config_id.clone().unwrap_or_default(),
            events,
        };

        let response = self.remote.ingest(credential, &request).await?;
        if let Some(error) = &response.error {
            tracing::warn!(session = %record.id, %error, "remote reported ingest error");
        }

        let outcome = resolve_ingest(&batch, &response);
        self.store
            .mark_synced(&outcome.accepted, crate::now_ms())
            .await?;

        Ok(PushReport::Delivered {
            accepted: outcome.accepted.len(),
            pending: outcome.pending.len(),
        })
    }

    /// Pull remote events after the watermark once.
    ///
    /// A stopped engine returns an empty report.
    pub async fn pull_once(&self) -> Result<PullReport> {
        if !self.step(Event::PullTick).contains(&Action::Pull) {
            return Ok(PullReport::default());
        }

        let result = self.pull_batch().await;
        let outcome = match &result {
            Ok(report) => PullOutcome::Applied {
                count: report.count,
                reset: report.reset,
            },
            Err(e) => PullOutcome::Failed {
                error: e.to_string(),
            },
        };
        self.step(Event::PullSettled { outcome });
        result
    }

    async fn pull_batch(&self) -> Result<PullReport> {
        let record = self.session().await?;
        let credential = Self::credential(&record)?;

        let events = self
            .remote
            .events_since(credential, record.pull_watermark_ms)
            .await?;
        let plan = plan_pull(
            events,
            Watermark::at(record.pull_watermark_ms),
            Watermark::at(record.reset_watermark_ms),
        );
        if plan.is_empty() {
            return Ok(PullReport::default());
        }

        if plan.wipe_session {
            let deleted = self
                .store
                .wipe_for_reset(&record.id, plan.reset_watermark.value())
                .await?;
            tracing::info!(
                session = %record.id,
                deleted,
                reset_at = plan.reset_watermark.value(),
                "remote reset, wiped pre-reset log"
            );
        }

        let count = self
            .store
            .upsert_remote(&record.id, &plan.upserts, crate::now_ms())
            .await?;
        self.store
            .advance_watermarks(
                &record.id,
                plan.watermark.value(),
                plan.reset_watermark.value(),
            )
            .await?;

        Ok(PullReport {
            count,
            reset: plan.wipe_session,
        })
    }

    /// Push, then pull, reporting both outcomes.
    pub async fn sync_once(&self) -> SyncReport {
        let push = self.push_once().await;
        let pull = self.pull_once().await;
        SyncReport { push, pull }
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: EventStore + 'static,
    R: Remote + 'static,
{
    /// Start the push and pull timers.
    ///
    /// Both fire immediately, then every `push_every` / `pull_every`.
    /// Failures are reported through [`SyncEngine::subscribe`] and retried on
    /// the next tick.
    pub fn spawn(&self, push_every: Duration, pull_every: Duration) -> SyncHandle<S, R> {
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            session = %self.session_id,
            push_ms = push_every.as_millis() as u64,
            pull_ms = pull_every.as_millis() as u64,
            "sync started"
        );

        let push = {
            let engine = self.clone();
            Self::spawn_lane(push_every, stop_rx.clone(), move || {
                let engine = engine.clone();
                async move {
                    // Failures were already emitted as PushFailed.
                    let _ = engine.push_once().await;
                }
            })
        };
        let pull = {
            let engine = self.clone();
            Self::spawn_lane(pull_every, stop_rx, move || {
                let engine = engine.clone();
                async move {
                    let _ = engine.pull_once().await;
                }
            })
        };

        SyncHandle {
            engine: self.clone(),
            stop: stop_tx,
            tasks: vec![push, pull],
        }
    }

    fn spawn_lane<F, Fut>(
        every: Duration,
        mut stop: watch::Receiver<bool>,
        mut tick: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // The tick body is not a select branch, so a stop never cancels
                // an operation already in flight.
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = timer.tick() => tick().await,
                }
            }
        })
    }
}

/// Handle to running sync timers.
pub struct SyncHandle<S: EventStore, R: Remote> {
    engine: SyncEngine<S, R>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: EventStore, R: Remote> SyncHandle<S, R> {
    /// The engine the timers drive.
    pub fn engine(&self) -> &SyncEngine<S, R> {
        &self.engine
    }

    /// Stop both timers and wait for in-flight operations to finish.
    pub async fn stop(self) {
        self.engine.step(Event::StopRequested);
        // Receivers gone means the tasks already exited.
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(session = %self.engine.session_id, error = %e, "sync task failed");
            }
        }
    }
}
