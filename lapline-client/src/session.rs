//! Race session capture API.
//!
//! [`RaceSession`] is the capture boundary: runner ids are validated against
//! the session's [`RunnerIdFormat`] before an event is constructed, then the
//! event is appended to the local store unsynced. Standings are re-derived
//! from the store on every read.

use crate::error::{ClientError, Result};
use crate::store::{EventStore, SessionRecord};
use lapline_core::{derive_runner, derive_standings, ordered_effective, retracted_ids};
use lapline_core::{RunTemplateConfig, RunnerState};
use lapline_types::{EventId, EventType, RunEvent, RunnerId, SessionId, StationId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accepted shape of a runner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerIdFormat {
    /// Any non-empty id except the reserved `*`.
    #[default]
    Any,
    /// ASCII digits only.
    Numeric,
    /// ASCII letters and digits only.
    Alphanumeric,
}

impl RunnerIdFormat {
    /// Name stored in the session record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Numeric => "numeric",
            Self::Alphanumeric => "alphanumeric",
        }
    }

    /// Parse a stored name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "any" => Some(Self::Any),
            "numeric" => Some(Self::Numeric),
            "alphanumeric" => Some(Self::Alphanumeric),
            _ => None,
        }
    }

    /// Human description used in validation errors.
    pub fn expected(&self) -> &'static str {
        match self {
            Self::Any => "a non-empty id other than \"*\"",
            Self::Numeric => "digits only",
            Self::Alphanumeric => "letters and digits only",
        }
    }

    /// Validate raw input and return the trimmed runner id.
    pub fn validate(&self, raw: &str) -> Result<RunnerId> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed != RunnerId::ALL
            && match self {
                Self::Any => true,
                Self::Numeric => trimmed.chars().all(|c| c.is_ascii_digit()),
                Self::Alphanumeric => trimmed.chars().all(|c| c.is_ascii_alphanumeric()),
            };

        if valid {
            Ok(RunnerId::new(trimmed))
        } else {
            Err(ClientError::InvalidRunnerId {
                runner_id: raw.to_string(),
                expected: self.expected(),
            })
        }
    }
}

/// A capture session backed by a local event store.
pub struct RaceSession<S: EventStore> {
    store: Arc<S>,
    record: SessionRecord,
    config: RunTemplateConfig,
}

impl<S: EventStore> RaceSession<S> {
    /// Open an existing session.
    pub async fn open(store: Arc<S>, id: &SessionId) -> Result<Self> {
        let record = store
            .session(id)
            .await?
            .ok_or_else(|| ClientError::SessionNotFound {
                session_id: id.to_string(),
            })?;
        Ok(Self::from_record(store, record))
    }

    /// Persist a new session and open it.
    pub async fn create(store: Arc<S>, record: SessionRecord) -> Result<Self> {
        store.save_session(&record).await?;
        tracing::info!(
            session = %record.id,
            template = %record.template_key,
            laps = record.laps_required,
            "created session"
        );
        Ok(Self::from_record(store, record))
    }

    fn from_record(store: Arc<S>, record: SessionRecord) -> Self {
        let config = record.template_config();
        Self {
            store,
            record,
            config,
        }
    }

    /// Session record as loaded.
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Template config the log is folded under.
    pub fn config(&self) -> &RunTemplateConfig {
        &self.config
    }

    /// Local session id.
    pub fn id(&self) -> &SessionId {
        &self.record.id
    }

    async fn append(&self, event: RunEvent) -> Result<RunEvent> {
        self.store.append(&self.record.id, &event).await?;
        tracing::debug!(
            session = %self.record.id,
            event = %event.id,
            kind = %event.event_type,
            runner = %event.runner_id,
            "captured event"
        );
        Ok(event)
    }

    /// Record a scan of `runner` at `station`.
    pub async fn scan(&self, runner: &str, station: StationId, at_ms: i64) -> Result<RunEvent> {
        let runner = self.record.runner_id_format.validate(runner)?;
        self.append(RunEvent::scan(runner, station, at_ms)).await
    }

    /// Record a manual start for each runner.
    ///
    /// Every id is validated before anything is written.
    pub async fn start_set(&self, runners: &[&str], at_ms: i64) -> Result<Vec<RunEvent>> {
        let format = self.record.runner_id_format;
        let runners = runners
            .iter()
            .map(|raw| format.validate(raw))
            .collect::<Result<Vec<_>>>()?;

        let mut events = Vec::with_capacity(runners.len());
        for runner in runners {
            events.push(self.append(RunEvent::start_set(runner, at_ms)).await?);
        }
        Ok(events)
    }

    /// Retract an event of this session.
    pub async fn undo(&self, target: &EventId, at_ms: i64) -> Result<RunEvent> {
        let stored = self
            .store
            .event(target)
            .await?
            .filter(|stored| stored.session_id == self.record.id)
            .ok_or_else(|| ClientError::UnknownEvent {
                event_id: target.to_string(),
            })?;

        if stored.event.is_undo() {
            return Err(ClientError::CannotUndo {
                event_id: target.to_string(),
                reason: "an undo cannot be retracted".to_string(),
            });
        }
        let events = self.events().await?;
        if retracted_ids(&events).contains(target) {
            return Err(ClientError::CannotUndo {
                event_id: target.to_string(),
                reason: "already retracted".to_string(),
            });
        }

        self.append(RunEvent::undo(&stored.event, at_ms)).await
    }

    /// Retract the runner's latest effective scan or start.
    pub async fn undo_last(&self, runner: &str, at_ms: i64) -> Result<RunEvent> {
        let runner = self.record.runner_id_format.validate(runner)?;
        let events = self.events().await?;
        let target = ordered_effective(&events)
            .into_iter()
            .filter(|event| event.runner_id == runner)
            .filter(|event| matches!(event.event_type, EventType::Scan | EventType::StartSet))
            .last()
            .cloned()
            .ok_or_else(|| ClientError::NothingToUndo {
                runner_id: runner.to_string(),
            })?;

        self.append(RunEvent::undo(&target, at_ms)).await
    }

    /// Reset one runner.
    pub async fn clear(&self, runner: &str, station: StationId, at_ms: i64) -> Result<RunEvent> {
        let runner = self.record.runner_id_format.validate(runner)?;
        self.append(RunEvent::clear(runner, station, at_ms)).await
    }

    /// Reset every runner.
    ///
    /// The reset watermark moves to the new event, so pulling it back from
    /// the remote does not wipe this device's own log.
    pub async fn clear_all(&self, station: Option<StationId>, at_ms: i64) -> Result<RunEvent> {
        let event = self.append(RunEvent::clear_all(station, at_ms)).await?;
        self.store
            .advance_watermarks(&self.record.id, 0, at_ms)
            .await?;
        tracing::info!(session = %self.record.id, at_ms, "cleared all runners");
        Ok(event)
    }

    /// The whole session log in replay order, tombstones included.
    pub async fn events(&self) -> Result<Vec<RunEvent>> {
        Ok(self.store.events(&self.record.id).await?)
    }

    /// Current state of every runner seen in the log.
    pub async fn standings(&self) -> Result<BTreeMap<RunnerId, RunnerState>> {
        let events = self.events().await?;
        Ok(derive_standings(&events, &self.config))
    }

    /// Current state of one runner.
    pub async fn runner(&self, runner: &str) -> Result<RunnerState> {
        let runner = self.record.runner_id_format.validate(runner)?;
        let events = self.events().await?;
        Ok(derive_runner(&events, &runner, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use lapline_core::RunnerFlag;

    async fn session(template: &str, laps: u32) -> RaceSession<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        RaceSession::create(store, SessionRecord::new("Heat 1", template, laps))
            .await
            .unwrap()
    }

    #[test]
    fn format_names_round_trip() {
        for format in [
            RunnerIdFormat::Any,
            RunnerIdFormat::Numeric,
            RunnerIdFormat::Alphanumeric,
        ] {
            assert_eq!(RunnerIdFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(RunnerIdFormat::parse("hex"), None);
    }

    #[test]
    fn validate_trims_and_checks_shape() {
        assert_eq!(
            RunnerIdFormat::Numeric.validate(" 42 ").unwrap(),
            RunnerId::new("42")
        );
        assert!(RunnerIdFormat::Numeric.validate("4a").is_err());
        assert!(RunnerIdFormat::Alphanumeric.validate("A7").is_ok());
        assert!(RunnerIdFormat::Alphanumeric.validate("A-7").is_err());
        assert!(RunnerIdFormat::Any.validate("A-7").is_ok());
    }

    #[test]
    fn validate_rejects_empty_and_reserved() {
        for format in [RunnerIdFormat::Any, RunnerIdFormat::Alphanumeric] {
            assert!(format.validate("   ").is_err());
            assert!(format.validate("*").is_err());
        }
    }

    #[tokio::test]
    async fn open_missing_session_fails() {
        let store = Arc::new(MemoryStore::new());
        let result = RaceSession::open(store, &SessionId::from("nope")).await;
        assert!(matches!(result, Err(ClientError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn open_restores_created_session() {
        let store = Arc::new(MemoryStore::new());
        let created = RaceSession::create(store.clone(), SessionRecord::new("Heat", "lap-only", 3))
            .await
            .unwrap();
        created.scan("7", StationId::LapEnd, 0).await.unwrap();

        let reopened = RaceSession::open(store, created.id()).await.unwrap();
        assert_eq!(reopened.record().laps_required, 3);
        assert_eq!(reopened.runner("7").await.unwrap().lap_count, 1);
    }

    #[tokio::test]
    async fn lap_only_three_laps_finishes() {
        let session = session("lap-only", 3).await;
        for at in [0, 11_000, 22_000] {
            session.scan("7", StationId::LapEnd, at).await.unwrap();
        }

        let state = session.runner("7").await.unwrap();
        assert_eq!(state.lap_count, 3);
        assert_eq!(state.finished_at_ms, Some(22_000));
    }

    #[tokio::test]
    async fn invalid_runner_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut record = SessionRecord::new("Heat", "lap-only", 1);
        record.runner_id_format = RunnerIdFormat::Numeric;
        let session = RaceSession::create(store, record).await.unwrap();

        let err = session.scan("abc", StationId::LapEnd, 0).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRunnerId { .. }));

        let err = session.start_set(&["1", "x"], 0).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRunnerId { .. }));
        assert!(session.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_set_marks_each_runner_started() {
        let session = session("start-lap", 2).await;
        let events = session.start_set(&["1", "2"], 500).await.unwrap();
        assert_eq!(events.len(), 2);

        let standings = session.standings().await.unwrap();
        assert_eq!(standings.len(), 2);
        assert!(standings.values().all(|s| s.started_at_ms == Some(500)));
    }

    #[tokio::test]
    async fn undo_by_id_equals_never_scanned() {
        let session = session("lap-only", 5).await;
        let first = session.scan("7", StationId::LapEnd, 0).await.unwrap();
        session.scan("7", StationId::LapEnd, 11_000).await.unwrap();

        session.undo(&first.id, 12_000).await.unwrap();
        let state = session.runner("7").await.unwrap();
        assert_eq!(state.lap_count, 1);
        assert_eq!(
            state.last_seen_ms_at_station.get(&StationId::LapEnd),
            Some(&11_000)
        );
    }

    #[tokio::test]
    async fn undo_refuses_unknown_undo_and_repeat() {
        let session = session("lap-only", 5).await;
        let err = session.undo(&EventId::from("missing"), 0).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownEvent { .. }));

        let scan = session.scan("7", StationId::LapEnd, 0).await.unwrap();
        let undo = session.undo(&scan.id, 1).await.unwrap();

        let err = session.undo(&scan.id, 2).await.unwrap_err();
        assert!(matches!(err, ClientError::CannotUndo { .. }));
        let err = session.undo(&undo.id, 3).await.unwrap_err();
        assert!(matches!(err, ClientError::CannotUndo { .. }));
    }

    #[tokio::test]
    async fn undo_ignores_other_sessions() {
        let store = Arc::new(MemoryStore::new());
        let a = RaceSession::create(store.clone(), SessionRecord::new("A", "lap-only", 1))
            .await
            .unwrap();
        let b = RaceSession::create(store, SessionRecord::new("B", "lap-only", 1))
            .await
            .unwrap();
        let scan = a.scan("7", StationId::LapEnd, 0).await.unwrap();

        let err = b.undo(&scan.id, 1).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownEvent { .. }));
    }

    #[tokio::test]
    async fn undo_last_walks_back() {
        let session = session("lap-only", 5).await;
        session.scan("7", StationId::LapEnd, 0).await.unwrap();
        let second = session.scan("7", StationId::LapEnd, 11_000).await.unwrap();
        session.scan("8", StationId::LapEnd, 12_000).await.unwrap();

        let undo = session.undo_last("7", 13_000).await.unwrap();
        assert_eq!(undo.target_id, Some(second.id));

        session.undo_last("7", 14_000).await.unwrap();
        assert_eq!(session.runner("7").await.unwrap().lap_count, 0);
        assert_eq!(session.runner("8").await.unwrap().lap_count, 1);

        let err = session.undo_last("7", 15_000).await.unwrap_err();
        assert!(matches!(err, ClientError::NothingToUndo { .. }));
    }

    #[tokio::test]
    async fn clear_and_clear_all_reset() {
        let session = session("lap-two-checkpoints", 3).await;
        session.scan("1", StationId::LapEnd, 0).await.unwrap();
        session.scan("2", StationId::LapEnd, 0).await.unwrap();
        assert!(session
            .runner("1")
            .await
            .unwrap()
            .has_flag(RunnerFlag::SoftMissingCheckpoint));

        session.clear("1", StationId::LapEnd, 1_000).await.unwrap();
        assert_eq!(session.runner("1").await.unwrap(), RunnerState::initial());
        assert_eq!(session.runner("2").await.unwrap().lap_count, 1);

        session.clear_all(None, 2_000).await.unwrap();
        let standings = session.standings().await.unwrap();
        assert!(standings.values().all(|s| *s == RunnerState::initial()));
    }
}
