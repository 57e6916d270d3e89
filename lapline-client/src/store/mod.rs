//! Local event store for lapline-client.
//!
//! An append-only, per-session event log plus the session records that
//! describe how to fold and sync it. Events are keyed by id, so every merge is
//! an idempotent union.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use lapline_core::{Enforcement, RunTemplateConfig, TemplateKey, TemplateOverrides};
use lapline_types::{EventId, RunEvent, SessionId, TokenResolution};
use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};
use crate::session::RunnerIdFormat;

/// Where a stored event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Captured on this device.
    Local,
    /// Received from the remote.
    Remote,
}

impl Origin {
    /// Name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for Origin {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(StoreError::InvalidRow {
                table: "events",
                reason: format!("unknown origin {other:?}"),
            }),
        }
    }
}

/// An event plus store-local housekeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// The logical event.
    pub event: RunEvent,
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// When the event was acknowledged by (or received from) the remote.
    pub synced_at_ms: Option<i64>,
    /// Where the event came from.
    pub origin: Origin,
}

impl StoredEvent {
    /// Whether the remote has the event.
    pub fn is_synced(&self) -> bool {
        self.synced_at_ms.is_some()
    }
}

/// A capture session as persisted locally.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Local session id.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Topology key.
    pub template_key: String,
    /// Laps required to complete the run.
    pub laps_required: u32,
    /// Accepted runner-id shape.
    pub runner_id_format: RunnerIdFormat,
    /// Enforcement override.
    pub enforcement: Option<Enforcement>,
    /// Uniform scan-gap override in milliseconds.
    pub scan_gap_ms: Option<i64>,
    /// Global start time, if one was recorded.
    pub global_start_ms: Option<i64>,
    /// Bearer credential for the remote.
    pub credential: Option<String>,
    /// Session id on the remote.
    pub remote_session_id: Option<String>,
    /// Run configuration id on the remote.
    pub run_config_id: Option<String>,
    /// Highest capture time pulled from the remote.
    pub pull_watermark_ms: i64,
    /// Capture time of the newest CLEAR_ALL applied from the remote.
    pub reset_watermark_ms: i64,
    /// Creation time.
    pub created_at_ms: i64,
}

impl SessionRecord {
    /// A new unpaired session.
    pub fn new(
        name: impl Into<String>,
        template_key: impl Into<String>,
        laps_required: u32,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            template_key: template_key.into(),
            laps_required,
            runner_id_format: RunnerIdFormat::Any,
            enforcement: None,
            scan_gap_ms: None,
            global_start_ms: None,
            credential: None,
            remote_session_id: None,
            run_config_id: None,
            pull_watermark_ms: 0,
            reset_watermark_ms: 0,
            created_at_ms: crate::now_ms(),
        }
    }

    /// A session paired through a resolved pairing token.
    ///
    /// An unrecognised enforcement name is ignored and the template default
    /// applies.
    pub fn from_resolution(resolution: &TokenResolution, credential: impl Into<String>) -> Self {
        let name = resolution
            .name
            .clone()
            .unwrap_or_else(|| resolution.template_key.clone());
        let mut record = Self::new(
            name,
            resolution.template_key.clone(),
            resolution.laps_required,
        );
        record.enforcement = resolution
            .enforcement
            .as_deref()
            .and_then(|raw| raw.parse().ok());
        record.scan_gap_ms = resolution.scan_gap_ms;
        record.credential = Some(credential.into());
        record.remote_session_id = Some(resolution.session_id.clone());
        record.run_config_id = Some(resolution.run_config_id.clone());
        record
    }

    /// Resolved topology.
    pub fn template(&self) -> TemplateKey {
        TemplateKey::parse(&self.template_key)
    }

    /// Session settings as template overrides.
    pub fn overrides(&self) -> TemplateOverrides {
        TemplateOverrides {
            enforcement: self.enforcement,
            scan_gap_ms: self.scan_gap_ms,
            global_start_ms: self.global_start_ms,
            ..Default::default()
        }
    }

    /// The config this session's log is folded under.
    pub fn template_config(&self) -> RunTemplateConfig {
        RunTemplateConfig::resolve(self.template(), self.laps_required)
            .with_overrides(&self.overrides())
    }

    /// Whether the session can sync.
    pub fn is_paired(&self) -> bool {
        self.credential.is_some()
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("template_key", &self.template_key)
            .field("laps_required", &self.laps_required)
            .field("runner_id_format", &self.runner_id_format)
            .field("enforcement", &self.enforcement)
            .field("scan_gap_ms", &self.scan_gap_ms)
            .field("global_start_ms", &self.global_start_ms)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("remote_session_id", &self.remote_session_id)
            .field("run_config_id", &self.run_config_id)
            .field("pull_watermark_ms", &self.pull_watermark_ms)
            .field("reset_watermark_ms", &self.reset_watermark_ms)
            .finish()
    }
}

/// Trait for local event store backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert or replace a session record.
    async fn save_session(&self, session: &SessionRecord) -> StoreResult<()>;

    /// Get a session record by id.
    async fn session(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>>;

    /// List all sessions, oldest first.
    async fn sessions(&self) -> StoreResult<Vec<SessionRecord>>;

    /// Raise the session's pull and reset watermarks. Lower values are ignored.
    async fn advance_watermarks(
        &self,
        id: &SessionId,
        pull_watermark_ms: i64,
        reset_watermark_ms: i64,
    ) -> StoreResult<()>;

    /// Append a locally captured event.
    ///
    /// Returns false if an event with the same id already exists; the
    /// existing row is left untouched.
    async fn append(&self, session_id: &SessionId, event: &RunEvent) -> StoreResult<bool>;

    /// Insert or replace remote events by id, marked synced with origin remote.
    ///
    /// Returns the number of events written.
    async fn upsert_remote(
        &self,
        session_id: &SessionId,
        events: &[RunEvent],
        synced_at_ms: i64,
    ) -> StoreResult<usize>;

    /// All events of a session, ordered by `(captured_at_ms, id)`.
    async fn events(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>>;

    /// All events of a session with housekeeping, ordered like [`EventStore::events`].
    async fn stored_events(&self, session_id: &SessionId) -> StoreResult<Vec<StoredEvent>>;

    /// Events captured in `[from_ms, to_ms)`, ordered like [`EventStore::events`].
    async fn events_in_range(
        &self,
        session_id: &SessionId,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<RunEvent>>;

    /// Look up one event by id.
    async fn event(&self, id: &EventId) -> StoreResult<Option<StoredEvent>>;

    /// Events not yet acknowledged by the remote, ordered like [`EventStore::events`].
    async fn unsynced(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>>;

    /// Mark events synced. Returns the number of rows changed.
    async fn mark_synced(&self, ids: &[EventId], synced_at_ms: i64) -> StoreResult<u64>;

    /// Delete every event of a session. Returns the number of rows deleted.
    async fn delete_session_events(&self, session_id: &SessionId) -> StoreResult<u64>;

    /// Delete a session's log for a remote reset at `reset_at_ms`.
    ///
    /// Unsynced events captured after the reset survive; they have not
    /// reached the remote yet. Returns the number of rows deleted.
    async fn wipe_for_reset(&self, session_id: &SessionId, reset_at_ms: i64) -> StoreResult<u64>;
}
