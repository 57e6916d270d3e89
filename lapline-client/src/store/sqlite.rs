//! SQLite store backend for lapline-client.

use super::{EventStore, Origin, SessionRecord, StoredEvent};
use crate::error::{StoreError, StoreResult};
use crate::session::RunnerIdFormat;
use async_trait::async_trait;
use lapline_core::Enforcement;
use lapline_types::{EventId, EventType, RunEvent, RunnerId, SessionId, StationId};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;

const EVENT_COLUMNS: &str = "id, session_id, runner_id, station_id, event_type, captured_at_ms, \
                             ref_event_id, synced_at_ms, origin";

const SESSION_COLUMNS: &str = "id, name, template_key, laps_required, runner_id_format, \
                               enforcement, scan_gap_ms, global_start_ms, credential, \
                               remote_session_id, run_config_id, pull_watermark_ms, \
                               reset_watermark_ms, created_at_ms";

/// SQLite-based event store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// A single connection that never expires, so the database lives as long
    /// as the store.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                template_key TEXT NOT NULL,
                laps_required INTEGER NOT NULL,
                runner_id_format TEXT NOT NULL,
                enforcement TEXT,
                scan_gap_ms INTEGER,
                global_start_ms INTEGER,
                credential TEXT,
                remote_session_id TEXT,
                run_config_id TEXT,
                pull_watermark_ms INTEGER NOT NULL DEFAULT 0,
                reset_watermark_ms INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                runner_id TEXT NOT NULL,
                station_id TEXT,
                event_type TEXT NOT NULL,
                captured_at_ms INTEGER NOT NULL,
                ref_event_id TEXT,
                synced_at_ms INTEGER,
                origin TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_session_captured \
             ON events(session_id, captured_at_ms, id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_session_synced \
             ON events(session_id, synced_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_events(
        &self,
        sql: &str,
        session_id: &SessionId,
    ) -> StoreResult<Vec<StoredEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(sql)
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredEvent::try_from).collect()
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn save_session(&self, session: &SessionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, name, template_key, laps_required, runner_id_format, enforcement,
                scan_gap_ms, global_start_ms, credential, remote_session_id, run_config_id,
                pull_watermark_ms, reset_watermark_ms, created_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                template_key = excluded.template_key,
                laps_required = excluded.laps_required,
                runner_id_format = excluded.runner_id_format,
                enforcement = excluded.enforcement,
                scan_gap_ms = excluded.scan_gap_ms,
                global_start_ms = excluded.global_start_ms,
                credential = excluded.credential,
                remote_session_id = excluded.remote_session_id,
                run_config_id = excluded.run_config_id,
                pull_watermark_ms = MAX(pull_watermark_ms, excluded.pull_watermark_ms),
                reset_watermark_ms = MAX(reset_watermark_ms, excluded.reset_watermark_ms)
            "#,
        )
        .bind(session.id.as_str())
        .bind(&session.name)
        .bind(&session.template_key)
        .bind(i64::from(session.laps_required))
        .bind(session.runner_id_format.as_str())
        .bind(session.enforcement.map(|e| e.as_str()))
        .bind(session.scan_gap_ms)
        .bind(session.global_start_ms)
        .bind(session.credential.as_deref())
        .bind(session.remote_session_id.as_deref())
        .bind(session.run_config_id.as_deref())
        .bind(session.pull_watermark_ms)
        .bind(session.reset_watermark_ms)
        .bind(session.created_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn session(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn sessions(&self) -> StoreResult<Vec<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at_ms, id");
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    async fn advance_watermarks(
        &self,
        id: &SessionId,
        pull_watermark_ms: i64,
        reset_watermark_ms: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET pull_watermark_ms = MAX(pull_watermark_ms, ?2),
                reset_watermark_ms = MAX(reset_watermark_ms, ?3)
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .bind(pull_watermark_ms)
        .bind(reset_watermark_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append(&self, session_id: &SessionId, event: &RunEvent) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (
                id, session_id, runner_id, station_id, event_type, captured_at_ms,
                ref_event_id, synced_at_ms, origin
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(event.id.as_str())
        .bind(session_id.as_str())
        .bind(event.runner_id.as_str())
        .bind(event.station_id.as_ref().map(StationId::as_str))
        .bind(event.event_type.as_str())
        .bind(event.captured_at_ms)
        .bind(event.target_id.as_ref().map(EventId::as_str))
        .bind(Origin::Local.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_remote(
        &self,
        session_id: &SessionId,
        events: &[RunEvent],
        synced_at_ms: i64,
    ) -> StoreResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    id, session_id, runner_id, station_id, event_type, captured_at_ms,
                    ref_event_id, synced_at_ms, origin
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    session_id = excluded.session_id,
                    runner_id = excluded.runner_id,
                    station_id = excluded.station_id,
                    event_type = excluded.event_type,
                    captured_at_ms = excluded.captured_at_ms,
                    ref_event_id = excluded.ref_event_id,
                    synced_at_ms = excluded.synced_at_ms,
                    origin = excluded.origin
                "#,
            )
            .bind(event.id.as_str())
            .bind(session_id.as_str())
            .bind(event.runner_id.as_str())
            .bind(event.station_id.as_ref().map(StationId::as_str))
            .bind(event.event_type.as_str())
            .bind(event.captured_at_ms)
            .bind(event.target_id.as_ref().map(EventId::as_str))
            .bind(synced_at_ms)
            .bind(Origin::Remote.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(events.len())
    }

    async fn events(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>> {
        let stored = self.stored_events(session_id).await?;
        Ok(stored.into_iter().map(|s| s.event).collect())
    }

    async fn stored_events(&self, session_id: &SessionId) -> StoreResult<Vec<StoredEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 \
             ORDER BY captured_at_ms ASC, id ASC"
        );
        self.fetch_events(&sql, session_id).await
    }

    async fn events_in_range(
        &self,
        session_id: &SessionId,
        from_ms: i64,
        to_ms: i64,
    ) -> StoreResult<Vec<RunEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE session_id = ?1 AND captured_at_ms >= ?2 AND captured_at_ms < ?3 \
             ORDER BY captured_at_ms ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(session_id.as_str())
            .bind(from_ms)
            .bind(to_ms)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| StoredEvent::try_from(row).map(|s| s.event))
            .collect()
    }

    async fn event(&self, id: &EventId) -> StoreResult<Option<StoredEvent>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredEvent::try_from).transpose()
    }

    async fn unsynced(&self, session_id: &SessionId) -> StoreResult<Vec<RunEvent>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE session_id = ?1 AND synced_at_ms IS NULL \
             ORDER BY captured_at_ms ASC, id ASC"
        );
        let stored = self.fetch_events(&sql, session_id).await?;
        Ok(stored.into_iter().map(|s| s.event).collect())
    }

    async fn mark_synced(&self, ids: &[EventId], synced_at_ms: i64) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for id in ids {
            let result = sqlx::query(
                "UPDATE events SET synced_at_ms = ?2 WHERE id = ?1 AND synced_at_ms IS NULL",
            )
            .bind(id.as_str())
            .bind(synced_at_ms)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn delete_session_events(&self, session_id: &SessionId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM events WHERE session_id = ?1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn wipe_for_reset(&self, session_id: &SessionId, reset_at_ms: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM events
             WHERE session_id = ?1
               AND NOT (synced_at_ms IS NULL AND captured_at_ms > ?2)",
        )
        .bind(session_id.as_str())
        .bind(reset_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for event queries.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    session_id: String,
    runner_id: String,
    station_id: Option<String>,
    event_type: String,
    captured_at_ms: i64,
    ref_event_id: Option<String>,
    synced_at_ms: Option<i64>,
    origin: String,
}

impl TryFrom<EventRow> for StoredEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(StoredEvent {
            origin: row.origin.parse()?,
            event: RunEvent {
                id: EventId::from(row.id),
                runner_id: RunnerId::new(row.runner_id),
                station_id: row.station_id.map(StationId::from),
                event_type: EventType::from(row.event_type),
                captured_at_ms: row.captured_at_ms,
                target_id: row.ref_event_id.map(EventId::from),
            },
            session_id: SessionId::from(row.session_id),
            synced_at_ms: row.synced_at_ms,
        })
    }
}

/// Internal row type for session queries.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    name: String,
    template_key: String,
    laps_required: i64,
    runner_id_format: String,
    enforcement: Option<String>,
    scan_gap_ms: Option<i64>,
    global_start_ms: Option<i64>,
    credential: Option<String>,
    remote_session_id: Option<String>,
    run_config_id: Option<String>,
    pull_watermark_ms: i64,
    reset_watermark_ms: i64,
    created_at_ms: i64,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| StoreError::InvalidRow {
            table: "sessions",
            reason,
        };

        let laps_required = u32::try_from(row.laps_required)
            .map_err(|_| invalid(format!("laps_required out of range: {}", row.laps_required)))?;
        let runner_id_format = RunnerIdFormat::parse(&row.runner_id_format).ok_or_else(|| {
            invalid(format!("unknown runner_id_format {:?}", row.runner_id_format))
        })?;
        let enforcement = row
            .enforcement
            .map(|raw| raw.parse::<Enforcement>())
            .transpose()
            .map_err(|e| invalid(format!("{e}")))?;

        Ok(SessionRecord {
            id: SessionId::from(row.id),
            name: row.name,
            template_key: row.template_key,
            laps_required,
            runner_id_format,
            enforcement,
            scan_gap_ms: row.scan_gap_ms,
            global_start_ms: row.global_start_ms,
            credential: row.credential,
            remote_session_id: row.remote_session_id,
            run_config_id: row.run_config_id,
            pull_watermark_ms: row.pull_watermark_ms,
            reset_watermark_ms: row.reset_watermark_ms,
            created_at_ms: row.created_at_ms,
        })
    }
}
