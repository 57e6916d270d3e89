//! # lapline-client
//!
//! Offline-first capture and sync for lapline race timing.
//!
//! Devices capture scans into a local event log and reconcile it with a
//! remote authority in the background. Runner standings are never stored;
//! they are re-derived from the log with `lapline-core`.
//!
//! ## Features
//!
//! - **Local Event Store**: SQLite (WAL) or in-memory, keyed by event id
//! - **Remote Abstraction**: Pluggable remote (HTTP, mock)
//! - **Sync Engine**: Independent push and pull timers with an in-flight push guard
//! - **Pure State Machine**: Uses lapline-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use lapline_client::{HttpRemote, RaceSession, SessionRecord, SqliteStore, SyncEngine};
//!
//! let store = Arc::new(SqliteStore::new(Path::new("lapline.db")).await?);
//! let session = RaceSession::create(store.clone(), record).await?;
//! session.scan("42", StationId::LapEnd, now_ms()).await?;
//!
//! let remote = Arc::new(HttpRemote::from_config(&config.remote)?);
//! let engine = SyncEngine::new(store, remote, session.id().clone());
//! let handle = engine.spawn(config.sync.push_interval(), config.sync.pull_interval());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod remote;
pub mod session;
pub mod store;

pub use config::{ClientConfig, ConfigError, RemoteConfig, StorageConfig, SyncConfig};
pub use engine::{PullReport, PushReport, SyncEngine, SyncHandle, SyncReport};
pub use error::{ClientError, RemoteError, Result, StoreError, StoreResult};
pub use remote::{HttpRemote, MockRemote, Remote};
pub use session::{RaceSession, RunnerIdFormat};
pub use store::{EventStore, MemoryStore, Origin, SessionRecord, SqliteStore, StoredEvent};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
