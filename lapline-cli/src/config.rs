//! Configuration management for lapline.
//!
//! Everything lives in the data directory:
//! - `lapline.toml`: client configuration (remote, sync timers, database)
//! - `lapline.db`: the local event store
//! - `active-session.json`: which session capture commands write to

use anyhow::{Context, Result};
use lapline_client::{now_ms, ClientConfig, RaceSession, SqliteStore};
use lapline_types::SessionId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Client configuration file name.
pub const CONFIG_FILE: &str = "lapline.toml";

const ACTIVE_SESSION_FILE: &str = "active-session.json";

/// The session capture commands write to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Local session id.
    pub session_id: String,
    /// When the session was selected.
    pub selected_at_ms: i64,
}

impl ActiveSession {
    /// Select a session.
    pub fn new(session_id: &SessionId) -> Self {
        Self {
            session_id: session_id.to_string(),
            selected_at_ms: now_ms(),
        }
    }

    /// Typed session id.
    pub fn id(&self) -> SessionId {
        SessionId::from(self.session_id.as_str())
    }

    /// Load the active session from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(ACTIVE_SESSION_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("No active session. Run 'lapline init' first.")?;
        serde_json::from_str(&contents).context("Invalid active session file")
    }

    /// Save the active session to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(ACTIVE_SESSION_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save active session")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if a session is selected.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join(ACTIVE_SESSION_FILE).exists()
    }
}

/// Client configuration, local store and active session of a data directory.
pub struct Workspace {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Client configuration.
    pub config: ClientConfig,
    /// Local event store.
    pub store: Arc<SqliteStore>,
}

impl Workspace {
    /// Load configuration and open the local store.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let config = ClientConfig::load_or_default(&data_dir.join(CONFIG_FILE))
            .context("Failed to load lapline.toml")?;
        let database = config.storage.database_path(data_dir);
        let store = SqliteStore::new(&database)
            .await
            .with_context(|| format!("Failed to open database {}", database.display()))?;
        set_file_permissions_0600(&database).await?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            store: Arc::new(store),
        })
    }

    /// Open the active session.
    pub async fn active_session(&self) -> Result<RaceSession<SqliteStore>> {
        let active = ActiveSession::load(&self.data_dir).await?;
        RaceSession::open(self.store.clone(), &active.id())
            .await
            .context("Active session is missing from the database")
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
