//! Error types for lapline-client.

use lapline_types::TypeError;

use crate::config::ConfigError;

/// Main error type for lapline-client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Remote API error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No session with this id in the local store.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The missing session id.
        session_id: String,
    },

    /// The session has no pairing credential, so it cannot sync.
    #[error("session {session_id} is not paired with a remote")]
    NotPaired {
        /// The unpaired session id.
        session_id: String,
    },

    /// No remote base URL configured.
    #[error("no remote configured (set [remote] base_url)")]
    NoRemote,

    /// Runner id rejected at the capture boundary.
    #[error("invalid runner id {runner_id:?}: expected {expected}")]
    InvalidRunnerId {
        /// The rejected input.
        runner_id: String,
        /// The expected format.
        expected: &'static str,
    },

    /// UNDO target not found in this session.
    #[error("no event {event_id} in this session")]
    UnknownEvent {
        /// The missing event id.
        event_id: String,
    },

    /// The event cannot be retracted.
    #[error("cannot undo {event_id}: {reason}")]
    CannotUndo {
        /// The target event id.
        event_id: String,
        /// Why it was refused.
        reason: String,
    },

    /// No capture left to retract for this runner.
    #[error("nothing to undo for runner {runner_id}")]
    NothingToUndo {
        /// The runner id.
        runner_id: String,
    },
}

/// Local store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back to a domain value.
    #[error("invalid row in {table}: {reason}")]
    InvalidRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Remote API errors.
///
/// Every variant leaves local events pending; the next tick retries.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Could not reach the remote.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Remote answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Other HTTP failure.
    #[error("http error: {0}")]
    Http(String),

    /// Request body could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] TypeError),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_connect() {
            RemoteError::ConnectionFailed(e.to_string())
        } else {
            RemoteError::Http(e.to_string())
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
