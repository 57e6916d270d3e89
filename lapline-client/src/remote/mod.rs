//! Remote authority abstraction for lapline.
//!
//! The remote holds the merged event log of every device paired to a
//! session. Devices push their unsynced events to it and pull what other
//! devices captured.
//!
//! # Design
//!
//! The remote trait is async and stateless:
//! - `ingest()` submits a batch and returns the per-id acknowledgement
//! - `events_since()` returns events captured strictly after a watermark
//!
//! Both calls authenticate with the session's pairing credential as a bearer
//! token. Delivery is at-least-once; the remote must dedupe by event id.

mod http;
mod mock;

pub use http::HttpRemote;
pub use mock::MockRemote;

use async_trait::async_trait;
use lapline_types::{IngestRequest, IngestResponse, RunEvent};

use crate::error::RemoteError;

/// Trait for remote authority backends.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Submit a batch of events (`POST /events/ingest`).
    ///
    /// A malformed success body is an empty response, which accepts the
    /// whole batch.
    async fn ingest(
        &self,
        credential: &str,
        request: &IngestRequest,
    ) -> Result<IngestResponse, RemoteError>;

    /// Fetch events captured after `since_ms` (`GET /events?since=`).
    ///
    /// A malformed success body yields no events.
    async fn events_since(
        &self,
        credential: &str,
        since_ms: i64,
    ) -> Result<Vec<RunEvent>, RemoteError>;
}
