//! Push acknowledgement resolution.
//!
//! Decides which events of a pushed batch are marked synced from the remote's
//! answer. Ids absent from the batch are ignored; pending ids are retried on
//! the next push.

use lapline_types::{EventId, IngestResponse};
use std::collections::HashSet;

/// Accepted and pending ids of one pushed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Ids to mark synced.
    pub accepted: Vec<EventId>,
    /// Ids that stay unsynced.
    pub pending: Vec<EventId>,
}

/// Resolve the remote answer against the ids that were sent.
///
/// - neither list present: the whole batch is accepted
/// - `acceptedIds` present: exactly those are accepted
/// - only `failedIds` present: everything but those is accepted
pub fn resolve_ingest(batch: &[EventId], response: &IngestResponse) -> IngestOutcome {
    let accepted_set: HashSet<&EventId> = match (&response.accepted_ids, &response.failed_ids) {
        (None, None) => batch.iter().collect(),
        (Some(accepted), _) => accepted.iter().collect(),
        (None, Some(failed)) => {
            let failed: HashSet<&EventId> = failed.iter().collect();
            batch.iter().filter(|id| !failed.contains(id)).collect()
        }
    };

    let (accepted, pending): (Vec<EventId>, Vec<EventId>) = batch
        .iter()
        .cloned()
        .partition(|id| accepted_set.contains(id));
    IngestOutcome { accepted, pending }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<EventId> {
        raw.iter().map(|id| EventId::from(*id)).collect()
    }

    #[test]
    fn bare_response_accepts_batch() {
        let outcome = resolve_ingest(&ids(&["a", "b"]), &IngestResponse::default());
        assert_eq!(outcome.accepted, ids(&["a", "b"]));
        assert!(outcome.pending.is_empty());
    }

    #[test]
    fn accepted_list_is_authoritative() {
        let response = IngestResponse {
            accepted_ids: Some(ids(&["a", "zzz"])),
            ..Default::default()
        };
        let outcome = resolve_ingest(&ids(&["a", "b", "c"]), &response);

        assert_eq!(outcome.accepted, ids(&["a"]));
        assert_eq!(outcome.pending, ids(&["b", "c"]));
    }

    #[test]
    fn failed_list_alone_keeps_failures_pending() {
        let response = IngestResponse {
            failed_ids: Some(ids(&["b"])),
            ..Default::default()
        };
        let outcome = resolve_ingest(&ids(&["a", "b", "c"]), &response);

        assert_eq!(outcome.accepted, ids(&["a", "c"]));
        assert_eq!(outcome.pending, ids(&["b"]));
    }

    #[test]
    fn both_lists_follow_accepted() {
        let response = IngestResponse {
            accepted_ids: Some(ids(&["a"])),
            failed_ids: Some(ids(&["b"])),
            error: Some("partial".into()),
        };
        let outcome = resolve_ingest(&ids(&["a", "b", "c"]), &response);

        assert_eq!(outcome.accepted, ids(&["a"]));
        assert_eq!(outcome.pending, ids(&["b", "c"]));
    }

    #[test]
    fn empty_batch() {
        let outcome = resolve_ingest(&[], &IngestResponse::default());
        assert_eq!(outcome, IngestOutcome::default());
    }
}
