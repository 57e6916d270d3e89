//! Effective-log filter.
//!
//! Removes every event targeted by an UNDO tombstone. The tombstones stay in
//! the collection and fold as no-ops, so the reducer never has to look ahead.

use lapline_types::{EventId, RunEvent};
use std::collections::HashSet;

/// Ids referenced by UNDO events in `events`.
pub fn retracted_ids<'a, I>(events: I) -> HashSet<&'a EventId>
where
    I: IntoIterator<Item = &'a RunEvent>,
{
    events
        .into_iter()
        .filter(|event| event.is_undo())
        .filter_map(|event| event.target_id.as_ref())
        .collect()
}

/// The events of `events` that are not retracted, in their original order.
pub fn effective_events(events: &[RunEvent]) -> Vec<&RunEvent> {
    let retracted = retracted_ids(events);
    events
        .iter()
        .filter(|event| !retracted.contains(&event.id))
        .collect()
}

/// Owned variant of [`effective_events`].
pub fn into_effective(events: Vec<RunEvent>) -> Vec<RunEvent> {
    let retracted: HashSet<EventId> = retracted_ids(&events).into_iter().cloned().collect();
    events
        .into_iter()
        .filter(|event| !retracted.contains(&event.id))
        .collect()
}
