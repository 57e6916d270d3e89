//! Full replay of an event log into per-runner derived state.
//!
//! Replay is filter-then-fold: retracted events are dropped, the rest are
//! ordered by `(captured_at_ms, id)` and folded per runner. The id tiebreak
//! makes equal-timestamp events fold identically on every replica, so any two
//! replicas holding the same set of events derive identical state no matter
//! in which order the events arrived.

use lapline_types::{EventType, RunEvent, RunnerId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::effective::effective_events;
use crate::reducer::RunnerState;
use crate::template::RunTemplateConfig;

/// Canonical replay order.
pub fn replay_order(a: &RunEvent, b: &RunEvent) -> Ordering {
    a.captured_at_ms
        .cmp(&b.captured_at_ms)
        .then_with(|| a.id.cmp(&b.id))
}

/// Effective events sorted in replay order.
pub fn ordered_effective(events: &[RunEvent]) -> Vec<&RunEvent> {
    let mut effective = effective_events(events);
    effective.sort_by(|a, b| replay_order(a, b));
    effective
}

fn applies_to(event: &RunEvent, runner: &RunnerId) -> bool {
    event.event_type == EventType::ClearAll || event.runner_id == *runner
}

/// Derive one runner's state from the whole session log.
pub fn derive_runner(
    events: &[RunEvent],
    runner: &RunnerId,
    config: &RunTemplateConfig,
) -> RunnerState {
    ordered_effective(events)
        .into_iter()
        .filter(|event| applies_to(event, runner))
        .fold(RunnerState::initial(), |state, event| state.apply(event, config))
}

/// Derive every runner's state from the whole session log.
///
/// CLEAR_ALL events are folded into every runner's stream.
pub fn derive_standings(
    events: &[RunEvent],
    config: &RunTemplateConfig,
) -> BTreeMap<RunnerId, RunnerState> {
    let ordered = ordered_effective(events);

    let mut streams: BTreeMap<RunnerId, Vec<&RunEvent>> = BTreeMap::new();
    for event in &ordered {
        if event.event_type != EventType::ClearAll && !event.runner_id.is_all() {
            streams.entry(event.runner_id.clone()).or_default();
        }
    }

    for event in ordered {
        if event.event_type == EventType::ClearAll {
            for stream in streams.values_mut() {
                stream.push(event);
            }
        } else if let Some(stream) = streams.get_mut(&event.runner_id) {
            stream.push(event);
        }
    }

    streams
        .into_iter()
        .map(|(runner, stream)| {
            let state = stream
                .into_iter()
                .fold(RunnerState::initial(), |state, event| state.apply(event, config));
            (runner, state)
        })
        .collect()
}
