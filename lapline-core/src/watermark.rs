//! Pull watermark tracking for lapline.
//!
//! The watermark is the highest `captured_at_ms` a replica has incorporated
//! from the remote. The next pull asks only for events strictly after it.
//!
//! A second watermark tracks the newest CLEAR_ALL applied locally. A pulled
//! CLEAR_ALL newer than it wipes the local session log before the pulled
//! batch is merged, so pre-reset rows never coexist with post-reset ones.
//! Unsynced local captures newer than the reset are spared by the store.

use lapline_types::{EventType, RunEvent};

/// Highest capture time observed from the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(i64);

impl Watermark {
    /// A watermark before every event.
    pub fn new() -> Self {
        Self(0)
    }

    /// Resume from a persisted value.
    pub fn at(value: i64) -> Self {
        Self(value)
    }

    /// Current value in milliseconds.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Record a capture time. Returns true if the watermark advanced.
    pub fn observe(&mut self, captured_at_ms: i64) -> bool {
        if captured_at_ms > self.0 {
            self.0 = captured_at_ms;
            true
        } else {
            false
        }
    }
}

/// What to do with one pulled batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullPlan {
    /// Wipe the local session log up to `reset_watermark` before upserting.
    pub wipe_session: bool,
    /// Events to upsert, in the order received.
    pub upserts: Vec<RunEvent>,
    /// Pull watermark after the batch.
    pub watermark: Watermark,
    /// Reset watermark after the batch.
    pub reset_watermark: Watermark,
}

impl PullPlan {
    /// Whether the plan changes anything locally.
    pub fn is_empty(&self) -> bool {
        !self.wipe_session && self.upserts.is_empty()
    }
}

/// Plan the merge of a pulled batch.
pub fn plan_pull(
    events: Vec<RunEvent>,
    watermark: Watermark,
    reset_watermark: Watermark,
) -> PullPlan {
    let mut next = watermark;
    let mut next_reset = reset_watermark;
    let mut wipe_session = false;

    for event in &events {
        next.observe(event.captured_at_ms);
        if event.event_type == EventType::ClearAll && next_reset.observe(event.captured_at_ms) {
            wipe_session = true;
        }
    }

    PullPlan {
        wipe_session,
        upserts: events,
        watermark: next,
        reset_watermark: next_reset,
    }
}
