//! Sync lane state machine for lapline.
//!
//! This module provides a pure, side-effect-free state machine for the
//! push/pull cycle. The state machine takes events as input and produces a
//! new state plus a list of actions to execute.
//!
//! The actual I/O (reading the store, calling the remote) is performed by
//! lapline-client, not by this module.
//!
//! Push and pull are independent lanes. The push lane is guarded: a tick that
//! arrives while a push is in flight produces no action. The pull lane has no
//! guard, so overlapping pulls are allowed and merely counted.

/// Push lane state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneState {
    /// No operation outstanding.
    #[default]
    Idle,
    /// An operation has been started and has not settled yet.
    InFlight,
}

/// Sync state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncState {
    /// Push lane.
    pub push: LaneState,
    /// Number of pulls started and not yet settled.
    pub pulls_in_flight: u32,
    /// Set once a stop was requested; ticks are ignored afterwards.
    pub stopped: bool,
}

impl SyncState {
    /// Create a new state machine with both lanes idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// Settle events are always accepted, even after a stop: an operation
    /// already in flight runs to completion and its result is still reported.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match event {
            Event::PushTick => {
                if self.stopped || self.push == LaneState::InFlight {
                    return (self, vec![]);
                }
                (
                    Self {
                        push: LaneState::InFlight,
                        ..self
                    },
                    vec![Action::Push],
                )
            }
            Event::PushSettled { outcome } => {
                let emitted = match outcome {
                    PushOutcome::Nothing => vec![],
                    PushOutcome::Delivered { accepted, pending } => {
                        vec![Action::EmitEvent(SyncEvent::Pushed { accepted, pending })]
                    }
                    PushOutcome::Failed { error } => {
                        vec![Action::EmitEvent(SyncEvent::PushFailed { error })]
                    }
                };
                (
                    Self {
                        push: LaneState::Idle,
                        ..self
                    },
                    emitted,
                )
            }
            Event::PullTick => {
                if self.stopped {
                    return (self, vec![]);
                }
                (
                    Self {
                        pulls_in_flight: self.pulls_in_flight.saturating_add(1),
                        ..self
                    },
                    vec![Action::Pull],
                )
            }
            Event::PullSettled { outcome } => {
                let emitted = match outcome {
                    PullOutcome::Applied { count, reset } => {
                        if count == 0 && !reset {
                            vec![]
                        } else {
                            vec![Action::EmitEvent(SyncEvent::Pulled { count, reset })]
                        }
                    }
                    PullOutcome::Failed { error } => {
                        vec![Action::EmitEvent(SyncEvent::PullFailed { error })]
                    }
                };
                (
                    Self {
                        pulls_in_flight: self.pulls_in_flight.saturating_sub(1),
                        ..self
                    },
                    emitted,
                )
            }
            Event::StopRequested => {
                if self.stopped {
                    return (self, vec![]);
                }
                (
                    Self {
                        stopped: true,
                        ..self
                    },
                    vec![Action::EmitEvent(SyncEvent::Stopped)],
                )
            }
        }
    }

    /// Check if a push is currently in flight.
    pub fn is_pushing(&self) -> bool {
        self.push == LaneState::InFlight
    }

    /// Check if any operation is outstanding.
    pub fn is_busy(&self) -> bool {
        self.is_pushing() || self.pulls_in_flight > 0
    }
}

/// Events that drive the sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Push timer fired.
    PushTick,
    /// A push finished.
    PushSettled {
        /// How it ended.
        outcome: PushOutcome,
    },
    /// Pull timer fired.
    PullTick,
    /// A pull finished.
    PullSettled {
        /// How it ended.
        outcome: PullOutcome,
    },
    /// Teardown requested.
    StopRequested,
}

/// Result of one push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No unsynced events; nothing was sent.
    Nothing,
    /// The remote answered.
    Delivered {
        /// Events marked synced.
        accepted: usize,
        /// Events left pending for the next tick.
        pending: usize,
    },
    /// Transport or store failure; every event stays pending.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

/// Result of one pull attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Pulled events were merged.
    Applied {
        /// Number of events upserted.
        count: usize,
        /// Whether the session log was wiped by a newer CLEAR_ALL.
        reset: bool,
    },
    /// Transport or store failure.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

/// Actions to be executed by lapline-client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Push unsynced events.
    Push,
    /// Pull events after the watermark.
    Pull,
    /// Emit an event to the application.
    EmitEvent(SyncEvent),
}

/// Events emitted to the application layer.
///
/// Observers re-derive standings on `Pushed` or `Pulled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A push batch was answered.
    Pushed {
        /// Events marked synced.
        accepted: usize,
        /// Events left pending.
        pending: usize,
    },
    /// A push failed.
    PushFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// New remote events were merged.
    Pulled {
        /// Number of events upserted.
        count: usize,
        /// Whether the local session log was wiped first.
        reset: bool,
    },
    /// A pull failed.
    PullFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The sync loop stopped.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = SyncState::new();
        assert_eq!(state.push, LaneState::Idle);
        assert_eq!(state.pulls_in_flight, 0);
        assert!(!state.is_busy());
    }

    #[test]
    fn push_tick_starts_push() {
        let (state, actions) = SyncState::new().on_event(Event::PushTick);

        assert!(state.is_pushing());
        assert_eq!(actions, vec![Action::Push]);
    }

    #[test]
    fn push_tick_while_in_flight_is_ignored() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, actions) = state.on_event(Event::PushTick);

        assert!(state.is_pushing());
        assert!(actions.is_empty());
    }

    #[test]
    fn push_settle_returns_to_idle_and_reports() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, actions) = state.on_event(Event::PushSettled {
            outcome: PushOutcome::Delivered {
                accepted: 3,
                pending: 1,
            },
        });

        assert!(!state.is_pushing());
        assert_eq!(
            actions,
            vec![Action::EmitEvent(SyncEvent::Pushed {
                accepted: 3,
                pending: 1
            })]
        );
    }

    #[test]
    fn empty_push_emits_nothing() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, actions) = state.on_event(Event::PushSettled {
            outcome: PushOutcome::Nothing,
        });

        assert!(!state.is_pushing());
        assert!(actions.is_empty());
    }

    #[test]
    fn failed_push_allows_retry_on_next_tick() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, actions) = state.on_event(Event::PushSettled {
            outcome: PushOutcome::Failed {
                error: "connection refused".into(),
            },
        });
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(SyncEvent::PushFailed { .. }))));

        let (_, actions) = state.on_event(Event::PushTick);
        assert_eq!(actions, vec![Action::Push]);
    }

    #[test]
    fn pulls_are_not_guarded() {
        let (state, first) = SyncState::new().on_event(Event::PullTick);
        let (state, second) = state.on_event(Event::PullTick);

        assert_eq!(first, vec![Action::Pull]);
        assert_eq!(second, vec![Action::Pull]);
        assert_eq!(state.pulls_in_flight, 2);
    }

    #[test]
    fn pull_and_push_interleave() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, actions) = state.on_event(Event::PullTick);

        assert_eq!(actions, vec![Action::Pull]);
        assert!(state.is_pushing());
        assert_eq!(state.pulls_in_flight, 1);
    }

    #[test]
    fn quiet_pull_emits_nothing() {
        let (state, _) = SyncState::new().on_event(Event::PullTick);
        let (state, actions) = state.on_event(Event::PullSettled {
            outcome: PullOutcome::Applied {
                count: 0,
                reset: false,
            },
        });

        assert!(actions.is_empty());
        assert!(!state.is_busy());
    }

    #[test]
    fn pull_with_reset_is_reported() {
        let (state, _) = SyncState::new().on_event(Event::PullTick);
        let (_, actions) = state.on_event(Event::PullSettled {
            outcome: PullOutcome::Applied {
                count: 1,
                reset: true,
            },
        });

        assert_eq!(
            actions,
            vec![Action::EmitEvent(SyncEvent::Pulled {
                count: 1,
                reset: true
            })]
        );
    }

    #[test]
    fn stop_suppresses_ticks() {
        let (state, actions) = SyncState::new().on_event(Event::StopRequested);
        assert_eq!(actions, vec![Action::EmitEvent(SyncEvent::Stopped)]);

        let (state, push) = state.on_event(Event::PushTick);
        let (_, pull) = state.on_event(Event::PullTick);
        assert!(push.is_empty());
        assert!(pull.is_empty());
    }

    #[test]
    fn in_flight_push_settles_after_stop() {
        let (state, _) = SyncState::new().on_event(Event::PushTick);
        let (state, _) = state.on_event(Event::StopRequested);
        let (state, actions) = state.on_event(Event::PushSettled {
            outcome: PushOutcome::Delivered {
                accepted: 1,
                pending: 0,
            },
        });

        assert!(!state.is_pushing());
        assert!(state.stopped);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn second_stop_is_silent() {
        let (state, _) = SyncState::new().on_event(Event::StopRequested);
        let (_, actions) = state.on_event(Event::StopRequested);
        assert!(actions.is_empty());
    }

    #[test]
    fn stray_pull_settle_does_not_underflow() {
        let (state, _) = SyncState::new().on_event(Event::PullSettled {
            outcome: PullOutcome::Failed {
                error: "late".into(),
            },
        });
        assert_eq!(state.pulls_in_flight, 0);
    }
}
