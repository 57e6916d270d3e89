//! Runner state reducer.
//!
//! [`apply_event`] folds one event into a runner's derived state. It is a
//! total function: unexpected event shapes leave the state untouched, and
//! debounce rejections and enforcement outcomes are values, not errors.
//!
//! Retraction is not handled here. UNDO events are inert in the fold; the
//! events they target are removed beforehand by [`crate::effective`].

use lapline_types::{EventType, RunEvent, StationId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::template::{FinishRule, RunTemplateConfig, TemplateFlag};

/// Per-runner outcome flags. Additive; only CLEAR/CLEAR_ALL remove them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerFlag {
    /// A lap was counted with checkpoints missing (soft enforcement).
    SoftMissingCheckpoint,
    /// A lap was blocked because checkpoints were missing (strict enforcement).
    StrictMissingCheckpoint,
    /// A finish scan arrived before the lap minimum.
    EarlyFinish,
}

/// State derived for one runner by folding its event log.
///
/// Never persisted as a source of truth; always re-derivable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerState {
    /// Race start time.
    pub started_at_ms: Option<i64>,
    /// Race finish time.
    pub finished_at_ms: Option<i64>,
    /// Completed laps.
    pub lap_count: u32,
    /// Outcome flags.
    pub flags: BTreeSet<RunnerFlag>,
    /// Last accepted scan time per station, for debounce.
    pub last_seen_ms_at_station: BTreeMap<StationId, i64>,
    /// Checkpoints passed since the last lap boundary.
    pub checkpoints_seen: BTreeMap<StationId, bool>,
}

impl RunnerState {
    /// The empty initial state.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Whether a flag is set.
    pub fn has_flag(&self, flag: RunnerFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Whether a checkpoint has been passed in the current lap.
    pub fn has_seen(&self, station: &StationId) -> bool {
        self.checkpoints_seen.get(station).copied().unwrap_or(false)
    }

    /// Fold one event into this state.
    pub fn apply(self, event: &RunEvent, config: &RunTemplateConfig) -> Self {
        match event.event_type {
            EventType::Undo => return self,
            EventType::Clear | EventType::ClearAll => return Self::reset(config),
            _ => {}
        }

        let Some(station) = event.station_id.as_ref() else {
            return self;
        };
        let at = event.captured_at_ms;

        // Debounce against the last accepted scan; a rejected scan changes nothing.
        let gap = config.min_scan_gap_ms(station);
        if let Some(last) = self.last_seen_ms_at_station.get(station) {
            if at.saturating_sub(*last) < gap {
                return self;
            }
        }

        let mut state = self;
        state.last_seen_ms_at_station.insert(station.clone(), at);

        let mut start_triggering = false;
        if !config.global_start_active() && state.started_at_ms.is_none() {
            let triggers = match config.lap_start_station() {
                Some(lap_start) => *station == lap_start,
                None => *station == config.lap_counter_station(),
            };
            if triggers {
                state.started_at_ms = Some(at);
                start_triggering = true;
            }
        }

        if !matches!(event.event_type, EventType::Scan | EventType::StartSet) {
            return state;
        }

        if event.event_type == EventType::StartSet && *station == StationId::Start {
            state.started_at_ms = Some(at);
            return state;
        }

        if config.is_checkpoint(station) {
            state.checkpoints_seen.insert(station.clone(), true);
            return state;
        }

        if *station == config.lap_counter_station() {
            return state.count_lap(at, start_triggering, config);
        }

        if *station == StationId::Finish && config.station_order.contains(station) {
            return state.finish(at, config);
        }

        state
    }

    fn reset(config: &RunTemplateConfig) -> Self {
        let mut fresh = Self::initial();
        if config.global_start_active() {
            fresh.started_at_ms = config.global_start_ms;
        }
        fresh
    }

    fn count_lap(mut self, at: i64, start_triggering: bool, config: &RunTemplateConfig) -> Self {
        if start_triggering
            && config.lap_start_station().is_none()
            && config.has_flag(TemplateFlag::LapStartRequired)
        {
            self.checkpoints_seen.clear();
            return self;
        }

        let missing = config.checkpoints().any(|cp| !self.has_seen(cp));
        if missing {
            if config.has_flag(TemplateFlag::StrictEnforcement) {
                self.flags.insert(RunnerFlag::StrictMissingCheckpoint);
                return self;
            }
            if config.has_flag(TemplateFlag::SoftEnforcement) {
                self.flags.insert(RunnerFlag::SoftMissingCheckpoint);
            }
        }

        self.lap_count = self.lap_count.saturating_add(1);

        if config.finish_rule == Some(FinishRule::AtLapThreshold)
            && self.lap_count >= config.laps_required
        {
            self.finished_at_ms = Some(at);
        }

        self.checkpoints_seen.clear();
        self
    }

    fn finish(mut self, at: i64, config: &RunTemplateConfig) -> Self {
        match config.finish_min_laps() {
            Some(min_laps) if self.lap_count < min_laps => {
                self.flags.insert(RunnerFlag::EarlyFinish);
            }
            _ => self.finished_at_ms = Some(at),
        }
        self
    }
}

/// Fold one event into `state` under `config`.
pub fn apply_event(
    state: RunnerState,
    event: &RunEvent,
    config: &RunTemplateConfig,
) -> RunnerState {
    state.apply(event, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{resolve_template, StartRule, TemplateOverrides};
    use lapline_types::{EventId, RunnerId};

    fn runner() -> RunnerId {
        RunnerId::new("42")
    }

    fn scan(station: StationId, at: i64) -> RunEvent {
        RunEvent::scan(runner(), station, at)
    }

    fn fold(events: &[RunEvent], config: &RunTemplateConfig) -> RunnerState {
        events
            .iter()
            .fold(RunnerState::initial(), |state, event| apply_event(state, event, config))
    }

    #[test]
    fn initial_state_is_empty() {
        let state = RunnerState::initial();
        assert_eq!(state.lap_count, 0);
        assert!(state.started_at_ms.is_none());
        assert!(state.finished_at_ms.is_none());
        assert!(state.flags.is_empty());
        assert!(state.last_seen_ms_at_station.is_empty());
    }

    #[test]
    fn lap_only_three_laps_finishes_at_threshold() {
        let config = resolve_template("lap-only", 3);
        let state = fold(
            &[
                scan(StationId::LapEnd, 0),
                scan(StationId::LapEnd, 11_000),
                scan(StationId::LapEnd, 22_000),
            ],
            &config,
        );

        assert_eq!(state.lap_count, 3);
        assert_eq!(state.finished_at_ms, Some(22_000));
        assert_eq!(state.started_at_ms, Some(0));
    }

    #[test]
    fn debounce_drops_repeat_scan_entirely() {
        let config = resolve_template("lap-only", 10);
        let state = fold(
            &[scan(StationId::LapEnd, 1_000), scan(StationId::LapEnd, 9_000)],
            &config,
        );

        assert_eq!(state.lap_count, 1);
        assert_eq!(state.last_seen_ms_at_station[&StationId::LapEnd], 1_000);
    }

    #[test]
    fn debounce_measures_from_last_accepted_scan() {
        let config = resolve_template("lap-only", 10);
        // 9s after the first is rejected, 12s after the first is accepted even
        // though it is only 3s after the rejected attempt.
        let state = fold(
            &[
                scan(StationId::LapEnd, 0),
                scan(StationId::LapEnd, 9_000),
                scan(StationId::LapEnd, 12_000),
            ],
            &config,
        );

        assert_eq!(state.lap_count, 2);
        assert_eq!(state.last_seen_ms_at_station[&StationId::LapEnd], 12_000);
    }

    #[test]
    fn soft_enforcement_flags_but_counts() {
        let config = resolve_template("lap-two-checkpoints", 5);
        let state = fold(&[scan(StationId::LapEnd, 0)], &config);

        assert_eq!(state.lap_count, 1);
        assert!(state.has_flag(RunnerFlag::SoftMissingCheckpoint));
    }

    #[test]
    fn derived_state_exports_in_wire_case() {
        let config = resolve_template("lap-two-checkpoints", 5);
        let state = fold(
            &[
                scan(StationId::LapEnd, 0),
                scan(StationId::CheckpointA, 12_000),
            ],
            &config,
        );
        let value = serde_json::to_value(&state).unwrap();

        assert_eq!(value["lapCount"], 1);
        assert_eq!(value["startedAtMs"], 0);
        assert!(value["finishedAtMs"].is_null());
        assert_eq!(value["flags"], serde_json::json!(["SOFT_MISSING_CHECKPOINT"]));
        assert_eq!(value["checkpointsSeen"]["CP_A"], true);
        assert_eq!(value["lastSeenMsAtStation"]["LAP_END"], 0);
    }

    #[test]
    fn all_checkpoints_seen_counts_silently() {
        let config = resolve_template("lap-two-checkpoints", 5);
        let state = fold(
            &[
                scan(StationId::CheckpointA, 0),
                scan(StationId::CheckpointB, 1_000),
                scan(StationId::LapEnd, 2_000),
            ],
            &config,
        );

        assert_eq!(state.lap_count, 1);
        assert!(state.flags.is_empty());
        assert!(state.checkpoints_seen.is_empty(), "reset for the next lap");
    }

    #[test]
    fn checkpoints_reset_every_lap() {
        let config = resolve_template("lap-checkpoint", 5);
        let state = fold(
            &[
                scan(StationId::CheckpointA, 0),
                scan(StationId::LapEnd, 1_000),
                scan(StationId::LapEnd, 20_000),
            ],
            &config,
        );

        assert_eq!(state.lap_count, 2);
        assert!(state.has_flag(RunnerFlag::SoftMissingCheckpoint));
    }

    #[test]
    fn checkpoint_scan_does_not_count_lap() {
        let config = resolve_template("lap-checkpoint", 5);
        let state = fold(&[scan(StationId::CheckpointA, 0)], &config);

        assert_eq!(state.lap_count, 0);
        assert!(state.has_seen(&StationId::CheckpointA));
    }

    #[test]
    fn strict_enforcement_blocks_lap() {
        let overrides = TemplateOverrides {
            enforcement: Some(crate::template::Enforcement::Strict),
            ..Default::default()
        };
        let config = resolve_template("lap-checkpoint", 5).with_overrides(&overrides);
        let state = fold(&[scan(StationId::LapEnd, 0)], &config);

        assert_eq!(state.lap_count, 0);
        assert!(state.has_flag(RunnerFlag::StrictMissingCheckpoint));

        let state = fold(
            &[
                scan(StationId::LapEnd, 0),
                scan(StationId::CheckpointA, 5_000),
                scan(StationId::LapEnd, 11_000),
            ],
            &config,
        );
        assert_eq!(state.lap_count, 1);
        assert!(state.has_flag(RunnerFlag::StrictMissingCheckpoint), "flags persist");
    }

    #[test]
    fn finish_requires_minimum_laps() {
        let config = resolve_template("lap-finish", 2);

        let early = fold(&[scan(StationId::Finish, 0)], &config);
        assert!(early.has_flag(RunnerFlag::EarlyFinish));
        assert!(early.finished_at_ms.is_none());

        let state = fold(
            &[
                scan(StationId::Finish, 0),
                scan(StationId::LapEnd, 11_000),
                scan(StationId::LapEnd, 22_000),
                scan(StationId::Finish, 33_000),
            ],
            &config,
        );
        assert_eq!(state.lap_count, 2);
        assert_eq!(state.finished_at_ms, Some(33_000));
        assert!(state.has_flag(RunnerFlag::EarlyFinish));
    }

    #[test]
    fn finish_scans_debounce_on_their_own_gap() {
        let config = resolve_template("lap-finish", 0);
        let state = fold(
            &[scan(StationId::Finish, 0), scan(StationId::Finish, 4_000)],
            &config,
        );
        assert_eq!(state.finished_at_ms, Some(0));
    }

    #[test]
    fn lap_finish_does_not_auto_finish() {
        let config = resolve_template("lap-finish", 1);
        let state = fold(&[scan(StationId::LapEnd, 0)], &config);
        assert_eq!(state.lap_count, 1);
        assert!(state.finished_at_ms.is_none());
    }

    #[test]
    fn start_set_sets_start_unconditionally() {
        let config = resolve_template("start-lap", 3);
        let state = fold(
            &[
                scan(StationId::LapEnd, 0),
                RunEvent::start_set(runner(), 50_000),
            ],
            &config,
        );

        assert_eq!(state.started_at_ms, Some(50_000));
        assert_eq!(state.lap_count, 1);
    }

    #[test]
    fn scan_at_start_marker_is_noop_after_debounce() {
        let config = resolve_template("start-lap", 3);
        let state = fold(&[scan(StationId::Start, 100)], &config);

        assert!(state.started_at_ms.is_none());
        assert_eq!(state.lap_count, 0);
        assert_eq!(state.last_seen_ms_at_station[&StationId::Start], 100);
    }

    #[test]
    fn lap_start_required_consumes_first_pass() {
        let mut config = resolve_template("lap-only", 5);
        config.flags.insert(TemplateFlag::LapStartRequired);

        let state = fold(
            &[scan(StationId::LapEnd, 0), scan(StationId::LapEnd, 11_000)],
            &config,
        );

        assert_eq!(state.started_at_ms, Some(0));
        assert_eq!(state.lap_count, 1);
    }

    #[test]
    fn distinct_lap_start_station_triggers_start() {
        let mut config = resolve_template("lap-only", 5);
        config.station_order.insert(0, StationId::LapStart);

        let state = fold(
            &[scan(StationId::LapStart, 500), scan(StationId::LapEnd, 20_000)],
            &config,
        );

        assert_eq!(state.started_at_ms, Some(500));
        assert_eq!(state.lap_count, 1);
    }

    #[test]
    fn clear_resets_to_initial() {
        let config = resolve_template("lap-checkpoint", 5);
        let state = fold(
            &[
                scan(StationId::CheckpointA, 0),
                scan(StationId::LapEnd, 1_000),
                scan(StationId::LapEnd, 12_000),
                RunEvent::clear(runner(), StationId::LapEnd, 13_000),
            ],
            &config,
        );

        assert_eq!(state, RunnerState::initial());
    }

    #[test]
    fn clear_all_resets_to_initial() {
        let config = resolve_template("lap-only", 1);
        let state = fold(
            &[scan(StationId::LapEnd, 0), RunEvent::clear_all(None, 1_000)],
            &config,
        );
        assert_eq!(state, RunnerState::initial());
    }

    #[test]
    fn clear_reseeds_global_start_when_active() {
        let overrides = TemplateOverrides {
            start_rule: Some(StartRule::GlobalStart),
            global_start_ms: Some(7_000),
            ..Default::default()
        };
        let config = resolve_template("lap-only", 3).with_overrides(&overrides);
        let state = fold(
            &[
                scan(StationId::LapEnd, 10_000),
                RunEvent::clear(runner(), StationId::LapEnd, 11_000),
            ],
            &config,
        );

        assert_eq!(state.started_at_ms, Some(7_000));
        assert_eq!(state.lap_count, 0);
    }

    #[test]
    fn global_start_branch_suppresses_start_detection() {
        let overrides = TemplateOverrides {
            start_rule: Some(StartRule::GlobalStart),
            ..Default::default()
        };
        let config = resolve_template("lap-only", 3).with_overrides(&overrides);
        let state = fold(&[scan(StationId::LapEnd, 10_000)], &config);

        assert!(state.started_at_ms.is_none());
        assert_eq!(state.lap_count, 1);
    }

    #[test]
    fn undo_is_inert() {
        let config = resolve_template("lap-only", 3);
        let first = scan(StationId::LapEnd, 0);
        let before = fold(&[first.clone()], &config);
        let after = apply_event(before.clone(), &RunEvent::undo(&first, 5), &config);
        assert_eq!(before, after);
    }

    #[test]
    fn unknown_type_and_missing_station_are_noops() {
        let config = resolve_template("lap-only", 3);
        let mut odd = scan(StationId::LapEnd, 0);
        odd.event_type = EventType::Other("TELEPORT".into());
        let state = apply_event(RunnerState::initial(), &odd, &config);
        assert_eq!(state.lap_count, 0);

        let mut stationless = scan(StationId::LapEnd, 0);
        stationless.station_id = None;
        let state = apply_event(RunnerState::initial(), &stationless, &config);
        assert_eq!(state, RunnerState::initial());
    }

    #[test]
    fn unconfigured_station_only_updates_debounce() {
        let config = resolve_template("lap-only", 3);
        let state = fold(
            &[
                scan(StationId::Other("WATER".into()), 0),
                scan(StationId::CheckpointA, 10),
                scan(StationId::Finish, 20),
            ],
            &config,
        );

        assert_eq!(state.lap_count, 0);
        assert!(state.finished_at_ms.is_none());
        assert!(state.checkpoints_seen.is_empty());
    }

    #[test]
    fn fold_is_deterministic() {
        let config = resolve_template("lap-two-checkpoints", 2);
        let events = vec![
            scan(StationId::CheckpointA, 0).with_id(EventId::from("a")),
            scan(StationId::LapEnd, 1_000).with_id(EventId::from("b")),
            scan(StationId::CheckpointB, 4_000).with_id(EventId::from("c")),
        ];
        assert_eq!(fold(&events, &config), fold(&events, &config));
    }
}
