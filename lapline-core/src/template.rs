//! Template configuration resolver.
//!
//! Maps a template key and a required-lap count to a [`RunTemplateConfig`]:
//! station order, per-station debounce window, enforcement flags and the
//! start/finish rules. Resolution is pure and never fails; an unrecognised
//! key falls back to the simplest topology.

use lapline_types::StationId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default minimum gap between two accepted scans at an ordinary station.
pub const DEFAULT_SCAN_GAP_MS: i64 = 10_000;

/// Minimum gap between two accepted scans at the finish station.
pub const FINISH_SCAN_GAP_MS: i64 = 5_000;

/// The five shipped topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKey {
    /// One lap-counter station, no checkpoints, no enforcement.
    LapOnly,
    /// Lap counter plus one checkpoint.
    LapCheckpoint,
    /// Lap counter plus two checkpoints.
    LapTwoCheckpoints,
    /// Start marker plus lap counter.
    StartLap,
    /// Lap counter plus a separate finish station gated on a lap minimum.
    LapFinish,
}

impl TemplateKey {
    /// All shipped keys.
    pub const ALL: [TemplateKey; 5] = [
        Self::LapOnly,
        Self::LapCheckpoint,
        Self::LapTwoCheckpoints,
        Self::StartLap,
        Self::LapFinish,
    ];

    /// Resolve a key name, falling back to [`TemplateKey::LapOnly`].
    pub fn parse(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == name)
            .unwrap_or(Self::LapOnly)
    }

    /// Wire name of this key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LapOnly => "lap-only",
            Self::LapCheckpoint => "lap-checkpoint",
            Self::LapTwoCheckpoints => "lap-two-checkpoints",
            Self::StartLap => "start-lap",
            Self::LapFinish => "lap-finish",
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topology-level flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateFlag {
    /// Missing checkpoints are flagged but the lap still counts.
    SoftEnforcement,
    /// Missing checkpoints block the lap.
    StrictEnforcement,
    /// The first lap-counter pass only starts the race.
    LapStartRequired,
    /// Laps must be closed at the lap-counter line.
    LapEndRequired,
    /// A finish scan is accepted only after the lap minimum.
    FinishScanWithMinLaps,
}

/// How a runner's start time is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartRule {
    /// First pass at the lap-start (or lap-counter) station.
    FirstScan,
    /// A configured global start time. No shipped template selects this.
    GlobalStart,
}

/// How a runner's finish time is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishRule {
    /// Finish automatically when the lap count reaches the requirement.
    AtLapThreshold,
    /// Finish at the finish station once the lap minimum is met.
    FinishScanWithMinLaps,
}

/// Missing-checkpoint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Ignore missing checkpoints.
    Off,
    /// Flag missing checkpoints, count the lap.
    Soft,
    /// Flag missing checkpoints, block the lap.
    Strict,
}

impl Enforcement {
    /// Name used in configuration and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Soft => "soft",
            Self::Strict => "strict",
        }
    }
}

/// Error returned when parsing an unknown enforcement name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown enforcement mode: {0}")]
pub struct UnknownEnforcement(pub String);

impl FromStr for Enforcement {
    type Err = UnknownEnforcement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "soft" => Ok(Self::Soft),
            "strict" => Ok(Self::Strict),
            _ => Err(UnknownEnforcement(s.to_string())),
        }
    }
}

/// Session-level adjustments applied on top of a resolved template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateOverrides {
    /// Replace the template's enforcement flags.
    pub enforcement: Option<Enforcement>,
    /// Uniform scan gap for every station except the finish.
    pub scan_gap_ms: Option<i64>,
    /// Explicit finish rule.
    pub finish_rule: Option<FinishRule>,
    /// Explicit start rule.
    pub start_rule: Option<StartRule>,
    /// Global start time used by [`StartRule::GlobalStart`].
    pub global_start_ms: Option<i64>,
}

/// Resolved topology and enforcement settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunTemplateConfig {
    /// The topology this config was resolved from.
    pub template: TemplateKey,
    /// Ordered stations of the course.
    pub station_order: Vec<StationId>,
    /// Per-station debounce window.
    pub min_scan_gap_ms_by_station: BTreeMap<StationId, i64>,
    /// Topology flags.
    pub flags: BTreeSet<TemplateFlag>,
    /// Start rule.
    pub start_rule: StartRule,
    /// Finish rule; unset for most topologies.
    pub finish_rule: Option<FinishRule>,
    /// Lap minimum before a finish scan is accepted.
    pub min_laps_required: Option<u32>,
    /// Laps required to complete the run.
    pub laps_required: u32,
    /// Global start time for [`StartRule::GlobalStart`].
    pub global_start_ms: Option<i64>,
}

/// Resolve a template key and lap count into a config.
pub fn resolve_template(key: &str, laps_required: u32) -> RunTemplateConfig {
    RunTemplateConfig::resolve(TemplateKey::parse(key), laps_required)
}

impl RunTemplateConfig {
    /// Build the config of a known topology.
    pub fn resolve(template: TemplateKey, laps_required: u32) -> Self {
        use StationId::*;

        let (station_order, flags, finish_rule, min_laps_required) = match template {
            TemplateKey::LapOnly => (
                vec![LapEnd],
                BTreeSet::new(),
                Some(FinishRule::AtLapThreshold),
                None,
            ),
            TemplateKey::LapCheckpoint => (
                vec![CheckpointA, LapEnd],
                BTreeSet::from([TemplateFlag::SoftEnforcement]),
                None,
                None,
            ),
            TemplateKey::LapTwoCheckpoints => (
                vec![CheckpointA, CheckpointB, LapEnd],
                BTreeSet::from([TemplateFlag::SoftEnforcement]),
                None,
                None,
            ),
            TemplateKey::StartLap => (
                vec![Start, LapEnd],
                BTreeSet::from([TemplateFlag::SoftEnforcement]),
                None,
                None,
            ),
            TemplateKey::LapFinish => (
                vec![LapEnd, Finish],
                BTreeSet::from([
                    TemplateFlag::SoftEnforcement,
                    TemplateFlag::FinishScanWithMinLaps,
                ]),
                Some(FinishRule::FinishScanWithMinLaps),
                Some(laps_required),
            ),
        };

        let min_scan_gap_ms_by_station = scan_gaps(&station_order, None);

        Self {
            template,
            station_order,
            min_scan_gap_ms_by_station,
            flags,
            start_rule: StartRule::FirstScan,
            finish_rule,
            min_laps_required,
            laps_required,
            global_start_ms: None,
        }
    }

    /// Apply session-level overrides.
    pub fn with_overrides(mut self, overrides: &TemplateOverrides) -> Self {
        if let Some(enforcement) = overrides.enforcement {
            self.flags.remove(&TemplateFlag::SoftEnforcement);
            self.flags.remove(&TemplateFlag::StrictEnforcement);
            match enforcement {
                Enforcement::Off => {}
                Enforcement::Soft => {
                    self.flags.insert(TemplateFlag::SoftEnforcement);
                }
                Enforcement::Strict => {
                    self.flags.insert(TemplateFlag::StrictEnforcement);
                }
            }
        }
        if let Some(gap) = overrides.scan_gap_ms {
            self.min_scan_gap_ms_by_station = scan_gaps(&self.station_order, Some(gap));
        }
        if let Some(rule) = overrides.finish_rule {
            self.finish_rule = Some(rule);
        }
        if let Some(rule) = overrides.start_rule {
            self.start_rule = rule;
        }
        if overrides.global_start_ms.is_some() {
            self.global_start_ms = overrides.global_start_ms;
        }
        self
    }

    /// Whether a flag is set.
    pub fn has_flag(&self, flag: TemplateFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// The station that counts laps.
    pub fn lap_counter_station(&self) -> StationId {
        StationId::LapEnd
    }

    /// The distinct lap-start station, if the topology has one.
    pub fn lap_start_station(&self) -> Option<StationId> {
        self.station_order
            .iter()
            .find(|s| **s == StationId::LapStart)
            .cloned()
    }

    /// Whether `station` is a configured intermediate checkpoint.
    pub fn is_checkpoint(&self, station: &StationId) -> bool {
        !matches!(
            station,
            StationId::Start | StationId::LapStart | StationId::LapEnd | StationId::Finish
        ) && self.station_order.contains(station)
    }

    /// Configured intermediate checkpoints, in course order.
    pub fn checkpoints(&self) -> impl Iterator<Item = &StationId> {
        self.station_order.iter().filter(|s| self.is_checkpoint(s))
    }

    /// Debounce window for `station` (0 if unconfigured).
    pub fn min_scan_gap_ms(&self, station: &StationId) -> i64 {
        self.min_scan_gap_ms_by_station
            .get(station)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the global-start branch is active.
    pub fn global_start_active(&self) -> bool {
        self.start_rule == StartRule::GlobalStart
    }

    /// Lap minimum enforced at the finish station, if any.
    pub fn finish_min_laps(&self) -> Option<u32> {
        let gated = self.finish_rule == Some(FinishRule::FinishScanWithMinLaps)
            || self.has_flag(TemplateFlag::FinishScanWithMinLaps);
        gated.then(|| self.min_laps_required.unwrap_or(self.laps_required))
    }
}

fn scan_gaps(stations: &[StationId], uniform: Option<i64>) -> BTreeMap<StationId, i64> {
    stations
        .iter()
        .map(|station| {
            let gap = match station {
                StationId::Finish => FINISH_SCAN_GAP_MS,
                _ => uniform.unwrap_or(DEFAULT_SCAN_GAP_MS),
            };
            (station.clone(), gap)
        })
        .collect()
}
