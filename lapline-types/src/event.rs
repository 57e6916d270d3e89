//! The immutable run event.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::TypeError;
use crate::ids::{EventId, RunnerId, StationId};

/// Kind of a run event.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A runner passed a station.
    Scan,
    /// Manual start marker for a runner.
    StartSet,
    /// Tombstone retracting the event named by `target_id`.
    Undo,
    /// Reset one runner's derived state.
    Clear,
    /// Reset every runner's derived state.
    ClearAll,
    /// A type name this build does not know.
    Other(String),
}

impl EventType {
    /// Wire name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scan => "SCAN",
            Self::StartSet => "START_SET",
            Self::Undo => "UNDO",
            Self::Clear => "CLEAR",
            Self::ClearAll => "CLEAR_ALL",
            Self::Other(name) => name,
        }
    }

    /// Parse a wire name. Never fails; unknown names become [`EventType::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "SCAN" => Self::Scan,
            "START_SET" => Self::StartSet,
            "UNDO" => Self::Undo,
            "CLEAR" => Self::Clear,
            "CLEAR_ALL" => Self::ClearAll,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fact captured at a station.
///
/// Events are never edited or removed from the logical record. Retraction is
/// a new [`EventType::Undo`] event whose `target_id` names the retracted one.
/// The JSON encoding is the remote wire shape:
/// `{ id, runnerId, stationId, type, capturedAtMs, refEventId }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    /// Unique event id.
    pub id: EventId,
    /// Runner this event applies to ([`RunnerId::ALL`] for CLEAR_ALL).
    ///
    /// A null or missing runner decodes as [`RunnerId::ALL`].
    #[serde(default = "RunnerId::all", deserialize_with = "runner_or_all")]
    pub runner_id: RunnerId,
    /// Station where the event was captured.
    #[serde(default)]
    pub station_id: Option<StationId>,
    /// Event kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Device-local capture time in milliseconds since the Unix epoch.
    pub captured_at_ms: i64,
    /// Retraction target, present only on UNDO.
    #[serde(default, rename = "refEventId")]
    pub target_id: Option<EventId>,
}

fn runner_or_all<'de, D>(deserializer: D) -> Result<RunnerId, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RunnerId>::deserialize(deserializer)?.unwrap_or_else(RunnerId::all))
}

impl RunEvent {
    /// A SCAN of `runner` at `station`.
    pub fn scan(runner: RunnerId, station: StationId, captured_at_ms: i64) -> Self {
        Self {
            id: EventId::new(),
            runner_id: runner,
            station_id: Some(station),
            event_type: EventType::Scan,
            captured_at_ms,
            target_id: None,
        }
    }

    /// A START_SET marker for `runner` at the start station.
    pub fn start_set(runner: RunnerId, captured_at_ms: i64) -> Self {
        Self {
            id: EventId::new(),
            runner_id: runner,
            station_id: Some(StationId::Start),
            event_type: EventType::StartSet,
            captured_at_ms,
            target_id: None,
        }
    }

    /// An UNDO retracting `target`. The runner and station are copied from the
    /// target for bookkeeping.
    pub fn undo(target: &RunEvent, captured_at_ms: i64) -> Self {
        Self {
            id: EventId::new(),
            runner_id: target.runner_id.clone(),
            station_id: target.station_id.clone(),
            event_type: EventType::Undo,
            captured_at_ms,
            target_id: Some(target.id.clone()),
        }
    }

    /// A CLEAR of `runner`, recorded at `station`.
    pub fn clear(runner: RunnerId, station: StationId, captured_at_ms: i64) -> Self {
        Self {
            id: EventId::new(),
            runner_id: runner,
            station_id: Some(station),
            event_type: EventType::Clear,
            captured_at_ms,
            target_id: None,
        }
    }

    /// A CLEAR_ALL resetting every runner.
    pub fn clear_all(station: Option<StationId>, captured_at_ms: i64) -> Self {
        Self {
            id: EventId::new(),
            runner_id: RunnerId::all(),
            station_id: station,
            event_type: EventType::ClearAll,
            captured_at_ms,
            target_id: None,
        }
    }

    /// Replace the generated id (used when replaying fixtures with known ids).
    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = id.into();
        self
    }

    /// Serialize to wire JSON.
    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(TypeError::Serialization)
    }

    /// Deserialize from wire JSON.
    pub fn from_json(json: &str) -> Result<Self, TypeError> {
        serde_json::from_str(json).map_err(TypeError::Deserialization)
    }

    /// Whether this event is a tombstone.
    pub fn is_undo(&self) -> bool {
        self.event_type == EventType::Undo
    }
}
