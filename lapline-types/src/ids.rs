//! Identity types for lapline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a run event.
///
/// Locally created events use UUID v4 strings. Events pulled from a remote
/// keep whatever id the remote assigned, so the inner value is an opaque string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create a new random EventId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the string form of this EventId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

/// Identifier of a runner (bib number, student number, ...).
///
/// The format is validated at the capture boundary, not here.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerId(String);

impl RunnerId {
    /// Reserved runner id carried by CLEAR_ALL events.
    pub const ALL: &'static str = "*";

    /// Create a RunnerId from a string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The runner id used on CLEAR_ALL events.
    pub fn all() -> Self {
        Self(Self::ALL.to_string())
    }

    /// Whether this is the reserved CLEAR_ALL runner id.
    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL
    }

    /// Get the string form of this RunnerId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunnerId({})", self.0)
    }
}

/// Identifier of a local capture session.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random SessionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the string form of this SessionId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// A capture station on the course.
///
/// Unknown station names received from a remote are preserved as
/// [`StationId::Other`] so they survive a store round trip; the reducer
/// ignores them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StationId {
    /// Manual race-start marker.
    Start,
    /// Distinct lap-start line (no shipped topology uses it).
    LapStart,
    /// First intermediate checkpoint.
    CheckpointA,
    /// Second intermediate checkpoint.
    CheckpointB,
    /// Lap-counter line.
    LapEnd,
    /// Separate finish station.
    Finish,
    /// A station name this build does not know.
    Other(String),
}

impl StationId {
    /// Wire name of this station.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "START",
            Self::LapStart => "LAP_START",
            Self::CheckpointA => "CP_A",
            Self::CheckpointB => "CP_B",
            Self::LapEnd => "LAP_END",
            Self::Finish => "FINISH",
            Self::Other(name) => name,
        }
    }

    /// Parse a wire name. Never fails; unknown names become [`StationId::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "START" => Self::Start,
            "LAP_START" => Self::LapStart,
            "CP_A" => Self::CheckpointA,
            "CP_B" => Self::CheckpointB,
            "LAP_END" => Self::LapEnd,
            "FINISH" => Self::Finish,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for StationId {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<StationId> for String {
    fn from(value: StationId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StationId({})", self.as_str())
    }
}
