//! Remote API message bodies.
//!
//! The remote authority exposes two endpoints:
//! - `POST /events/ingest` takes an [`IngestRequest`] and answers with an [`IngestResponse`]
//! - `GET /events?since=<ms>` answers with a [`PullResponse`]
//!
//! A pairing token is exchanged out of band for a [`TokenResolution`].

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::event::RunEvent;
use crate::ids::EventId;

/// Batch of locally captured events submitted to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Remote session id the events belong to.
    pub session_id: String,
    /// Run configuration id issued with the pairing token.
    pub run_config_id: String,
    /// Events to ingest.
    pub events: Vec<RunEvent>,
}

impl IngestRequest {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(TypeError::Serialization)
    }
}

/// Remote answer to an ingest batch.
///
/// Every field is optional. When neither id list is present the whole batch
/// is considered accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// Ids the remote stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_ids: Option<Vec<EventId>>,
    /// Ids the remote refused; they stay pending locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_ids: Option<Vec<EventId>>,
    /// Free-form error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestResponse {
    /// Parse a response body. Malformed bodies yield an empty response.
    pub fn from_slice_lenient(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }
}

/// Remote answer to a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Events captured after the requested watermark.
    #[serde(default)]
    pub events: Vec<RunEvent>,
}

#[derive(Deserialize)]
struct RawPullResponse {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

impl PullResponse {
    /// Parse a response body. Malformed bodies yield no events.
    pub fn from_slice_lenient(bytes: &[u8]) -> Self {
        Self::decode_lenient(bytes).0
    }

    /// Parse a response body element by element.
    ///
    /// Elements that do not decode as a [`RunEvent`] are dropped so the rest
    /// of the batch still lands; the second value counts them.
    pub fn decode_lenient(bytes: &[u8]) -> (Self, usize) {
        let raw: RawPullResponse = match serde_json::from_slice(bytes) {
            Ok(raw) => raw,
            Err(_) => return (Self::default(), 0),
        };
        let total = raw.events.len();
        let events: Vec<RunEvent> = raw
            .events
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        let skipped = total - events.len();
        (Self { events }, skipped)
    }
}

/// Session parameters obtained by exchanging a pairing token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResolution {
    /// Run configuration id.
    pub run_config_id: String,
    /// Remote session id.
    pub session_id: String,
    /// Topology key.
    pub template_key: String,
    /// Laps required to complete the run.
    pub laps_required: u32,
    /// Enforcement mode name (`off`, `soft`, `strict`).
    #[serde(default)]
    pub enforcement: Option<String>,
    /// Uniform scan-gap override in milliseconds.
    #[serde(default)]
    pub scan_gap_ms: Option<i64>,
    /// Display name of the run.
    #[serde(default)]
    pub name: Option<String>,
}

impl TokenResolution {
    /// Parse a resolution from JSON.
    pub fn from_json(json: &str) -> Result<Self, TypeError> {
        serde_json::from_str(json).map_err(TypeError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunnerId, StationId};

    #[test]
    fn ingest_request_shape() {
        let request = IngestRequest {
            session_id: "remote-1".into(),
            run_config_id: "cfg-9".into(),
            events: vec![RunEvent::scan(RunnerId::new("3"), StationId::LapEnd, 1).with_id("a")],
        };
        let value: serde_json::Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();

        assert_eq!(value["sessionId"], "remote-1");
        assert_eq!(value["runConfigId"], "cfg-9");
        assert_eq!(value["events"][0]["id"], "a");
    }

    #[test]
    fn ingest_response_partial_lists() {
        let response = IngestResponse::from_slice_lenient(br#"{"acceptedIds":["a","b"]}"#);
        assert_eq!(
            response.accepted_ids,
            Some(vec![EventId::from("a"), EventId::from("b")])
        );
        assert!(response.failed_ids.is_none());
    }

    #[test]
    fn malformed_ingest_response_is_empty() {
        let response = IngestResponse::from_slice_lenient(b"<html>bad gateway</html>");
        assert_eq!(response, IngestResponse::default());
    }

    #[test]
    fn malformed_pull_response_is_empty() {
        assert!(PullResponse::from_slice_lenient(b"{\"events\":42}").events.is_empty());
        assert!(PullResponse::from_slice_lenient(b"").events.is_empty());
    }

    #[test]
    fn bad_pull_element_does_not_sink_the_batch() {
        let body = br#"{"events":[
            {"id":"s1","runnerId":"4","stationId":"LAP_END","type":"SCAN","capturedAtMs":1000},
            {"id":"c1","runnerId":null,"type":"CLEAR_ALL","capturedAtMs":2000},
            {"runnerId":"4","stationId":"LAP_END","type":"SCAN","capturedAtMs":3000},
            {"id":"s2","runnerId":"4","stationId":"LAP_END","type":"SCAN","capturedAtMs":13000}
        ]}"#;

        let (response, skipped) = PullResponse::decode_lenient(body);
        let ids: Vec<&str> = response.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "c1", "s2"]);
        assert_eq!(skipped, 1);
        assert!(response.events[1].runner_id.is_all());
    }

    #[test]
    fn pull_response_without_events_field() {
        assert!(PullResponse::from_slice_lenient(b"{}").events.is_empty());
    }

    #[test]
    fn token_resolution_parses() {
        let json = r#"{
            "runConfigId": "cfg",
            "sessionId": "sess",
            "templateKey": "lap-finish",
            "lapsRequired": 4,
            "enforcement": "strict",
            "scanGapMs": 8000,
            "name": "Grade 9 pacer"
        }"#;
        let resolution = TokenResolution::from_json(json).unwrap();
        assert_eq!(resolution.laps_required, 4);
        assert_eq!(resolution.scan_gap_ms, Some(8000));
        assert_eq!(resolution.enforcement.as_deref(), Some("strict"));
    }
}
