//! Capture commands: scan, start, undo, clear.

use anyhow::{Context, Result};
use lapline_client::{now_ms, EventStore, RaceSession};
use lapline_types::{EventId, RunEvent, StationId};
use std::path::Path;

use crate::config::Workspace;

/// What `undo` retracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoTarget {
    /// A specific event.
    Event(String),
    /// The runner's latest effective scan or start.
    LastOf(String),
}

async fn open(data_dir: &Path) -> Result<RaceSession<lapline_client::SqliteStore>> {
    Workspace::open(data_dir).await?.active_session().await
}

/// Resolve a station name against the session's course.
///
/// Without a name, the lap-counter station is used.
fn station<S: EventStore>(session: &RaceSession<S>, name: Option<&str>) -> Result<StationId> {
    let config = session.config();
    let Some(name) = name else {
        return Ok(config.lap_counter_station());
    };

    let station = StationId::parse(&name.trim().to_ascii_uppercase());
    if config.station_order.contains(&station) {
        return Ok(station);
    }
    let known: Vec<&str> = config.station_order.iter().map(|s| s.as_str()).collect();
    anyhow::bail!(
        "Station {} is not on this course (stations: {})",
        name,
        known.join(", ")
    )
}

fn print_event(verb: &str, event: &RunEvent) {
    let station = event
        .station_id
        .as_ref()
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{} runner {} at {} ({}ms)  id {}",
        verb, event.runner_id, station, event.captured_at_ms, event.id
    );
}

/// Run the scan command.
pub async fn scan(
    data_dir: &Path,
    runner: &str,
    station_name: Option<&str>,
    at: Option<i64>,
) -> Result<RunEvent> {
    let session = open(data_dir).await?;
    let station = station(&session, station_name)?;
    let event = session
        .scan(runner, station, at.unwrap_or_else(now_ms))
        .await?;
    print_event("Scanned", &event);
    Ok(event)
}

/// Run the start command.
pub async fn start(data_dir: &Path, runners: &[String], at: Option<i64>) -> Result<Vec<RunEvent>> {
    let session = open(data_dir).await?;
    let runners: Vec<&str> = runners.iter().map(String::as_str).collect();
    let events = session
        .start_set(&runners, at.unwrap_or_else(now_ms))
        .await?;
    for event in &events {
        print_event("Started", event);
    }
    Ok(events)
}

/// Run the undo command.
pub async fn undo(data_dir: &Path, target: UndoTarget, at: Option<i64>) -> Result<RunEvent> {
    let session = open(data_dir).await?;
    let at = at.unwrap_or_else(now_ms);
    let event = match target {
        UndoTarget::Event(id) => session.undo(&EventId::from(id.trim()), at).await?,
        UndoTarget::LastOf(runner) => session.undo_last(&runner, at).await?,
    };

    let retracted = event
        .target_id
        .as_ref()
        .context("undo event without a target")?;
    println!("Retracted {} (runner {})", retracted, event.runner_id);
    Ok(event)
}

/// Run the clear command for one runner.
pub async fn clear(
    data_dir: &Path,
    runner: &str,
    station_name: Option<&str>,
    at: Option<i64>,
) -> Result<RunEvent> {
    let session = open(data_dir).await?;
    let station = station(&session, station_name)?;
    let event = session
        .clear(runner, station, at.unwrap_or_else(now_ms))
        .await?;
    print_event("Cleared", &event);
    Ok(event)
}

/// Run the clear command for every runner.
pub async fn clear_all(
    data_dir: &Path,
    station_name: Option<&str>,
    at: Option<i64>,
) -> Result<RunEvent> {
    let session = open(data_dir).await?;
    let station = match station_name {
        Some(name) => Some(station(&session, Some(name))?),
        None => None,
    };
    let event = session
        .clear_all(station, at.unwrap_or_else(now_ms))
        .await?;
    println!("Cleared all runners ({}ms)  id {}", event.captured_at_ms, event.id);
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::{self, NewSession};
    use lapline_client::RunnerIdFormat;
    use lapline_core::TemplateKey;
    use tempfile::{tempdir, TempDir};

    async fn setup(template: TemplateKey, laps: u32) -> TempDir {
        let dir = tempdir().unwrap();
        init::run(
            dir.path(),
            NewSession {
                name: "Heat".to_string(),
                template,
                laps,
                format: RunnerIdFormat::Numeric,
                enforcement: None,
                scan_gap_ms: None,
            },
        )
        .await
        .unwrap();
        dir
    }

    async fn session(dir: &TempDir) -> RaceSession<lapline_client::SqliteStore> {
        open(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn scan_defaults_to_lap_counter() {
        let dir = setup(TemplateKey::LapOnly, 2).await;
        let event = scan(dir.path(), "7", None, Some(1_000)).await.unwrap();

        assert_eq!(event.station_id, Some(StationId::LapEnd));
        let state = session(&dir).await.runner("7").await.unwrap();
        assert_eq!(state.lap_count, 1);
    }

    #[tokio::test]
    async fn scan_accepts_course_stations_case_insensitively() {
        let dir = setup(TemplateKey::LapCheckpoint, 2).await;
        let event = scan(dir.path(), "7", Some("cp_a"), Some(1_000)).await.unwrap();
        assert_eq!(event.station_id, Some(StationId::CheckpointA));

        let err = scan(dir.path(), "7", Some("FINISH"), Some(2_000))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not on this course"));
    }

    #[tokio::test]
    async fn scan_validates_runner_format() {
        let dir = setup(TemplateKey::LapOnly, 2).await;
        assert!(scan(dir.path(), "abc", None, Some(1_000)).await.is_err());
        assert!(session(&dir).await.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn capture_without_session_fails() {
        let dir = tempdir().unwrap();
        let err = scan(dir.path(), "7", None, None).await.unwrap_err();
        assert!(err.to_string().contains("lapline init"));
    }

    #[tokio::test]
    async fn start_then_undo_last() {
        let dir = setup(TemplateKey::StartLap, 2).await;
        let started = start(dir.path(), &["1".to_string(), "2".to_string()], Some(500))
            .await
            .unwrap();
        assert_eq!(started.len(), 2);

        let undo_event = undo(dir.path(), UndoTarget::LastOf("2".to_string()), Some(600))
            .await
            .unwrap();
        assert_eq!(undo_event.target_id, Some(started[1].id.clone()));

        let standings = session(&dir).await.standings().await.unwrap();
        assert_eq!(standings.len(), 2);
        let started_at: Vec<Option<i64>> = standings.values().map(|s| s.started_at_ms).collect();
        assert_eq!(started_at, vec![Some(500), None]);
    }

    #[tokio::test]
    async fn undo_by_event_id() {
        let dir = setup(TemplateKey::LapOnly, 5).await;
        let first = scan(dir.path(), "7", None, Some(1_000)).await.unwrap();
        scan(dir.path(), "7", None, Some(12_000)).await.unwrap();

        undo(dir.path(), UndoTarget::Event(first.id.to_string()), Some(13_000))
            .await
            .unwrap();
        let state = session(&dir).await.runner("7").await.unwrap();
        assert_eq!(state.lap_count, 1);

        assert!(undo(dir.path(), UndoTarget::Event("nope".into()), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn clear_one_and_all() {
        let dir = setup(TemplateKey::LapOnly, 5).await;
        scan(dir.path(), "1", None, Some(1_000)).await.unwrap();
        scan(dir.path(), "2", None, Some(1_000)).await.unwrap();

        clear(dir.path(), "1", None, Some(2_000)).await.unwrap();
        let standings = session(&dir).await.standings().await.unwrap();
        let laps: Vec<u32> = standings.values().map(|s| s.lap_count).collect();
        assert_eq!(laps, vec![0, 1]);

        clear_all(dir.path(), None, Some(3_000)).await.unwrap();
        let standings = session(&dir).await.standings().await.unwrap();
        assert!(standings.values().all(|s| s.lap_count == 0));
    }
}
