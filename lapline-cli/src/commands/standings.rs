//! Show derived runner standings.

use anyhow::Result;
use lapline_core::{RunnerFlag, RunnerState};
use lapline_types::RunnerId;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Workspace;

/// One row of the standings output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing<'a> {
    /// 1-based position.
    pub rank: usize,
    /// Runner id.
    pub runner_id: &'a RunnerId,
    /// Derived state.
    #[serde(flatten)]
    pub state: &'a RunnerState,
}

/// Order runners: finished first by finish time, then by laps, then by id.
pub fn rank(standings: &BTreeMap<RunnerId, RunnerState>) -> Vec<Standing<'_>> {
    let mut rows: Vec<(&RunnerId, &RunnerState)> = standings.iter().collect();
    rows.sort_by_key(|(runner, state)| {
        (
            state.finished_at_ms.is_none(),
            state.finished_at_ms,
            Reverse(state.lap_count),
            *runner,
        )
    });
    rows.into_iter()
        .enumerate()
        .map(|(i, (runner_id, state))| Standing {
            rank: i + 1,
            runner_id,
            state,
        })
        .collect()
}

fn flag_label(flag: &RunnerFlag) -> &'static str {
    match flag {
        RunnerFlag::SoftMissingCheckpoint => "missed-checkpoint",
        RunnerFlag::StrictMissingCheckpoint => "lap-blocked",
        RunnerFlag::EarlyFinish => "early-finish",
    }
}

fn millis(value: Option<i64>) -> String {
    value.map(|ms| ms.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Render standings as a text table.
pub fn render_table(rows: &[Standing<'_>]) -> String {
    let mut out = format!(
        "{:>4}  {:<12} {:>5}  {:>14}  {:>14}  {}\n",
        "#", "RUNNER", "LAPS", "STARTED", "FINISHED", "FLAGS"
    );
    for row in rows {
        let flags: Vec<&str> = row.state.flags.iter().map(flag_label).collect();
        out.push_str(&format!(
            "{:>4}  {:<12} {:>5}  {:>14}  {:>14}  {}\n",
            row.rank,
            row.runner_id.as_str(),
            row.state.lap_count,
            millis(row.state.started_at_ms),
            millis(row.state.finished_at_ms),
            flags.join(",")
        ));
    }
    out
}

/// Run the standings command.
pub async fn run(data_dir: &Path, json: bool) -> Result<()> {
    let session = Workspace::open(data_dir).await?.active_session().await?;
    let standings = session.standings().await?;
    let rows = rank(&standings);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let record = session.record();
    println!(
        "{} ({}, {} laps)",
        record.name, record.template_key, record.laps_required
    );
    println!();
    if rows.is_empty() {
        println!("No runners yet.");
    } else {
        print!("{}", render_table(&rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(laps: u32, finished: Option<i64>) -> RunnerState {
        RunnerState {
            lap_count: laps,
            finished_at_ms: finished,
            ..RunnerState::initial()
        }
    }

    #[test]
    fn finished_runners_rank_first() {
        let standings = BTreeMap::from([
            (RunnerId::new("a"), state(5, None)),
            (RunnerId::new("b"), state(3, Some(9_000))),
            (RunnerId::new("c"), state(3, Some(8_000))),
            (RunnerId::new("d"), state(2, None)),
            (RunnerId::new("e"), state(5, None)),
        ]);

        let order: Vec<&str> = rank(&standings)
            .iter()
            .map(|row| row.runner_id.as_str())
            .collect();
        assert_eq!(order, vec!["c", "b", "a", "e", "d"]);
    }

    #[test]
    fn json_rows_flatten_state() {
        let mut runner = state(2, Some(22_000));
        runner.flags.insert(RunnerFlag::SoftMissingCheckpoint);
        let standings = BTreeMap::from([(RunnerId::new("7"), runner)]);

        let value = serde_json::to_value(rank(&standings)).unwrap();
        assert_eq!(value[0]["rank"], 1);
        assert_eq!(value[0]["runnerId"], "7");
        assert_eq!(value[0]["lapCount"], 2);
        assert_eq!(value[0]["finishedAtMs"], 22_000);
        assert_eq!(value[0]["flags"][0], "SOFT_MISSING_CHECKPOINT");
    }

    #[test]
    fn table_lists_flags() {
        let mut runner = state(1, None);
        runner.flags.insert(RunnerFlag::EarlyFinish);
        let standings = BTreeMap::from([(RunnerId::new("12"), runner)]);

        let table = render_table(&rank(&standings));
        assert!(table.lines().next().unwrap().contains("RUNNER"));
        assert!(table.contains("12"));
        assert!(table.contains("early-finish"));
    }
}
