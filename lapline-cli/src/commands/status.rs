//! Show session and sync status.

use anyhow::Result;
use lapline_client::{now_ms, EventStore, Origin};
use std::path::Path;

use crate::config::{ActiveSession, Workspace};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== lapline status ===");
    println!();

    let workspace = Workspace::open(data_dir).await?;
    println!("Data dir: {}", data_dir.display());
    println!(
        "Remote:   {}",
        workspace
            .config
            .remote
            .base_url
            .as_deref()
            .unwrap_or("NOT CONFIGURED")
    );
    println!();

    if !ActiveSession::exists(data_dir).await {
        println!("Session: NONE");
        println!();
        println!("Run 'lapline init --name <name>' to create one.");
        return Ok(());
    }

    let session = workspace.active_session().await?;
    let record = session.record();
    println!("Session:");
    println!("  ID:       {}", record.id);
    println!("  Name:     {}", record.name);
    println!(
        "  Template: {} ({} laps)",
        record.template_key, record.laps_required
    );
    println!("  Format:   {}", record.runner_id_format.as_str());
    if let Some(enforcement) = record.enforcement {
        println!("  Enforce:  {}", enforcement.as_str());
    }
    println!("  Created:  {}", format_age(record.created_at_ms));
    println!();

    let stored = workspace.store.stored_events(&record.id).await?;
    let pending = stored.iter().filter(|s| !s.is_synced()).count();
    let remote = stored.iter().filter(|s| s.origin == Origin::Remote).count();
    println!("Events:");
    println!("  Total:    {}", stored.len());
    println!("  Pending:  {}", pending);
    println!("  From remote: {}", remote);
    println!();

    println!("Sync:");
    match (&record.credential, &record.remote_session_id) {
        (Some(_), remote_id) => {
            println!("  Paired:    yes (remote session {})", remote_id.as_deref().unwrap_or("-"));
            println!("  Watermark: {}ms", record.pull_watermark_ms);
            println!("  Last reset: {}ms", record.reset_watermark_ms);
        }
        (None, _) => println!("  Paired:    no (local only)"),
    }

    Ok(())
}

/// Format a millisecond timestamp as a human-readable age.
fn format_age(ts_ms: i64) -> String {
    let diff = now_ms().saturating_sub(ts_ms).max(0) / 1_000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
