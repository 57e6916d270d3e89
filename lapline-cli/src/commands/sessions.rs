//! List sessions and switch the active one.

use anyhow::Result;
use lapline_client::EventStore;
use lapline_types::SessionId;
use std::path::Path;

use crate::config::{ActiveSession, Workspace};

/// Run the sessions command.
pub async fn list(data_dir: &Path) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let sessions = workspace.store.sessions().await?;
    let active = ActiveSession::load(data_dir).await.ok().map(|a| a.id());

    if sessions.is_empty() {
        println!("No sessions. Run 'lapline init --name <name>' to create one.");
        return Ok(());
    }

    for record in sessions {
        let marker = if active.as_ref() == Some(&record.id) {
            "*"
        } else {
            " "
        };
        let paired = if record.is_paired() { "paired" } else { "local" };
        println!(
            "{} {}  {}  ({}, {} laps, {})",
            marker, record.id, record.name, record.template_key, record.laps_required, paired
        );
    }
    Ok(())
}

/// Run the use command.
pub async fn select(data_dir: &Path, session_id: &str) -> Result<SessionId> {
    let workspace = Workspace::open(data_dir).await?;
    let id = SessionId::from(session_id.trim());
    let Some(record) = workspace.store.session(&id).await? else {
        anyhow::bail!("No session {}. Run 'lapline sessions' to list them.", session_id);
    };

    ActiveSession::new(&record.id).save(data_dir).await?;
    println!("Active session: {} ({})", record.name, record.id);
    Ok(record.id)
}
