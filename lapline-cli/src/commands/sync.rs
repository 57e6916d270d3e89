//! Push and pull once.

use anyhow::{Context, Result};
use lapline_client::{
    EventStore, HttpRemote, PullReport, PushReport, Remote, SqliteStore, SyncEngine,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::Workspace;

/// Build the engine for the active session.
pub async fn engine(workspace: &Workspace) -> Result<SyncEngine<SqliteStore, HttpRemote>> {
    let session = workspace.active_session().await?;
    if !session.record().is_paired() {
        anyhow::bail!(
            "Session {} is local only. Pair with 'lapline init --resolution <file> --credential <token>'.",
            session.id()
        );
    }
    let remote = HttpRemote::from_config(&workspace.config.remote)
        .context("Remote not configured. Set [remote] base_url in lapline.toml or pass --remote to init.")?;
    Ok(SyncEngine::new(
        workspace.store.clone(),
        Arc::new(remote),
        session.id().clone(),
    ))
}

/// Run one push and pull with an engine.
///
/// Both halves run and are printed; any failure is returned afterwards.
pub async fn sync_with<S: EventStore, R: Remote>(
    engine: &SyncEngine<S, R>,
) -> Result<(PushReport, PullReport)> {
    let report = engine.sync_once().await;

    match &report.push {
        Ok(PushReport::Skipped) => println!("Push:  skipped"),
        Ok(PushReport::Empty) => println!("Push:  nothing to send"),
        Ok(PushReport::Delivered { accepted, pending }) => {
            println!("Push:  {} accepted, {} pending", accepted, pending)
        }
        Err(e) => println!("Push:  failed ({e})"),
    }
    match &report.pull {
        Ok(pull) if pull.reset => {
            println!("Pull:  {} events (remote reset, pre-reset log replaced)", pull.count)
        }
        Ok(pull) => println!("Pull:  {} events", pull.count),
        Err(e) => println!("Pull:  failed ({e})"),
    }

    report.into_result().context("Sync failed")
}

/// Run the sync command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let engine = engine(&workspace).await?;
    sync_with(&engine).await?;
    Ok(())
}
