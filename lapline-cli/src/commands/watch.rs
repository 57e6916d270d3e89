//! Run the background sync loop.

use anyhow::Result;
use lapline_client::{EventStore, RaceSession, Remote, SyncEngine};
use lapline_core::SyncEvent;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::commands::sync::engine;
use crate::config::Workspace;

/// Print sync events and re-derived standings until `shutdown` resolves.
pub async fn watch_until<S, R, F>(
    session: &RaceSession<S>,
    engine: &SyncEngine<S, R>,
    push_every: Duration,
    pull_every: Duration,
    shutdown: F,
) -> Result<()>
where
    S: EventStore + 'static,
    R: Remote + 'static,
    F: std::future::Future<Output = ()>,
{
    let mut events = engine.subscribe();
    let handle = engine.spawn(push_every, pull_every);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = events.recv() => match received {
                Ok(event) => report(session, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed sync events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.stop().await;
    println!("Sync stopped.");
    Ok(())
}

async fn report<S: EventStore>(session: &RaceSession<S>, event: &SyncEvent) -> Result<()> {
    match event {
        SyncEvent::Pushed { accepted, pending } => {
            println!("pushed {} ({} pending)", accepted, pending);
        }
        SyncEvent::Pulled { count, reset } => {
            if *reset {
                println!("pulled {} (remote reset)", count);
            } else {
                println!("pulled {}", count);
            }
        }
        SyncEvent::PushFailed { error } => println!("push failed: {}", error),
        SyncEvent::PullFailed { error } => println!("pull failed: {}", error),
        SyncEvent::Stopped => return Ok(()),
    }

    if matches!(event, SyncEvent::Pushed { .. } | SyncEvent::Pulled { .. }) {
        let standings = session.standings().await?;
        let finished = standings
            .values()
            .filter(|s| s.finished_at_ms.is_some())
            .count();
        println!("  {} runners, {} finished", standings.len(), finished);
    }
    Ok(())
}

/// Run the watch command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    if !workspace.config.sync.enabled {
        println!("Sync is disabled in lapline.toml ([sync] enabled = false).");
        return Ok(());
    }

    let session = workspace.active_session().await?;
    let engine = engine(&workspace).await?;
    let sync = &workspace.config.sync;
    println!(
        "Syncing {} (push every {}ms, pull every {}ms). Ctrl-C to stop.",
        session.record().name,
        sync.push_interval_ms,
        sync.pull_interval_ms
    );

    watch_until(
        &session,
        &engine,
        sync.push_interval(),
        sync.pull_interval(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapline_client::{MemoryStore, MockRemote, SessionRecord};
    use lapline_types::StationId;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn watch_syncs_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let mut record = SessionRecord::new("Heat", "lap-only", 1);
        record.credential = Some("t".to_string());
        let session = RaceSession::create(store.clone(), record).await.unwrap();
        session.scan("7", StationId::LapEnd, 1_000).await.unwrap();

        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new(store.clone(), remote.clone(), session.id().clone());

        watch_until(
            &session,
            &engine,
            Duration::from_millis(50),
            Duration::from_millis(50),
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        assert_eq!(remote.events("t").len(), 1);
        assert!(store.unsynced(session.id()).await.unwrap().is_empty());
        assert!(engine.state().stopped);
    }

    #[tokio::test]
    async fn disabled_sync_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(crate::config::CONFIG_FILE),
            "[sync]\nenabled = false\n",
        )
        .unwrap();

        assert!(run(dir.path()).await.is_ok());
    }
}
