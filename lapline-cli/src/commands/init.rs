//! Create a capture session.

use anyhow::{Context, Result};
use lapline_client::{ClientConfig, RaceSession, RunnerIdFormat, SessionRecord};
use lapline_core::{Enforcement, TemplateKey};
use lapline_types::{SessionId, TokenResolution};
use std::path::Path;

use crate::config::{ActiveSession, Workspace, CONFIG_FILE};

/// Parameters of a local, unpaired session.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Display name.
    pub name: String,
    /// Course template.
    pub template: TemplateKey,
    /// Laps required.
    pub laps: u32,
    /// Accepted runner-id shape.
    pub format: RunnerIdFormat,
    /// Enforcement override.
    pub enforcement: Option<Enforcement>,
    /// Scan-gap override in milliseconds.
    pub scan_gap_ms: Option<i64>,
}

/// Run the init command for a local session.
pub async fn run(data_dir: &Path, new: NewSession) -> Result<SessionId> {
    let mut record = SessionRecord::new(new.name, new.template.as_str(), new.laps);
    record.runner_id_format = new.format;
    record.enforcement = new.enforcement;
    record.scan_gap_ms = new.scan_gap_ms;
    activate(data_dir, record).await
}

/// Run the init command for a session paired through a token resolution.
pub async fn run_paired(
    data_dir: &Path,
    resolution_path: &Path,
    credential: &str,
    format: RunnerIdFormat,
) -> Result<SessionId> {
    let json = tokio::fs::read_to_string(resolution_path)
        .await
        .with_context(|| format!("Failed to read {}", resolution_path.display()))?;
    let resolution = TokenResolution::from_json(&json).context("Invalid token resolution")?;

    let mut record = SessionRecord::from_resolution(&resolution, credential);
    record.runner_id_format = format;
    activate(data_dir, record).await
}

/// Store the remote base URL in `lapline.toml`, keeping other settings.
pub fn set_remote(data_dir: &Path, base_url: &str) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let mut config = ClientConfig::load_or_default(&path).context("Failed to load lapline.toml")?;
    config.remote.base_url = Some(base_url.trim_end_matches('/').to_string());
    config.save(&path).context("Failed to save lapline.toml")?;
    println!("Remote set to {}", base_url);
    Ok(())
}

async fn activate(data_dir: &Path, record: SessionRecord) -> Result<SessionId> {
    let workspace = Workspace::open(data_dir).await?;
    let session = RaceSession::create(workspace.store.clone(), record).await?;
    ActiveSession::new(session.id()).save(data_dir).await?;

    let record = session.record();
    println!("Session created and active!");
    println!();
    println!("  ID:       {}", record.id);
    println!("  Name:     {}", record.name);
    println!("  Template: {}", record.template_key);
    println!("  Laps:     {}", record.laps_required);
    println!("  Stations: {}", station_list(&session));
    println!(
        "  Paired:   {}",
        if record.is_paired() { "yes" } else { "no" }
    );
    println!();
    println!("Next steps:");
    println!("  lapline scan <runner>");
    println!("  lapline standings");

    Ok(session.id().clone())
}

fn station_list<S: lapline_client::EventStore>(session: &RaceSession<S>) -> String {
    session
        .config()
        .station_order
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
