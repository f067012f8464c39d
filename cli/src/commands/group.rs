//! Group commands - manage quota groups.

use anyhow::{bail, Result};
use gravitywatch_core::{Engine, QuotaSnapshot};
use tracing::warn;

use super::render;

/// Fetch a snapshot when the server is reachable; grouping edits work without one.
async fn try_status(engine: &Engine) -> Option<QuotaSnapshot> {
    match engine.status().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "No live telemetry");
            None
        }
    }
}

fn print_groups(snapshot: Option<&QuotaSnapshot>, json: bool) -> Result<()> {
    let groups = snapshot.and_then(|s| s.groups.as_deref());
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    match groups {
        Some(groups) => render::groups(groups),
        None => println!("Grouping is disabled."),
    }
    Ok(())
}

pub async fn auto(json: bool) -> Result<()> {
    let engine = Engine::new()?;
    engine.status().await?;
    let mappings = engine.auto_group().await?;
    if !json {
        println!("Grouped {} models.\n", mappings.len());
    }
    print_groups(engine.reactor().latest_snapshot().as_ref(), json)
}

pub async fn set_enabled(enabled: bool, json: bool) -> Result<()> {
    let engine = Engine::new()?;
    try_status(&engine).await;
    let snapshot = engine.set_grouping_enabled(enabled).await?;
    if !json {
        println!("Grouping {}.\n", if enabled { "enabled" } else { "disabled" });
    }
    if enabled {
        print_groups(snapshot.as_ref(), json)?;
    }
    Ok(())
}

pub async fn rename(model_id: &str, name: &str, json: bool) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Group name cannot be empty");
    }
    let engine = Engine::new()?;
    try_status(&engine).await;
    let snapshot = engine.rename_group(model_id, name).await?;
    if !json {
        println!("Renamed group of {} to \"{}\".\n", model_id, name.trim());
    }
    print_groups(snapshot.as_ref(), json)
}

pub async fn show(json: bool) -> Result<()> {
    let engine = Engine::new()?;
    let snapshot = engine.status().await?;
    print_groups(Some(&snapshot), json)
}
