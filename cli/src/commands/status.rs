//! Status command - one snapshot.

use anyhow::Result;
use gravitywatch_core::Engine;

use super::render;

pub async fn run(json: bool) -> Result<()> {
    let engine = Engine::new()?;
    let snapshot = engine.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        render::snapshot(&snapshot);
    }
    Ok(())
}
