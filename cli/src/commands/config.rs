//! Config command - show current configuration.

use anyhow::Result;
use gravitywatch_core::ConfigStore;

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Config file:      {}", store.config_path().display());
    println!("Refresh interval: {}s", config.refresh_interval);
    println!("Scan attempts:    {}", config.scan_attempts);
    println!("Re-scan attempts: {}", config.rescan_attempts);
    println!("Grouping:         {}", if config.grouping_enabled { "enabled" } else { "disabled" });
    println!("Mapped models:    {}", config.group_mappings.len());
    for (model, name) in &config.group_names {
        println!("  {} -> \"{}\"", model, name);
    }
    Ok(())
}
