//! Watch command - poll until Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use gravitywatch_core::{Engine, ErrorCategory};

use super::render;

pub async fn run(interval: Option<u64>, json: bool) -> Result<()> {
    let engine = Engine::new()?;

    engine.reactor().on_telemetry(move |snapshot| {
        if json {
            match serde_json::to_string(snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to serialize snapshot: {}", e),
            }
        } else {
            println!("== {} ==", snapshot.timestamp.format("%H:%M:%S"));
            render::snapshot(snapshot);
            println!();
        }
    });
    engine.reactor().on_malfunction(|error| {
        let kind = match error.category() {
            ErrorCategory::BackendUnreachable => "language server unreachable",
            ErrorCategory::BackendError => "language server error",
            ErrorCategory::Defect => "unexpected error",
        };
        eprintln!("{}: {}", kind, error);
    });

    let interval = interval.map(|secs| Duration::from_secs(secs.max(1)));
    engine.launch(interval).await?;

    tokio::signal::ctrl_c().await?;
    engine.shutdown();
    Ok(())
}
