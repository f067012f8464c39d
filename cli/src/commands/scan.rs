//! Scan command - discovery only.

use anyhow::Result;
use gravitywatch_core::Engine;
use serde_json::json;

pub async fn run(json: bool) -> Result<()> {
    let engine = Engine::new()?;
    let result = engine.scan().await;
    let diagnostics = engine.hunter().last_diagnostics();

    if json {
        // The token stays out of the output
        let output = json!({
            "processName": engine.hunter().strategy().process_name(),
            "connectPort": result.as_ref().ok().map(|r| r.connect_port),
            "extensionPort": result.as_ref().ok().and_then(|r| r.extension_port),
            "error": result.as_ref().err().map(|e| e.to_string()),
            "diagnostics": diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &result {
        Ok(found) => println!("Language server found: {}", found),
        Err(e) => println!("Language server not found: {}", e),
    }
    println!("  method:     {}", diagnostics.scan_method);
    println!("  process:    {}", diagnostics.target_process_name);
    println!("  attempts:   {}", diagnostics.attempt_count);
    println!("  candidates: {}", diagnostics.candidates_found);
    if let Some(ports) = &diagnostics.listening_ports {
        println!("  ports:      {:?}", ports);
    }

    if result.is_err() {
        let messages = engine.hunter().strategy().error_messages();
        println!("\nRequires: {}", messages.requirements.join(", "));
    }

    result.map(|_| ()).map_err(Into::into)
}
