//! Export the OpenAPI specification as JSON
//!
//! Usage:
//!   cargo run --bin export_openapi > openapi.json
//!   cargo run --bin export_openapi -- --output docs/openapi.json

use anyhow::{Context, Result};
use inventory_transfer::gateway::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize OpenAPI spec")?;

    let args: Vec<String> = std::env::args().collect();
    match args.iter().position(|a| a == "--output").and_then(|i| args.get(i + 1)) {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path))?;
            eprintln!("OpenAPI spec exported to: {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
