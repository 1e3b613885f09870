//! Artifact commands.

use anyhow::{Context, Result};
use gypsy_core::RunId;
use std::path::PathBuf;

pub async fn list(server_url: &str, pipeline: &str, id: RunId) -> Result<()> {
    let names = super::client(server_url)?.list_artifacts(pipeline, id).await?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

pub async fn download(
    server_url: &str,
    pipeline: &str,
    id: RunId,
    name: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let data = super::client(server_url)?
        .get_artifact(pipeline, id, name)
        .await?;
    let output = output.unwrap_or_else(|| PathBuf::from(name));
    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} bytes to {}", data.len(), output.display());
    Ok(())
}
