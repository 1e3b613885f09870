//! Pipeline commands.

use anyhow::{Context, Result};
use std::path::Path;

pub async fn list(server_url: &str) -> Result<()> {
    let names = super::client(server_url)?.list_pipelines().await?;
    if names.is_empty() {
        println!("No pipelines");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

pub async fn show(server_url: &str, name: &str) -> Result<()> {
    let yaml = super::client(server_url)?.pipeline_yaml(name).await?;
    print!("{}", yaml);
    Ok(())
}

pub async fn create(server_url: &str, path: &Path) -> Result<()> {
    let yaml = read_definition(path)?;
    let name = super::client(server_url)?.save_pipeline(yaml).await?;
    println!("Saved pipeline {}", name);
    Ok(())
}

pub async fn delete(server_url: &str, name: &str) -> Result<()> {
    super::client(server_url)?.delete_pipeline(name).await?;
    println!("Deleted pipeline {}", name);
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let yaml = read_definition(path)?;
    let pipeline = gypsy_config::parse_pipeline(&yaml)
        .with_context(|| format!("Failed to parse pipeline config: {}", path.display()))?;
    println!(
        "Configuration is valid: {} ({} scripts, {} materials, {} artifacts)",
        pipeline.name,
        pipeline.scripts.len(),
        pipeline.materials.len(),
        pipeline.artifacts.len()
    );
    Ok(())
}

fn read_definition(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}
