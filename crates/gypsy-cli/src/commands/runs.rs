//! Run commands.

use anyhow::Result;
use gypsy_core::RunId;

pub async fn list(server_url: &str, pipeline: &str) -> Result<()> {
    let ids = super::client(server_url)?.list_runs(pipeline).await?;
    if ids.is_empty() {
        println!("No runs for {}", pipeline);
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

pub async fn show(server_url: &str, pipeline: &str, id: RunId) -> Result<()> {
    let run = super::client(server_url)?.get_run(pipeline, id).await?;

    let status = if run.success { "✓ succeeded" } else { "✗ failed" };
    println!("{} run {}: {}", run.pipeline_name, run.id, status);
    if let Some(at) = run.completed_at {
        println!("Completed: {}", at.to_rfc3339());
    }
    println!("\n--- stdout ---\n{}", run.stdout);
    println!("\n--- stderr ---\n{}", run.stderr);
    Ok(())
}
