//! CLI command implementations.

pub mod artifacts;
pub mod build;
pub mod pipelines;
pub mod runs;
pub mod server;

use anyhow::{Context, Result};
use gypsy_config::{LogFormat, SandboxKind, ServerConfig};
use gypsy_core::SandboxProvider;
use gypsy_executor::{DockerSandboxProvider, ProcessSandboxProvider};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Sandbox provider selected by the configuration.
pub fn sandbox_provider(config: &ServerConfig) -> Result<Arc<dyn SandboxProvider>> {
    Ok(match config.sandbox {
        SandboxKind::Docker => Arc::new(
            DockerSandboxProvider::new(config.ready_timeout())
                .context("Failed to connect to Docker")?,
        ),
        SandboxKind::Process => Arc::new(ProcessSandboxProvider::new(
            config.data_dir.join("workspaces"),
        )),
    })
}

fn client(server_url: &str) -> Result<crate::client::ApiClient> {
    Ok(crate::client::ApiClient::new(server_url)?)
}
