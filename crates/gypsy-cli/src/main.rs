//! Gypsy CLI tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gypsy_config::ServerConfig;
use gypsy_core::RunId;
use std::path::PathBuf;

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "gypsy")]
#[command(about = "Gypsy build orchestrator", long_about = None)]
struct Cli {
    /// Server configuration file (YAML)
    #[arg(short, long, global = true, env = "GYPSY_CONFIG")]
    config: Option<PathBuf>,

    /// API server URL. Defaults to the configured public URL
    #[arg(long, global = true, env = "GYPSY_SERVER_URL")]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller and the HTTP API
    Server,
    /// Build one run of a pipeline and report it to the server
    Build {
        /// Pipeline name
        pipeline: String,
        /// Run sequence number, allocated by the server
        run_id: RunId,
    },
    /// Manage pipelines
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Inspect runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Inspect and download artifacts
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
}

#[derive(Subcommand)]
enum PipelineCommands {
    /// List all pipelines
    List,
    /// Print a pipeline definition
    Show { name: String },
    /// Create or replace a pipeline from a YAML file
    Create {
        /// Path to the pipeline definition
        path: PathBuf,
    },
    /// Delete a pipeline
    Delete { name: String },
    /// Check a pipeline definition without uploading it
    Validate {
        #[arg(default_value = "gypsy.yml")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum RunCommands {
    /// List runs of a pipeline
    List { pipeline: String },
    /// Show a run with its output
    Show { pipeline: String, id: RunId },
}

#[derive(Subcommand)]
enum ArtifactCommands {
    /// List artifacts of a run
    List { pipeline: String, id: RunId },
    /// Download an artifact
    Download {
        pipeline: String,
        id: RunId,
        name: String,
        /// Output file. Defaults to the artifact name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    let config = match path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    commands::init_logging(&config);

    let server_url = cli.server_url.unwrap_or_else(|| config.public_url());

    match cli.command {
        Commands::Server => {
            commands::server::run(config).await?;
        }
        Commands::Build { pipeline, run_id } => {
            commands::build::run(&config, &server_url, &pipeline, run_id).await?;
        }
        Commands::Pipeline { command } => match command {
            PipelineCommands::List => commands::pipelines::list(&server_url).await?,
            PipelineCommands::Show { name } => commands::pipelines::show(&server_url, &name).await?,
            PipelineCommands::Create { path } => {
                commands::pipelines::create(&server_url, &path).await?
            }
            PipelineCommands::Delete { name } => {
                commands::pipelines::delete(&server_url, &name).await?
            }
            PipelineCommands::Validate { path } => commands::pipelines::validate(&path)?,
        },
        Commands::Run { command } => match command {
            RunCommands::List { pipeline } => commands::runs::list(&server_url, &pipeline).await?,
            RunCommands::Show { pipeline, id } => {
                commands::runs::show(&server_url, &pipeline, id).await?
            }
        },
        Commands::Artifact { command } => match command {
            ArtifactCommands::List { pipeline, id } => {
                commands::artifacts::list(&server_url, &pipeline, id).await?
            }
            ArtifactCommands::Download {
                pipeline,
                id,
                name,
                output,
            } => commands::artifacts::download(&server_url, &pipeline, id, &name, output).await?,
        },
    }

    Ok(())
}
