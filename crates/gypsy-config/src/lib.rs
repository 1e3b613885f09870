//! YAML configuration parsing for gypsy.
//!
//! This crate handles parsing of:
//! - Pipeline definitions
//! - Server configuration

pub mod error;
pub mod pipeline;
pub mod server;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{parse_pipeline, render_pipeline};
pub use server::{ArtifactStorage, DispatchMode, LogFormat, SandboxKind, ServerConfig};
