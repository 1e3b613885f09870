//! Core domain types and traits for the gypsy build orchestrator.
//!
//! This crate contains:
//! - Pipeline, material, script and artifact definitions
//! - Run records
//! - The sandbox traits implemented by execution backends
//! - The revision source trait implemented by material backends

pub mod error;
pub mod pipeline;
pub mod run;
pub mod sandbox;
pub mod source;

pub use error::{Error, Result};
pub use pipeline::{ArtifactSpec, Material, MaterialKind, Pipeline, Script};
pub use run::{OutputLog, Run, RunId};
pub use sandbox::{CommandOutput, Sandbox, SandboxProvider};
pub use source::RevisionSource;
