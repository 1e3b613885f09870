//! Sandbox backends for gypsy builds.
//!
//! Provides sandbox implementations for running build commands:
//! - Docker containers (default)
//! - Host processes in scratch directories (development)

pub mod capture;
pub mod docker;
pub mod process;

pub use capture::capture_output;
pub use docker::{DockerSandbox, DockerSandboxProvider};
pub use gypsy_core::sandbox::{CommandOutput, Sandbox, SandboxProvider, minimal_env};
pub use process::{ProcessSandbox, ProcessSandboxProvider};
