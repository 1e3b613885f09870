//! Error types for gypsy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The pipeline definition could not be retrieved or parsed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A sandbox could not be created or did not become ready.
    #[error("provisioning failed: {0}")]
    Provision(String),

    /// A command could not be invoked at all. A non-zero exit is not this.
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("artifact failed: {0}")]
    Artifact(String),

    #[error("release failed: {0}")]
    Release(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported material type: {0}")]
    UnsupportedMaterial(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl Error {
    /// Whether the error happened before a run record could exist.
    pub fn precedes_run(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Provision(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
