//! Revision sources per material kind.

pub mod git;
pub mod github;

use gypsy_core::{MaterialKind, RevisionSource};
use std::collections::HashMap;
use std::sync::Arc;

pub use git::GitSource;
pub use github::GithubSource;

/// Maps material kinds to the source that resolves them.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<MaterialKind, Arc<dyn RevisionSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the GitHub and git sources.
    pub fn standard(github_token: Option<String>) -> Self {
        Self::new()
            .with(MaterialKind::Github, Arc::new(GithubSource::new(github_token)))
            .with(MaterialKind::Git, Arc::new(GitSource::new()))
    }

    pub fn with(mut self, kind: MaterialKind, source: Arc<dyn RevisionSource>) -> Self {
        self.sources.insert(kind, source);
        self
    }

    /// Source for a kind. `None` for unsupported kinds.
    pub fn get(&self, kind: &MaterialKind) -> Option<&Arc<dyn RevisionSource>> {
        if !kind.is_supported() {
            return None;
        }
        self.sources.get(kind)
    }
}
