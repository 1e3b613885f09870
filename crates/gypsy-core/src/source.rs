//! Revision sources for materials.

use async_trait::async_trait;

use crate::Result;
use crate::pipeline::Material;

/// Resolves the current upstream revision of a material.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Revision identifier (usually a commit SHA) at the head of the
    /// material's branch.
    async fn current_revision(&self, material: &Material) -> Result<String>;
}
