//! Pipeline, material, script and artifact definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::sandbox::DEFAULT_WORKING_DIR;

/// A named build definition.
///
/// The name is the primary key everywhere in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    /// Base image the sandbox is cloned from.
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactSpec>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: container.into(),
            materials: Vec::new(),
            scripts: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.artifacts.push(ArtifactSpec {
            name: name.into(),
            path: path.into(),
        });
        self
    }
}

/// A watched change source attached to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// Type tag, e.g. `github`.
    #[serde(rename = "type")]
    pub material_type: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Material {
    pub fn new(material_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            material_type: material_type.into(),
            uri: uri.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> MaterialKind {
        MaterialKind::from_tag(&self.material_type)
    }

    /// Branch to follow, from the `branch` metadata entry.
    pub fn branch(&self) -> &str {
        self.metadata
            .get("branch")
            .map(String::as_str)
            .unwrap_or("master")
    }

    /// Key under which the watermark of this material is stored.
    pub fn watermark_key(&self) -> String {
        format!("{}:{}@{}", self.material_type, self.uri, self.branch())
    }
}

/// The closed set of material kinds the poller knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// `owner/repo` on GitHub, resolved through the refs API.
    Github,
    /// Any git remote, resolved with `git ls-remote`.
    Git,
    /// Recognized but not supported. Skipped by the poller.
    Unsupported(String),
}

impl MaterialKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "github" => MaterialKind::Github,
            "git" => MaterialKind::Git,
            _ => MaterialKind::Unsupported(tag.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, MaterialKind::Unsupported(_))
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialKind::Github => write!(f, "github"),
            MaterialKind::Git => write!(f, "git"),
            MaterialKind::Unsupported(tag) => write!(f, "{}", tag),
        }
    }
}

/// One build command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl Script {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn working_dir(&self) -> &str {
        match self.cwd.as_deref() {
            Some(cwd) if !cwd.is_empty() => cwd,
            _ => DEFAULT_WORKING_DIR,
        }
    }
}

/// A file collected from the sandbox after a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub path: String,
}
