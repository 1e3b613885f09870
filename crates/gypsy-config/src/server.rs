//! Server configuration.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of the `gypsy server` process.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `gypsy.db`.
    pub data_dir: PathBuf,
    /// Where file-backed artifacts live. Defaults to `<data_dir>/artifacts`.
    pub artifact_dir: Option<PathBuf>,
    pub bind_addr: String,
    /// Seconds between poll cycles.
    pub polling_frequency: u64,
    pub artifact_storage: ArtifactStorage,
    pub sandbox: SandboxKind,
    /// Seconds to wait for a new sandbox to become ready.
    pub ready_timeout: u64,
    pub dispatch: DispatchMode,
    pub nomad_addr: String,
    /// Address external build jobs use to reach this server.
    pub server_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Token for the GitHub API. Unauthenticated requests are rate limited.
    pub github_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            artifact_dir: None,
            bind_addr: "127.0.0.1:5678".to_string(),
            polling_frequency: 300,
            artifact_storage: ArtifactStorage::default(),
            sandbox: SandboxKind::default(),
            ready_timeout: 30,
            dispatch: DispatchMode::default(),
            nomad_addr: "http://127.0.0.1:4646".to_string(),
            server_url: None,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            github_token: None,
        }
    }
}

/// How artifact blobs are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStorage {
    /// Bytes live in files under the artifact directory; the store keeps paths.
    #[default]
    Files,
    /// Bytes live in the database.
    Inline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    #[default]
    Docker,
    /// Host processes in scratch directories. Not isolated.
    Process,
}

/// Where triggered builds run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Local,
    Nomad,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ServerConfig {
    /// Parse configuration from YAML text and validate it.
    pub fn parse(yaml: &str) -> ConfigResult<Self> {
        let config: ServerConfig = if yaml.trim().is_empty() {
            ServerConfig::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("data_dir".to_string()));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::MissingField("bind_addr".to_string()));
        }
        self.socket_addr()?;
        if self.polling_frequency == 0 {
            return Err(ConfigError::invalid(
                "polling_frequency",
                "must be greater than zero",
            ));
        }
        if self.ready_timeout == 0 {
            return Err(ConfigError::invalid(
                "ready_timeout",
                "must be greater than zero",
            ));
        }
        if self.dispatch == DispatchMode::Nomad {
            if self.nomad_addr.trim().is_empty() {
                return Err(ConfigError::MissingField("nomad_addr".to_string()));
            }
            if self.server_url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    "server_url",
                    "required when dispatch is nomad",
                ));
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| ConfigError::invalid("bind_addr", format!("{}", e)))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("gypsy.db")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("artifacts"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling_frequency)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout)
    }

    /// URL build jobs use to reach the HTTP facade.
    pub fn public_url(&self) -> String {
        match &self.server_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.bind_addr, "127.0.0.1:5678");
        assert_eq!(config.polling_frequency, 300);
        assert_eq!(config.db_path(), PathBuf::from("data/gypsy.db"));
        assert_eq!(config.artifact_dir(), PathBuf::from("data/artifacts"));
        assert_eq!(config.artifact_storage, ArtifactStorage::Files);
        assert_eq!(config.sandbox, SandboxKind::Docker);
        assert_eq!(config.dispatch, DispatchMode::Local);
        assert_eq!(config.ready_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_override() {
        let config = ServerConfig::parse(
            "data_dir: /var/lib/gypsy\npolling_frequency: 60\nsandbox: process\nlog_format: json\n",
        )
        .unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/gypsy/gypsy.db"));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.sandbox, SandboxKind::Process);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.bind_addr, "127.0.0.1:5678");
    }

    #[test]
    fn test_explicit_artifact_dir() {
        let config = ServerConfig::parse("artifact_dir: /srv/artifacts\n").unwrap();
        assert_eq!(config.artifact_dir(), PathBuf::from("/srv/artifacts"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ServerConfig::parse("polling_frequency: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "polling_frequency"));
    }

    #[test]
    fn test_bad_bind_addr_rejected() {
        assert!(ServerConfig::parse("bind_addr: not-an-addr\n").is_err());
        assert!(ServerConfig::parse("bind_addr: ''\n").is_err());
    }

    #[test]
    fn test_unknown_sandbox_rejected() {
        assert!(matches!(
            ServerConfig::parse("sandbox: lxc\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_nomad_requires_server_url() {
        assert!(ServerConfig::parse("dispatch: nomad\n").is_err());
        let config =
            ServerConfig::parse("dispatch: nomad\nserver_url: http://10.0.0.1:5678/\n").unwrap();
        assert_eq!(config.public_url(), "http://10.0.0.1:5678");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr: 0.0.0.0:8080").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
        assert_eq!(config.public_url(), "http://0.0.0.0:8080");
    }
}
