//! Server configuration, loaded from `orchestrator-server.toml`, mirroring
//! the teacher's `config::server::ServerConfig` loading pattern
//! (`CONFIG_PATH` env var, then a couple of conventional relative paths)
//! but trimmed to what this workspace's core actually needs: a bind
//! address, the SQLite path, and the delegation/timeout/TTL defaults a
//! node's [`graph_core::graph::NodeConfig`] may leave unset. SSL, LDAP, and
//! user-login security modes are task-management-server concerns with no
//! counterpart in this workspace's scope (see DESIGN.md) and are not
//! carried over.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("no configuration file found; set CONFIG_PATH or place orchestrator-server.toml in config/")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self { name: default_server_name(), host: default_host(), port: default_port() }
    }
}

fn default_server_name() -> String {
    "orchestrator-server".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

fn default_database_path() -> String {
    "orchestrator.db".to_string()
}

/// Defaults applied when a [`graph_core::graph::NodeConfig`] leaves the
/// corresponding delegation field unset (spec.md §4.3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationDefaults {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for DelegationDefaults {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            timeout_s: default_timeout_s(),
            max_retries: default_max_retries(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.7
}
fn default_timeout_s() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_rounds() -> u32 {
    5
}

/// Human-input pause handling (spec.md §4.6 "Cancellation / stale cleanup").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInputConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for HumanInputConfig {
    fn default() -> Self {
        Self { ttl_seconds: default_ttl_seconds() }
    }
}

fn default_ttl_seconds() -> u64 {
    3600
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerInfoConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub delegation: DelegationDefaults,
    #[serde(default)]
    pub human_input: HumanInputConfig,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ServerConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// `CONFIG_PATH` env var, then a couple of conventional relative paths,
    /// then built-in defaults - a missing file is not fatal, unlike the
    /// teacher's server (which requires SSL/LDAP settings to be explicit).
    pub fn load() -> Self {
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            if let Ok(config) = Self::from_file(&config_path) {
                return config;
            }
            tracing::warn!(path = %config_path, "CONFIG_PATH set but unreadable/invalid, using defaults");
        }

        for path in [PathBuf::from("config/orchestrator-server.toml"), PathBuf::from("orchestrator-server.toml")] {
            if path.exists() {
                if let Ok(config) = Self::from_file(&path) {
                    return config;
                }
            }
        }

        Self::default()
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn human_input_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.human_input.ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_partial_toml_document() {
        let toml_content = r#"
[server]
port = 9090

[delegation]
confidence_threshold = 0.6
"#;
        let config = ServerConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.delegation.confidence_threshold, 0.6);
        assert_eq!(config.delegation.max_retries, 3);
    }

    #[test]
    fn defaults_when_no_file_is_found() {
        std::env::remove_var("CONFIG_PATH");
        let config = ServerConfig::load();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.human_input.ttl_seconds, 3600);
    }

    #[test]
    fn bind_addr_and_database_url_are_formatted() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.database_url(), "sqlite://orchestrator.db");
    }
}
