//! Persisted relay settings (`config.json`).
//!
//! Lives in the platform config directory, e.g. `~/.config/agent-relay/` on
//! Linux. Command-line flags override whatever is loaded here.

use crate::ipc;
use crate::query::{PermissionMode, QueryOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Relay settings (persisted to config.json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Permission mode handed to the agent
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Working directory for queries; the process cwd when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Agent executable
    #[serde(default = "default_agent_program")]
    pub agent_program: String,
    /// Extra agent arguments (e.g. `["--model", "sonnet"]`)
    #[serde(default)]
    pub agent_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_socket: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_socket: Option<PathBuf>,
}

fn default_agent_program() -> String {
    "claude".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            cwd: None,
            agent_program: default_agent_program(),
            agent_args: Vec::new(),
            inbound_socket: None,
            notify_socket: None,
        }
    }
}

impl Config {
    pub fn query_options(&self) -> QueryOptions {
        let mut options = QueryOptions {
            permission_mode: self.permission_mode,
            ..QueryOptions::default()
        };
        if let Some(cwd) = &self.cwd {
            options.cwd = cwd.clone();
        }
        options
    }

    pub fn inbound_socket(&self) -> PathBuf {
        self.inbound_socket
            .clone()
            .unwrap_or_else(ipc::inbound_socket_path)
    }

    pub fn notify_socket(&self) -> PathBuf {
        self.notify_socket
            .clone()
            .unwrap_or_else(ipc::notify_socket_path)
    }
}

/// Relay config directory (e.g. `~/.config/agent-relay/`).
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("agent-relay"))
}

/// Location of `config.json`, if the platform has a config directory.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

/// Load config from disk, returning defaults if the file is missing or invalid.
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    load_config_from(&path)
}

/// Save config to disk.
pub fn save_config(config: &Config) -> Result<PathBuf, std::io::Error> {
    let path = config_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "config dir not found")
    })?;
    save_config_to(config, &path)?;
    Ok(path)
}

fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

fn save_config_to(config: &Config, path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Write bytes to a file atomically: write to a temp file in the same
/// directory, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
