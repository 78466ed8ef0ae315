//! Configuration for the LSP client, loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const fn default_graceful_exit_ms() -> u64 {
    250
}

const fn default_kill_grace_ms() -> u64 {
    1000
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct LspConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Which language server to run.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable command (e.g. "clangd"), resolved on `PATH`.
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// LSP language identifier used for `didOpen` (e.g. "cpp").
    pub language_id: String,
    /// Workspace root directory. Defaults to the current directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Timing bounds for stopping a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// How long a ready server gets to exit after `shutdown`/`exit`.
    #[serde(default = "default_graceful_exit_ms")]
    pub graceful_exit_ms: u64,
    /// How long to wait for the process to be reaped after a kill.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            graceful_exit_ms: default_graceful_exit_ms(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn graceful_exit(&self) -> Duration {
        Duration::from_millis(self.graceful_exit_ms)
    }

    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl LspConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
