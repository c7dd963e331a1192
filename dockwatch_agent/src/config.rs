//! Agent configuration: flat JSON document `{ "Ip": "host:port", "Token": "..." }`.
//! A missing file is created with placeholder values and reported as an error so the
//! operator fills it in before the next run.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "Ip")]
    pub ip: String,
    #[serde(rename = "Token")]
    pub token: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1:8080".into(),
            token: "your_token_here".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found, created {} with default values; edit it and restart", .0.display())]
    Created(PathBuf),
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: \"Ip\" must not be empty", .0.display())]
    MissingAddress(PathBuf),
}

/// Load `path`, or write the default document there and return [`ConfigError::Created`].
pub fn ensure_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        write_default_config(path)?;
        return Err(ConfigError::Created(path.to_path_buf()));
    }
    load_config(path)
}

pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: AgentConfig = serde_json::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if cfg.ip.trim().is_empty() {
        return Err(ConfigError::MissingAddress(path.to_path_buf()));
    }
    Ok(cfg)
}

pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let data = serde_json::to_vec_pretty(&AgentConfig::default()).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    fs::write(path, data).map_err(io_err)
}
