//! Configuration for Intake
//!
//! Read from `$INTAKE_HOME/config.toml` unless a path is given. A missing
//! file means defaults.

use intake_logging::intake_home;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("page_size must be at least 1")]
    ZeroPageSize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// SQLite database holding schemas, documents and assignments
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Fields per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Directory scanned by `import-schema` when given a bare name
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
}

fn default_database_path() -> PathBuf {
    intake_home().join("intake.sqlite3")
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_schema_dir() -> PathBuf {
    intake_home().join("schemas")
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            page_size: default_page_size(),
            schema_dir: default_schema_dir(),
        }
    }
}

/// `$INTAKE_HOME/config.toml`
pub fn default_config_path() -> PathBuf {
    intake_home().join("config.toml")
}

impl IntakeConfig {
    /// Load from `path`, or the default location. Missing file gives defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: IntakeConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }
}
