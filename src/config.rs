//! Configuration, persisted as TOML.
//!
//! Resolution order for the file: `--config PATH`, then
//! `$XDG_CONFIG_HOME/damage-intake/config.toml` (falling back to
//! `~/.config/damage-intake/config.toml`), then built-in defaults. The weather
//! credential may also come from `WEATHER_API_KEY`.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::OllamaConfig;
use crate::pipeline::PipelineConfig;
use crate::weather::WeatherConfig;

/// Environment variable holding the weather API credential.
pub const WEATHER_API_KEY_ENV: &str = "WEATHER_API_KEY";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(intake::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(intake::config::parse),
        help("Check the TOML syntax; `damage-intake config init` writes a valid starting file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(intake::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Everything the collaborator clients and the pipeline need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub ollama: OllamaConfig,
    pub weather: WeatherConfig,
    pub pipeline: PipelineConfig,
}

impl IntakeConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml().map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Resolve the config: explicit path, else the default file if present, else defaults.
    /// Applies the environment credential afterwards.
    pub fn resolve(explicit: Option<&Path>) -> ConfigResult<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_path() {
                Some(path) if path.is_file() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env_credentials())
    }

    /// Override `weather.api_key` from [`WEATHER_API_KEY_ENV`] when it is set.
    pub fn with_env_credentials(self) -> Self {
        self.with_api_key(std::env::var(WEATHER_API_KEY_ENV).ok())
    }

    /// Override `weather.api_key` when `key` is non-empty.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.weather.api_key = key.trim().to_string();
        }
        self
    }
}

/// `$XDG_CONFIG_HOME/damage-intake/config.toml`, or `~/.config/...` without it.
pub fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("damage-intake").join("config.toml"))
}
