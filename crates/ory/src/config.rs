//! Local defaults file.
//!
//! `~/.config/ory/config.toml` (or `$ORY_CONFIG_DIR/config.toml`) may name
//! the project and API URL to use when the flags are not given:
//!
//! ```toml
//! project = "playground"
//! workspace = "acme"
//! sdk_url = "https://playground.projects.oryapis.com"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Environment variable overriding the config directory.
const CONFIG_DIR_ENV: &str = "ORY_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Defaults read from the config file. Flags and env vars take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub project: Option<String>,
    pub workspace: Option<String>,
    pub sdk_url: Option<String>,
}

/// Directory holding the config file and logs.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join("ory"))
}

impl CliConfig {
    /// Load `explicit`, or the default file when it exists.
    ///
    /// An explicit path must exist; a missing default file yields empty
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match config_dir().map(|d| d.join(CONFIG_FILE)) {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
