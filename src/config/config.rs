//! Config file handling

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::environment::{EnvConfig, Environment};
use crate::auth::AccountConfig;
use crate::errors::{FlowpulseError, Result};

/// File name looked up in the working directory and the config dir
pub const CONFIG_FILE_NAME: &str = "env-config.yml";

/// Config and suite files larger than this are rejected before parsing
pub const MAX_DOCUMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Contents of an environment config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Keyed by environment code; unknown codes are ignored with a warning
    pub environments: HashMap<String, EnvConfig>,
    pub accounts: IndexMap<String, AccountConfig>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        load_document(path).map_err(|e| match e {
            FlowpulseError::Configuration(_) => e,
            other => FlowpulseError::Configuration(format!(
                "Failed to load {}: {}",
                path.display(),
                other
            )),
        })
    }

    /// Environments keyed by their parsed code
    pub fn known_environments(&self) -> Vec<(Environment, EnvConfig)> {
        let mut known = Vec::new();
        for (code, config) in &self.environments {
            match Environment::parse(code) {
                Some(env) => known.push((env, config.clone())),
                None => tracing::warn!(code = %code, "Ignoring unknown environment in config file"),
            }
        }
        known.sort_by_key(|(env, _)| *env);
        known
    }
}

/// Read a YAML or TOML document, chosen by file extension
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let metadata = fs::metadata(path)?;
    let file_size = metadata.len();
    if file_size > MAX_DOCUMENT_SIZE {
        return Err(FlowpulseError::Configuration(format!(
            "{} is too large: {} bytes (max {} bytes)",
            path.display(),
            file_size,
            MAX_DOCUMENT_SIZE
        )));
    }

    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|e| {
            FlowpulseError::Configuration(format!("Invalid TOML in {}: {}", path.display(), e))
        }),
        _ => serde_yaml::from_str(&content).map_err(|e| {
            FlowpulseError::Configuration(format!("Invalid YAML in {}: {}", path.display(), e))
        }),
    }
}

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("flowpulse"))
        .unwrap_or_else(|| PathBuf::from(".flowpulse"))
}

/// First existing config file: working directory, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    [
        PathBuf::from(CONFIG_FILE_NAME),
        default_config_dir().join(CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|p| p.is_file())
}
