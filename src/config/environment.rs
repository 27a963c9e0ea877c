//! Per-environment settings

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Environment variable consulted when no explicit environment is given
pub const ENV_VAR: &str = "ENV";
/// Profile-style fallback consulted after [`ENV_VAR`]
pub const PROFILE_VAR: &str = "FLOWPULSE_PROFILE";

const DEFAULT_DB_DRIVER: &str = "com.mysql.cj.jdbc.Driver";
const DEFAULT_MOCK_PORT: u16 = 8089;
const DEFAULT_MOCK_HOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Stage,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Test,
        Environment::Stage,
        Environment::Prod,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Environment::Dev => "Development",
            Environment::Test => "Test",
            Environment::Stage => "Staging",
            Environment::Prod => "Production",
        }
    }

    /// Strict lookup by code
    pub fn parse(code: &str) -> Option<Environment> {
        match code.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Environment::Dev),
            "test" => Some(Environment::Test),
            "stage" | "staging" => Some(Environment::Stage),
            "prod" | "production" => Some(Environment::Prod),
            _ => None,
        }
    }

    /// Lookup by code, falling back to dev for anything unrecognised
    pub fn from_code(code: &str) -> Environment {
        Self::parse(code).unwrap_or_else(|| {
            warn!(code = %code, "Unknown environment, falling back to dev");
            Environment::Dev
        })
    }

    /// Pick the environment from, in order: the explicit choice, the `ENV`
    /// variable, the profile variable, then dev.
    pub fn select(explicit: Option<&str>) -> Environment {
        Self::select_from(
            explicit,
            std::env::var(ENV_VAR).ok(),
            std::env::var(PROFILE_VAR).ok(),
        )
    }

    pub fn select_from(
        explicit: Option<&str>,
        env_var: Option<String>,
        profile: Option<String>,
    ) -> Environment {
        let non_empty = |s: &String| !s.trim().is_empty();
        let chosen = explicit
            .map(str::to_string)
            .filter(non_empty)
            .or(env_var.filter(non_empty))
            .or(profile.filter(non_empty));
        match chosen {
            Some(code) => Self::from_code(&code),
            None => Environment::Dev,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Deserialize a map whose values may be any scalar, keeping their text form
pub(crate) fn string_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub driver: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            username: None,
            password: None,
            driver: DEFAULT_DB_DRIVER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockConfig {
    pub enabled: bool,
    pub port: u16,
    pub host: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_MOCK_PORT,
            host: DEFAULT_MOCK_HOST.to_string(),
        }
    }
}

/// Settings for one environment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvConfig {
    pub root_url: String,
    #[serde(deserialize_with = "string_map")]
    pub headers: IndexMap<String, String>,
    #[serde(deserialize_with = "string_map")]
    pub params: IndexMap<String, String>,
    /// Static per-account tokens
    #[serde(deserialize_with = "string_map")]
    pub tokens: IndexMap<String, String>,
    pub database: DatabaseConfig,
    pub mock: MockConfig,
}

impl EnvConfig {
    pub fn with_root_url(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            ..Default::default()
        }
    }

    fn json_defaults(root_url: &str) -> Self {
        let mut config = Self::with_root_url(root_url);
        config.headers.insert("Content-Type".into(), "application/json".into());
        config.headers.insert("Accept".into(), "application/json".into());
        config
    }

    /// Built-in configuration used when no config file is available
    pub fn builtin(env: Environment) -> Self {
        match env {
            Environment::Dev => {
                let mut config = Self::json_defaults("https://jsonplaceholder.typicode.com");
                config.mock.enabled = true;
                config
            }
            Environment::Test => Self::json_defaults("https://api-test.example.com"),
            Environment::Stage => Self::json_defaults("https://api-stage.example.com"),
            Environment::Prod => Self::json_defaults("https://api.example.com"),
        }
    }
}
