//! Environment registry
//!
//! Holds one [`EnvConfig`] per environment and tracks which one is active.
//! Readers get an `Arc` snapshot; mutations copy the active config before
//! changing it, so a snapshot held by a running flow never moves underneath it.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use super::config::{find_config_file, ConfigFile};
use super::environment::{EnvConfig, Environment};
use crate::auth::AccountConfig;
use crate::errors::Result;

#[derive(Debug)]
struct RegistryState {
    configs: HashMap<Environment, Arc<EnvConfig>>,
    active: Environment,
}

#[derive(Debug)]
pub struct EnvRegistry {
    state: RwLock<RegistryState>,
    accounts: IndexMap<String, AccountConfig>,
    source: Option<PathBuf>,
}

fn builtin_configs() -> HashMap<Environment, Arc<EnvConfig>> {
    Environment::ALL
        .iter()
        .map(|env| (*env, Arc::new(EnvConfig::builtin(*env))))
        .collect()
}

impl EnvRegistry {
    /// Registry with the built-in configs only
    pub fn builtin(active: Environment) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                configs: builtin_configs(),
                active,
            }),
            accounts: IndexMap::new(),
            source: None,
        }
    }

    /// Registry from a parsed config file; environments the file does not
    /// mention keep their built-in config
    pub fn from_file(file: ConfigFile, active: Environment, source: Option<PathBuf>) -> Self {
        let mut configs = builtin_configs();
        for (env, config) in file.known_environments() {
            configs.insert(env, Arc::new(config));
        }
        Self {
            state: RwLock::new(RegistryState { configs, active }),
            accounts: file.accounts,
            source,
        }
    }

    /// Strict load: a missing or unparseable file is an error
    pub fn load(path: &Path, active: Environment) -> Result<Self> {
        let file = ConfigFile::load(path)?;
        info!(path = %path.display(), env = %active, "Loaded environment config");
        Ok(Self::from_file(file, active, Some(path.to_path_buf())))
    }

    /// Load `path`, or the first config file found, falling back to the
    /// built-in defaults when nothing usable exists
    pub fn load_or_default(path: Option<&Path>, active: Environment) -> Self {
        let candidate = path.map(Path::to_path_buf).or_else(find_config_file);
        let Some(path) = candidate else {
            warn!(env = %active, "No environment config found, using built-in defaults");
            return Self::builtin(active);
        };
        match Self::load(&path, active) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Falling back to built-in environment defaults");
                Self::builtin(active)
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to a private copy of the active config and publish it
    fn modify<F: FnOnce(&mut EnvConfig)>(&self, f: F) {
        let mut state = self.write();
        let active = state.active;
        let entry = state
            .configs
            .entry(active)
            .or_insert_with(|| Arc::new(EnvConfig::builtin(active)));
        f(Arc::make_mut(entry));
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn accounts(&self) -> &IndexMap<String, AccountConfig> {
        &self.accounts
    }

    pub fn active_env(&self) -> Environment {
        self.read().active
    }

    /// Snapshot of the active config
    pub fn current(&self) -> Arc<EnvConfig> {
        let state = self.read();
        self.lookup(&state, state.active)
    }

    pub fn config_for(&self, env: Environment) -> Arc<EnvConfig> {
        let state = self.read();
        self.lookup(&state, env)
    }

    fn lookup(&self, state: &RegistryState, env: Environment) -> Arc<EnvConfig> {
        state
            .configs
            .get(&env)
            .cloned()
            .unwrap_or_else(|| Arc::new(EnvConfig::builtin(env)))
    }

    /// Replace (or add) the config for `env`
    pub fn register(&self, env: Environment, config: EnvConfig) {
        self.write().configs.insert(env, Arc::new(config));
        debug!(env = %env, "Registered environment config");
    }

    pub fn switch(&self, env: Environment) {
        let mut state = self.write();
        if state.active != env {
            info!(from = %state.active, to = %env, "Switching environment");
            state.active = env;
        }
    }

    /// Switch by code; unknown codes fall back to dev
    pub fn switch_code(&self, code: &str) -> Environment {
        let env = Environment::from_code(code);
        self.switch(env);
        env
    }

    pub fn root_url(&self) -> String {
        self.current().root_url.clone()
    }

    pub fn headers(&self) -> IndexMap<String, String> {
        self.current().headers.clone()
    }

    pub fn params(&self) -> IndexMap<String, String> {
        self.current().params.clone()
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.current().params.get(key).cloned()
    }

    /// Static token configured for `account` in the active environment
    pub fn token(&self, account: &str) -> Option<String> {
        self.current().tokens.get(account).cloned()
    }

    pub fn set_token(&self, account: impl Into<String>, token: impl Into<String>) {
        let (account, token) = (account.into(), token.into());
        self.modify(|c| {
            c.tokens.insert(account, token);
        });
    }

    /// `rootUrl` (any case) replaces the root URL; any other key is a param
    pub fn update_config(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if key.eq_ignore_ascii_case("rooturl") {
            info!(root_url = %value, "Updating root URL");
            self.modify(|c| c.root_url = value);
        } else {
            debug!(key = %key, "Updating environment param");
            let key = key.to_string();
            self.modify(|c| {
                c.params.insert(key, value);
            });
        }
    }

    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.modify(|c| {
            c.headers.insert(name, value);
        });
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        let mut removed = None;
        self.modify(|c| removed = c.headers.shift_remove(name));
        removed
    }

    pub fn is_mock_enabled(&self) -> bool {
        self.current().mock.enabled
    }

    pub fn is_database_enabled(&self) -> bool {
        self.current().database.enabled
    }

    /// Drop every runtime change and file override, restoring the built-ins
    pub fn reset(&self) {
        let mut state = self.write();
        state.configs = builtin_configs();
        info!(env = %state.active, "Environment configs reset to built-in defaults");
    }

    /// Human-readable summary of the active environment, also logged
    pub fn describe(&self) -> String {
        let env = self.active_env();
        let config = self.current();
        let mut out = format!(
            "Environment: {} ({})\nRoot URL: {}\nHeaders: {}\nMock: {}\nDatabase: {}",
            env.display_name(),
            env.code(),
            config.root_url,
            config.headers.len(),
            if config.mock.enabled {
                format!("enabled ({}:{})", config.mock.host, config.mock.port)
            } else {
                "disabled".to_string()
            },
            if config.database.enabled { "enabled" } else { "disabled" },
        );
        if !config.params.is_empty() {
            let keys: Vec<&str> = config.params.keys().map(String::as_str).collect();
            out.push_str(&format!("\nParams: {}", keys.join(", ")));
        }
        if !self.accounts.is_empty() {
            let names: Vec<&str> = self.accounts.keys().map(String::as_str).collect();
            out.push_str(&format!("\nAccounts: {}", names.join(", ")));
        }
        info!(
            env = %env,
            root_url = %config.root_url,
            mock = config.mock.enabled,
            database = config.database.enabled,
            "Active environment"
        );
        out
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::builtin(Environment::Dev)
    }
}
