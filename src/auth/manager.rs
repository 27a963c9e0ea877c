//! Per-account token lifecycle
//!
//! Tokens are cached per account and renewed on demand: a missing or
//! expired token triggers a refresh when a live refresh token exists, and a
//! full login otherwise. A failed refresh always degrades to a login. An
//! optional background thread renews expired tokens on a fixed interval.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::account::AccountConfig;
use super::token::TokenInfo;
use crate::errors::{FlowpulseError, Result};
use crate::http::{join_url, HttpRequest, HttpTransport, Method};
use crate::logging::mask_secret;
use crate::validation::{render, Located, ResponseView};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ACCOUNT: &str = "default";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Tokens pulled out of a login or refresh response
struct IssuedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

/// State shared with the scheduler thread
struct TokenStore {
    root_url: RwLock<String>,
    transport: Arc<dyn HttpTransport>,
    accounts: DashMap<String, AccountConfig>,
    cache: DashMap<String, TokenInfo>,
    /// Serializes login/refresh per account
    locks: DashMap<String, Arc<Mutex<()>>>,
}

struct Scheduler {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct TokenManager {
    store: Arc<TokenStore>,
    current: RwLock<String>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("root_url", &self.store.root_url())
            .field("accounts", &self.store.accounts.len())
            .field("cached", &self.store.cache.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TokenStore {
    fn root_url(&self) -> String {
        self.root_url
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn account(&self, name: &str) -> Result<AccountConfig> {
        self.accounts
            .get(name)
            .map(|a| a.value().clone())
            .ok_or_else(|| {
                FlowpulseError::Configuration(format!("No account configured for '{}'", name))
            })
    }

    fn account_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn fresh(&self, name: &str) -> Option<TokenInfo> {
        self.cache
            .get(name)
            .filter(|t| !t.is_expired())
            .map(|t| t.value().clone())
    }

    /// Cached token if still valid, otherwise refresh-or-login
    fn ensure(&self, name: &str) -> Result<TokenInfo> {
        if let Some(token) = self.fresh(name) {
            return Ok(token);
        }
        let account_lock = self.account_lock(name);
        let _guard = lock(&account_lock);
        // another caller may have renewed while we waited
        if let Some(token) = self.fresh(name) {
            return Ok(token);
        }
        self.renew_locked(name)
    }

    fn renew_locked(&self, name: &str) -> Result<TokenInfo> {
        let can_refresh = self.cache.get(name).is_some_and(|t| t.can_refresh());
        if can_refresh {
            self.refresh_locked(name)
        } else {
            self.login_locked(name)
        }
    }

    fn post(&self, url: &str, body: &serde_json::Value) -> Result<(u16, String)> {
        let request = HttpRequest::new(Method::Post, url).with_json_body(body.to_string());
        let response = self.transport.send(&request)?;
        Ok((response.status, response.body))
    }

    fn login_locked(&self, name: &str) -> Result<TokenInfo> {
        let config = self.account(name)?;
        let url = join_url(&self.root_url(), &config.login_url);
        info!(account = %name, url = %url, "Logging in");

        let (status, body) = self.post(&url, &config.login_body()).map_err(|e| {
            FlowpulseError::Authentication(format!("Login failed for '{}': {}", name, e))
        })?;
        if status != 200 {
            error!(account = %name, status, "Login rejected");
            return Err(FlowpulseError::Authentication(format!(
                "Login failed for '{}': status {}",
                name, status
            )));
        }
        debug!(account = %name, body = %body, "Login response");

        let issued = parse_issued(&config, &body, None).ok_or_else(|| {
            FlowpulseError::Authentication(format!(
                "Login response for '{}' has no token at {}",
                name, config.token_path
            ))
        })?;
        let info = TokenInfo::with_refresh(
            issued.access_token,
            issued.refresh_token,
            Duration::from_secs(issued.expires_in),
        );
        info!(
            account = %name,
            token = %mask_secret(&info.access_token),
            expires_in = issued.expires_in,
            "Login succeeded"
        );
        self.cache.insert(name.to_string(), info.clone());
        Ok(info)
    }

    fn refresh_locked(&self, name: &str) -> Result<TokenInfo> {
        let Some(current) = self.cache.get(name).map(|t| t.value().clone()) else {
            warn!(account = %name, "No cached token to refresh, logging in");
            return self.login_locked(name);
        };
        let Some(refresh_token) = current.refresh_token.clone() else {
            warn!(account = %name, "No refresh token, logging in");
            return self.login_locked(name);
        };
        let config = self.account(name)?;
        let Some(refresh_path) = config.refresh_url.as_deref() else {
            warn!(account = %name, "No refresh endpoint configured, logging in");
            return self.login_locked(name);
        };

        let url = join_url(&self.root_url(), refresh_path);
        info!(account = %name, url = %url, "Refreshing token");
        let body = serde_json::json!({ "refreshToken": refresh_token });

        let issued = match self.post(&url, &body) {
            Ok((200, body)) => parse_issued(&config, &body, Some(&refresh_token)),
            Ok((status, _)) => {
                warn!(account = %name, status, "Refresh rejected, logging in");
                return self.login_locked(name);
            }
            Err(e) => {
                warn!(account = %name, error = %e, "Refresh failed, logging in");
                return self.login_locked(name);
            }
        };
        let Some(issued) = issued else {
            warn!(account = %name, "Refresh response has no token, logging in");
            return self.login_locked(name);
        };

        let mut info = TokenInfo::with_refresh(
            issued.access_token,
            issued.refresh_token,
            Duration::from_secs(issued.expires_in),
        );
        info.refresh_count = current.refresh_count + 1;
        info!(account = %name, refresh_count = info.refresh_count, "Token refreshed");
        self.cache.insert(name.to_string(), info.clone());
        Ok(info)
    }

    /// One scheduler pass: renew every cached token that has expired
    fn renew_expired(&self) {
        let expired: Vec<String> = self
            .cache
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();

        for name in expired {
            let account_lock = self.account_lock(&name);
            let _guard = lock(&account_lock);
            if self.fresh(&name).is_some() || !self.cache.contains_key(&name) {
                continue;
            }
            info!(account = %name, "Token about to expire, renewing");
            if let Err(e) = self.renew_locked(&name) {
                error!(account = %name, error = %e, "Background token renewal failed");
            }
        }
    }
}

/// Pull the token fields out of an auth response. `previous_refresh` is
/// kept when the response carries no new refresh token.
fn parse_issued(
    config: &AccountConfig,
    body: &str,
    previous_refresh: Option<&str>,
) -> Option<IssuedToken> {
    let view = ResponseView::new(200, body);
    let text_at = |path: &str| match view.locate(path) {
        Located::Found(v) if !v.is_null() => Some(render(&v)),
        _ => None,
    };

    let access_token = text_at(&config.token_path).filter(|t| !t.is_empty())?;
    let refresh_token = text_at(&config.refresh_token_path)
        .or_else(|| previous_refresh.map(str::to_string));
    let expires_in = match text_at(&config.expires_in_path) {
        Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
            debug!(value = %raw, "Unparseable expiry, using default");
            config.default_expires_in
        }),
        None => config.default_expires_in,
    };
    Some(IssuedToken {
        access_token,
        refresh_token,
        expires_in,
    })
}

impl TokenManager {
    pub fn new(root_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store: Arc::new(TokenStore {
                root_url: RwLock::new(root_url.into()),
                transport,
                accounts: DashMap::new(),
                cache: DashMap::new(),
                locks: DashMap::new(),
            }),
            current: RwLock::new(DEFAULT_ACCOUNT.to_string()),
            scheduler: Mutex::new(None),
        }
    }

    pub fn with_accounts<I>(self, accounts: I) -> Self
    where
        I: IntoIterator<Item = (String, AccountConfig)>,
    {
        for (name, config) in accounts {
            self.add_account(name, config);
        }
        self
    }

    /// Start (or restart) the background renewal thread
    pub fn start_scheduler(&self, interval: Duration) {
        self.stop_scheduler();

        let (stop, stopped) = mpsc::channel::<()>();
        let store = Arc::clone(&self.store);
        let spawned = std::thread::Builder::new()
            .name("token-refresh".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => store.renew_expired(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => {
                info!(interval_secs = interval.as_secs(), "Token refresh scheduler started");
                *lock(&self.scheduler) = Some(Scheduler { stop, handle });
            }
            Err(e) => error!(error = %e, "Failed to start token refresh scheduler"),
        }
    }

    pub fn is_scheduler_running(&self) -> bool {
        lock(&self.scheduler)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop the scheduler, waiting a bounded time for its thread
    fn stop_scheduler(&self) {
        let Some(scheduler) = lock(&self.scheduler).take() else {
            return;
        };
        let _ = scheduler.stop.send(());

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while !scheduler.handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(SHUTDOWN_POLL);
        }
        if scheduler.handle.is_finished() {
            let _ = scheduler.handle.join();
            debug!("Token refresh scheduler stopped");
        } else {
            warn!("Token refresh scheduler did not stop in time, detaching");
        }
    }

    /// Stop the scheduler and drop every cached token
    pub fn shutdown(&self) {
        self.stop_scheduler();
        self.store.cache.clear();
        info!("Token manager shut down");
    }

    pub fn set_root_url(&self, root_url: impl Into<String>) {
        let root_url = root_url.into();
        match self.store.root_url.write() {
            Ok(mut r) => *r = root_url,
            Err(e) => *e.into_inner() = root_url,
        }
    }

    pub fn root_url(&self) -> String {
        self.store.root_url()
    }

    /// Access token for `account`, logging in or refreshing as needed
    pub fn get_token(&self, account: &str) -> Result<String> {
        self.store.ensure(account).map(|t| t.access_token)
    }

    pub fn authorization_header(&self, account: &str) -> Result<String> {
        self.store.ensure(account).map(|t| t.authorization_header())
    }

    pub fn current_token(&self) -> Result<String> {
        self.get_token(&self.current_account())
    }

    pub fn current_authorization_header(&self) -> Result<String> {
        self.authorization_header(&self.current_account())
    }

    pub fn switch_account(&self, account: impl Into<String>) {
        let account = account.into();
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        info!(from = %*current, to = %account, "Switching account");
        *current = account;
    }

    pub fn current_account(&self) -> String {
        self.current
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Cache a token obtained elsewhere; it cannot be refreshed
    pub fn set_token(&self, account: impl Into<String>, access_token: impl Into<String>, expires_in: Duration) {
        let account = account.into();
        debug!(account = %account, "Token set manually");
        self.store
            .cache
            .insert(account, TokenInfo::with_expiry(access_token, expires_in));
    }

    pub fn set_token_with_refresh(
        &self,
        account: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: Duration,
    ) {
        let account = account.into();
        debug!(account = %account, "Token set manually with refresh token");
        self.store.cache.insert(
            account,
            TokenInfo::with_refresh(access_token, Some(refresh_token.into()), expires_in),
        );
    }

    pub fn clear_token(&self, account: &str) {
        self.store.cache.remove(account);
        debug!(account = %account, "Token cleared");
    }

    pub fn clear_all(&self) {
        self.store.cache.clear();
        info!("All tokens cleared");
    }

    /// Register (or replace) an account
    pub fn add_account(&self, name: impl Into<String>, config: AccountConfig) {
        let name = name.into();
        debug!(account = %name, "Account registered");
        self.store.accounts.insert(name, config);
    }

    /// Forget an account and its cached token
    pub fn remove_account(&self, name: &str) {
        self.store.accounts.remove(name);
        self.store.cache.remove(name);
        debug!(account = %name, "Account removed");
    }

    pub fn has_account(&self, name: &str) -> bool {
        self.store.accounts.contains_key(name)
    }

    pub fn token_info(&self, account: &str) -> Option<TokenInfo> {
        self.store.cache.get(account).map(|t| t.value().clone())
    }

    /// Snapshot of every cached token
    pub fn all_tokens(&self) -> HashMap<String, TokenInfo> {
        self.store
            .cache
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Force a fresh login, replacing any cached token
    pub fn login(&self, account: &str) -> Result<TokenInfo> {
        let account_lock = self.store.account_lock(account);
        let _guard = lock(&account_lock);
        self.store.login_locked(account)
    }

    /// Refresh now; falls back to a login when refreshing is not possible
    pub fn refresh(&self, account: &str) -> Result<TokenInfo> {
        let account_lock = self.store.account_lock(account);
        let _guard = lock(&account_lock);
        self.store.refresh_locked(account)
    }

    /// Run one renewal pass immediately
    pub fn renew_expired(&self) {
        self.store.renew_expired();
    }

    /// Log every cached token's state
    pub fn log_status(&self) {
        info!(current = %self.current_account(), "Token status");
        for (name, token) in self.all_tokens() {
            info!(
                account = %name,
                expired = token.is_expired(),
                refresh_count = token.refresh_count,
                "Cached token"
            );
        }
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.stop_scheduler();
    }
}
