//! Cached credential state for one account

use std::time::{Duration, Instant};

/// Tokens are treated as expired this long before their actual expiry
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Upper bound on any issued lifetime; servers sometimes send `u64::MAX`
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// An access token plus the data needed to renew it.
///
/// Replaced wholesale on every login or refresh, never mutated in the cache.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<Instant>,
    pub refresh_expires_at: Option<Instant>,
    pub token_type: String,
    pub created_at: Instant,
    pub refresh_count: u32,
}

impl TokenInfo {
    /// A token that never expires
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            refresh_expires_at: None,
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            created_at: Instant::now(),
            refresh_count: 0,
        }
    }

    pub fn with_expiry(access_token: impl Into<String>, expires_in: Duration) -> Self {
        let mut info = Self::new(access_token);
        info.expires_at = info.created_at.checked_add(expires_in.min(MAX_TOKEN_LIFETIME));
        info
    }

    /// Token with a refresh token; the refresh token lives twice as long
    pub fn with_refresh(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Duration,
    ) -> Self {
        let mut info = Self::with_expiry(access_token, expires_in);
        let refresh_lifetime = expires_in.saturating_mul(2).min(MAX_TOKEN_LIFETIME * 2);
        info.refresh_expires_at = info.created_at.checked_add(refresh_lifetime);
        info.refresh_token = refresh_token;
        info
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + EXPIRY_MARGIN >= at,
            None => false,
        }
    }

    /// A token with no recorded refresh expiry cannot be refreshed
    pub fn is_refresh_token_expired(&self) -> bool {
        match self.refresh_expires_at {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && !self.is_refresh_token_expired()
    }

    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Time left before the token counts as expired
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now() + EXPIRY_MARGIN))
    }
}
