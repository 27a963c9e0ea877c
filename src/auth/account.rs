//! Login settings for a named account

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

fn default_token_path() -> String {
    "$.data.accessToken".to_string()
}

fn default_refresh_token_path() -> String {
    "$.data.refreshToken".to_string()
}

fn default_expires_in_path() -> String {
    "$.data.expiresIn".to_string()
}

fn default_expires_in() -> u64 {
    7200
}

/// How to log in (and refresh) as one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub login_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_url: Option<String>,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_refresh_token_path")]
    pub refresh_token_path: String,
    #[serde(default = "default_expires_in_path")]
    pub expires_in_path: String,
    /// Seconds, used when the login response carries no expiry
    #[serde(default = "default_expires_in")]
    pub default_expires_in: u64,
    /// Merged into the login body next to username and password
    #[serde(default)]
    pub extra_params: IndexMap<String, JsonValue>,
}

impl AccountConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        login_url: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            login_url: login_url.into(),
            refresh_url: None,
            token_path: default_token_path(),
            refresh_token_path: default_refresh_token_path(),
            expires_in_path: default_expires_in_path(),
            default_expires_in: default_expires_in(),
            extra_params: IndexMap::new(),
        }
    }

    pub fn with_refresh_url(mut self, refresh_url: impl Into<String>) -> Self {
        self.refresh_url = Some(refresh_url.into());
        self
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    /// JSON body posted to the login endpoint
    pub fn login_body(&self) -> JsonValue {
        let mut body = serde_json::Map::new();
        body.insert("username".into(), JsonValue::String(self.username.clone()));
        body.insert("password".into(), JsonValue::String(self.password.clone()));
        for (k, v) in &self.extra_params {
            body.insert(k.clone(), v.clone());
        }
        JsonValue::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_yaml() {
        let yaml = "username: alice\npassword: secret\nloginUrl: /auth/login\n";
        let config: AccountConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.token_path, "$.data.accessToken");
        assert_eq!(config.refresh_token_path, "$.data.refreshToken");
        assert_eq!(config.expires_in_path, "$.data.expiresIn");
        assert_eq!(config.default_expires_in, 7200);
        assert!(config.refresh_url.is_none());
    }

    #[test]
    fn test_login_body_merges_extra_params() {
        let config = AccountConfig::new("alice", "secret", "/login")
            .with_extra_param("tenant", "acme")
            .with_extra_param("username", "override");
        assert_eq!(
            config.login_body(),
            json!({"username": "override", "password": "secret", "tenant": "acme"})
        );
    }
}
