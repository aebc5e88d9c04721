//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server starts with zero configuration
//! for local development. Missing credentials do not stop the server: the
//! endpoints that need them answer 503 instead.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use teacherdesk_shared::constants::{
    DEFAULT_CHAT_MODEL, DEFAULT_CHAT_TIMEOUT, DEFAULT_HTTP_PORT, DEFAULT_IMAGE_TIMEOUT,
    DEFAULT_INSTANT_API_URL, DEFAULT_OPENAI_BASE_URL, DEFAULT_RATE_LIMIT_MAX_REQUESTS,
    DEFAULT_RATE_LIMIT_WINDOW,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            "test" => Some(Environment::Test),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Credentials for the InstantDB admin API. Only present when both the app
/// id and the admin token are set.
#[derive(Clone, PartialEq, Eq)]
pub struct InstantCredentials {
    pub app_id: String,
    pub admin_token: String,
}

impl fmt::Debug for InstantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantCredentials")
            .field("app_id", &self.app_id)
            .field("admin_token", &"<redacted>")
            .finish()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3006`
    pub http_addr: SocketAddr,

    /// Env: `APP_ENV`, falling back to `NODE_ENV`
    /// Default: development
    pub environment: Environment,

    /// Origin allowed by CORS in production.
    /// Env: `FRONTEND_URL`
    pub frontend_url: Option<String>,

    /// Env: `OPENAI_API_KEY`
    pub openai_api_key: Option<String>,

    /// Env: `OPENAI_BASE_URL`
    pub openai_base_url: String,

    /// Model used when a chat request does not name one.
    /// Env: `OPENAI_CHAT_MODEL`
    pub chat_model: String,

    /// Env: `INSTANT_APP_ID` + `INSTANT_ADMIN_TOKEN`
    pub instant: Option<InstantCredentials>,

    /// Env: `INSTANT_API_URL`
    pub instant_api_url: String,

    /// Env: `RATE_LIMIT_MAX_REQUESTS`
    pub rate_limit_max_requests: u32,

    /// Env: `RATE_LIMIT_WINDOW_SECS`
    pub rate_limit_window: Duration,

    /// Deadline for chat completions.
    /// Env: `UPSTREAM_TIMEOUT_MS`
    pub chat_timeout: Duration,

    /// Deadline for image generation.
    /// Env: `IMAGE_TIMEOUT_MS`
    pub image_timeout: Duration,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("environment", &self.environment)
            .field("frontend_url", &self.frontend_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_model", &self.chat_model)
            .field("instant", &self.instant)
            .field("instant_api_url", &self.instant_api_url)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("chat_timeout", &self.chat_timeout)
            .field("image_timeout", &self.image_timeout)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            environment: Environment::Development,
            frontend_url: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            instant: None,
            instant_api_url: DEFAULT_INSTANT_API_URL.to_string(),
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = get("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(env) = get("APP_ENV").or_else(|| get("NODE_ENV")) {
            match Environment::parse(&env) {
                Some(parsed) => config.environment = parsed,
                None => tracing::warn!(value = %env, "Unknown APP_ENV, using development"),
            }
        }

        config.frontend_url = get("FRONTEND_URL").map(|url| url.trim_end_matches('/').to_string());
        config.openai_api_key = get("OPENAI_API_KEY");

        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(model) = get("OPENAI_CHAT_MODEL") {
            config.chat_model = model;
        }

        match (get("INSTANT_APP_ID"), get("INSTANT_ADMIN_TOKEN")) {
            (Some(app_id), Some(admin_token)) => {
                config.instant = Some(InstantCredentials {
                    app_id,
                    admin_token,
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Only one of INSTANT_APP_ID / INSTANT_ADMIN_TOKEN is set, database disabled"
                );
            }
            (None, None) => {}
        }

        if let Some(url) = get("INSTANT_API_URL") {
            config.instant_api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(n) = parse_number::<u32>(get("RATE_LIMIT_MAX_REQUESTS"), "RATE_LIMIT_MAX_REQUESTS")
        {
            config.rate_limit_max_requests = n;
        }

        if let Some(secs) = parse_number::<u64>(get("RATE_LIMIT_WINDOW_SECS"), "RATE_LIMIT_WINDOW_SECS")
        {
            config.rate_limit_window = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_number::<u64>(get("UPSTREAM_TIMEOUT_MS"), "UPSTREAM_TIMEOUT_MS") {
            config.chat_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_number::<u64>(get("IMAGE_TIMEOUT_MS"), "IMAGE_TIMEOUT_MS") {
            config.image_timeout = Duration::from_millis(ms);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Names of the environment variables whose absence disables a feature.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.instant.is_none() {
            missing.push("INSTANT_APP_ID/INSTANT_ADMIN_TOKEN");
        }
        missing
    }
}

/// Parse a positive number, warning and ignoring anything else.
fn parse_number<T>(value: Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let value = value?;
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Some(n),
        _ => {
            tracing::warn!(key, value = %value, "Invalid number, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3006).into());
        assert_eq!(config.environment, Environment::Development);
        assert!(config.openai_api_key.is_none());
        assert!(config.instant.is_none());
        assert_eq!(config.rate_limit_max_requests, 60);
        assert_eq!(
            config.missing_credentials(),
            vec!["OPENAI_API_KEY", "INSTANT_APP_ID/INSTANT_ADMIN_TOKEN"]
        );
    }

    #[test]
    fn test_full_config() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("NODE_ENV", "production"),
            ("FRONTEND_URL", "https://app.example.org/"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1/"),
            ("INSTANT_APP_ID", "app"),
            ("INSTANT_ADMIN_TOKEN", "secret"),
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
            ("RATE_LIMIT_WINDOW_SECS", "10"),
            ("UPSTREAM_TIMEOUT_MS", "1500"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert!(config.is_production());
        assert_eq!(config.frontend_url.as_deref(), Some("https://app.example.org"));
        assert_eq!(config.openai_base_url, "http://localhost:11434/v1");
        assert_eq!(config.instant.as_ref().unwrap().app_id, "app");
        assert_eq!(config.rate_limit_max_requests, 5);
        assert_eq!(config.rate_limit_window, Duration::from_secs(10));
        assert_eq!(config.chat_timeout, Duration::from_millis(1500));
        assert!(config.missing_credentials().is_empty());
    }

    #[test]
    fn test_app_env_wins_over_node_env() {
        let config = config_from(&[("APP_ENV", "test"), ("NODE_ENV", "production")]);
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("RATE_LIMIT_MAX_REQUESTS", "0"),
            ("IMAGE_TIMEOUT_MS", "soon"),
            ("INSTANT_APP_ID", "app-only"),
            ("OPENAI_API_KEY", "   "),
        ]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3006).into());
        assert_eq!(config.rate_limit_max_requests, 60);
        assert_eq!(config.image_timeout, DEFAULT_IMAGE_TIMEOUT);
        assert!(config.instant.is_none());
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-very-secret"),
            ("INSTANT_APP_ID", "app"),
            ("INSTANT_ADMIN_TOKEN", "admin-secret"),
        ]);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("admin-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
