//! Configuration management
//!
//! Environment-based configuration with file override, defaults and
//! validation. Environment variables follow the pattern
//! `ROLLCALL_<SECTION>_<KEY>`.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP surface (redirect/callback endpoints, join webhook)
    pub http: HttpConfig,

    /// External identity provider endpoints and credentials
    pub provider: ProviderConfig,

    /// Community platform REST API
    pub gateway: GatewayConfig,

    /// Storage configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Public base URL members are sent to, without a trailing slash
    pub public_url: String,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_url: String,
    pub scope: String,
}

/// Community platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the platform API, without a trailing slash
    pub base_url: String,

    /// Bot token
    pub token: String,

    /// Outbound request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path
    pub db_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            provider: ProviderConfig::default(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".parse().unwrap(),
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://id.example/oauth/authorize".to_string(),
            token_url: "https://id.example/oauth/token".to_string(),
            profile_url: "https://id.example/api/profile".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:3000/auth/callback".to_string(),
            scope: "profile organizations".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://platform.example/api".to_string(),
            token: String::new(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/rollcall.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Example: ROLLCALL_HTTP_BIND_ADDRESS=0.0.0.0:8080
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // HTTP config
        if let Ok(addr) = env::var("ROLLCALL_HTTP_BIND_ADDRESS") {
            config.http.bind_address = addr
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid bind address: {}", e)))?;
        }
        if let Ok(url) = env::var("ROLLCALL_HTTP_PUBLIC_URL") {
            config.http.public_url = url;
        }

        // Provider config
        if let Ok(url) = env::var("ROLLCALL_PROVIDER_AUTHORIZE_URL") {
            config.provider.authorize_url = url;
        }
        if let Ok(url) = env::var("ROLLCALL_PROVIDER_TOKEN_URL") {
            config.provider.token_url = url;
        }
        if let Ok(url) = env::var("ROLLCALL_PROVIDER_PROFILE_URL") {
            config.provider.profile_url = url;
        }
        if let Ok(id) = env::var("ROLLCALL_PROVIDER_CLIENT_ID") {
            config.provider.client_id = id;
        }
        if let Ok(secret) = env::var("ROLLCALL_PROVIDER_CLIENT_SECRET") {
            config.provider.client_secret = secret;
        }
        if let Ok(url) = env::var("ROLLCALL_PROVIDER_REDIRECT_URL") {
            config.provider.redirect_url = url;
        }
        if let Ok(scope) = env::var("ROLLCALL_PROVIDER_SCOPE") {
            config.provider.scope = scope;
        }

        // Gateway config
        if let Ok(url) = env::var("ROLLCALL_GATEWAY_BASE_URL") {
            config.gateway.base_url = url;
        }
        if let Ok(token) = env::var("ROLLCALL_GATEWAY_TOKEN") {
            config.gateway.token = token;
        }

        // Store config
        if let Ok(path) = env::var("ROLLCALL_STORE_DB_PATH") {
            config.store.db_path = PathBuf::from(path);
        }

        // Logging config
        if let Ok(level) = env::var("ROLLCALL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("ROLLCALL_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Validate configuration; must pass before the service starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("http.public_url", &self.http.public_url),
            ("provider.authorize_url", &self.provider.authorize_url),
            ("provider.token_url", &self.provider.token_url),
            ("provider.profile_url", &self.provider.profile_url),
            ("provider.redirect_url", &self.provider.redirect_url),
            ("gateway.base_url", &self.gateway.base_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} is not a valid URL: {}",
                    name, url
                )));
            }
            if url.ends_with('/') {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must not end with a slash",
                    name
                )));
            }
        }

        if self.provider.client_id.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "provider.client_id must be set".to_string(),
            ));
        }
        if self.provider.client_secret.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "provider.client_secret must be set".to_string(),
            ));
        }
        if self.gateway.token.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "gateway.token must be set".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}
