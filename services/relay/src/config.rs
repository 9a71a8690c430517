use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-exp";
pub const DEFAULT_TENANT: &str = "goldstar";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub tenants_path: PathBuf,
    /// Tenant used when a stream URL carries no `client` parameter.
    pub default_tenant: String,
    pub gemini_ws_url: String,
    pub gemini_model: String,
    /// Stream URL advertised by the voice webhook. Derived from `Host` when unset.
    pub public_stream_url: Option<String>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let tenants_path = std::env::var("TENANTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./tenants.json"));

        let default_tenant =
            std::env::var("DEFAULT_TENANT").unwrap_or_else(|_| DEFAULT_TENANT.to_string());
        if default_tenant.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_TENANT".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let gemini_ws_url = std::env::var("GEMINI_WS_URL")
            .unwrap_or_else(|_| gemini_realtime::DEFAULT_ENDPOINT.to_string());
        if !(gemini_ws_url.starts_with("wss://") || gemini_ws_url.starts_with("ws://")) {
            return Err(ConfigError::InvalidValue(
                "GEMINI_WS_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", gemini_ws_url),
            ));
        }

        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        let public_stream_url = std::env::var("PUBLIC_STREAM_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            tenants_path,
            default_tenant,
            gemini_ws_url,
            gemini_model,
            public_stream_url,
            log_level,
        })
    }
}
