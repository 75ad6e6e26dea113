use std::net::SocketAddr;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Studycards";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every study set holds exactly this many items.
pub const ITEMS_PER_SET: usize = 4;

/// Largest document accepted, in original (decoded) bytes: 5 MiB.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// The only MIME type the pipeline accepts.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Request body ceiling for `POST /generate`.
/// Base64 inflates by 4/3, plus room for the JSON envelope and file name.
pub const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Hard ceiling on one generation, backend call included.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,studycards=debug,tower_http=info"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No API key found: set GOOGLE_GENERATIVE_AI_API_KEY or GEMINI_API_KEY")]
    MissingApiKey,

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddr(String),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Server settings, resolved from the environment and then CLI overrides.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub api_key: String,
    pub model: String,
    pub gemini_base_url: String,
    pub generation_timeout: Duration,
}

impl ServerConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_GENERATIVE_AI_API_KEY")
            .or_else(|| lookup("GEMINI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let bind = lookup("STUDYCARDS_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = parse_bind_addr(&bind)?;

        let generation_timeout = match lookup("STUDYCARDS_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_timeout_secs(&raw)?),
            None => Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr,
            api_key,
            model: lookup("STUDYCARDS_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: lookup("STUDYCARDS_GEMINI_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            generation_timeout,
        })
    }
}

pub fn parse_bind_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidBindAddr(raw.to_string()))
}

fn parse_timeout_secs(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue {
            var: "STUDYCARDS_TIMEOUT_SECS",
            value: raw.to_string(),
        }),
    }
}
