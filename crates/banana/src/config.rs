//! Client configuration and environment loading.

use std::path::PathBuf;
use std::time::Duration;

use banana_session::SessionConfig;

use crate::BananaError;

/// Base URL of the hosted functions when nothing else is configured:
/// a local development stack.
pub const DEFAULT_API_URL: &str = "http://localhost:54321/functions/v1/";

/// Everything needed to build a [`BananaClient`](crate::BananaClient).
///
/// Sensible defaults are provided. Override only the fields you care about
/// with struct update syntax, or load them with [`ClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the auth functions (`{api_url}/auth/verify`, ...).
    ///
    /// Env: `BANANA_API_URL`.
    pub api_url: String,

    /// Public API key sent as `apikey` on every request.
    ///
    /// Env: `BANANA_ANON_KEY`.
    pub anon_key: Option<String>,

    /// Where the session is persisted. `None` keeps it in memory only.
    ///
    /// Env: `BANANA_STORE_PATH`.
    pub store_path: Option<PathBuf>,

    /// Timeouts and referral handling.
    ///
    /// Env: `BANANA_SIGNATURE_TIMEOUT_SECS` (`0` waits forever),
    /// `BANANA_REQUEST_TIMEOUT_SECS`.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            anon_key: None,
            store_path: None,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from `BANANA_*` environment variables.
    ///
    /// Unset or empty variables keep their defaults.
    ///
    /// # Errors
    /// [`BananaError::Config`] if a timeout isn't a whole number of seconds.
    pub fn from_env() -> Result<Self, BananaError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, BananaError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("BANANA_API_URL") {
            config.api_url = url.trim().to_string();
        }
        config.anon_key = var("BANANA_ANON_KEY");
        config.store_path = var("BANANA_STORE_PATH").map(PathBuf::from);

        if let Some(raw) = var("BANANA_SIGNATURE_TIMEOUT_SECS") {
            config.session.signature_timeout = match parse_secs("BANANA_SIGNATURE_TIMEOUT_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }
        if let Some(raw) = var("BANANA_REQUEST_TIMEOUT_SECS") {
            match parse_secs("BANANA_REQUEST_TIMEOUT_SECS", &raw)? {
                0 => {
                    return Err(BananaError::Config(
                        "BANANA_REQUEST_TIMEOUT_SECS must be greater than 0".into(),
                    ));
                }
                secs => config.session.request_timeout = Duration::from_secs(secs),
            }
        }

        Ok(config)
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, BananaError> {
    raw.trim()
        .parse()
        .map_err(|_| BananaError::Config(format!("{key}: expected seconds, got {raw:?}")))
}
