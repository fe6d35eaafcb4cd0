//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Delays the client animates between game transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameTimings {
    /// From a match until the matched word leaves the board.
    pub settle_delay: Duration,
    /// From the end of a round until the continue options appear.
    pub continue_delay: Duration,
}

impl Default for GameTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            continue_delay: Duration::from_millis(2500),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub words_path: PathBuf,
    pub openai_api_key: Option<String>,
    /// Without it purchases cannot be verified and are refused.
    pub app_store_shared_secret: Option<String>,
    pub app_store_bundle_id: String,
    pub tts_voice: String,
    pub dictionary_api_url: String,
    pub allowed_origin: String,
    pub timings: GameTimings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        if !database_url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidValue(
                "DATABASE_URL".to_string(),
                "expected a sqlite: URL".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let words_path = std::env::var("WORDS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./words"));

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let app_store_shared_secret = std::env::var("APP_STORE_SHARED_SECRET").ok();

        // --- Load Adapter-specific Settings ---
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let dictionary_api_url = std::env::var("DICTIONARY_API_URL")
            .unwrap_or_else(|_| "https://api.dictionaryapi.dev/api/v2/entries/en".to_string());
        let app_store_bundle_id = std::env::var("APP_STORE_BUNDLE_ID")
            .unwrap_or_else(|_| "com.qiuzx.kewan".to_string());
        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Game Timings ---
        let defaults = GameTimings::default();
        let timings = GameTimings {
            settle_delay: millis_var("SETTLE_DELAY_MS", defaults.settle_delay)?,
            continue_delay: millis_var("CONTINUE_DELAY_MS", defaults.continue_delay)?,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            words_path,
            openai_api_key,
            app_store_shared_secret,
            app_store_bundle_id,
            tts_voice,
            dictionary_api_url,
            allowed_origin,
            timings,
        })
    }
}

fn millis_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_fall_back_to_defaults() {
        let value = millis_var("BUBBLE_WORDS_TEST_UNSET_DELAY", Duration::from_millis(500)).unwrap();
        assert_eq!(value, Duration::from_millis(500));
    }

    #[test]
    fn default_timings_match_the_client_animations() {
        let timings = GameTimings::default();
        assert_eq!(timings.settle_delay, Duration::from_millis(500));
        assert_eq!(timings.continue_delay, Duration::from_millis(2500));
    }
}
