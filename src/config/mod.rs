//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Matchmaking and match-lifecycle constants (§6 of the spec)
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Players required to form a match
    pub match_size: usize,
    /// Fixed match length
    pub match_duration_ms: u64,
    /// Deferred delay before a paired match auto-starts
    pub start_delay_ms: u64,
    /// Delay after `match_ended` before the match is removed
    pub cleanup_delay_ms: u64,
    /// Anti-cheat cap on accepted taps per second
    pub max_taps_per_second: u32,
    /// Symmetric clock-skew tolerance for a submitted tap timestamp
    pub tap_clock_skew_window_ms: u64,
}

impl MatchConfig {
    /// Minimum interval between accepted taps implied by `max_taps_per_second`
    pub fn min_tap_interval_ms(&self) -> u64 {
        1000 / self.max_taps_per_second as u64
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_size: 2,
            match_duration_ms: 30_000,
            start_delay_ms: 2_000,
            cleanup_delay_ms: 5_000,
            max_taps_per_second: 10,
            tap_clock_skew_window_ms: 100,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Shared secret for the WebSocket bearer-token boundary check
    pub ws_auth_secret: String,
    /// Matchmaking and match-lifecycle constants
    pub matching: MatchConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchConfig::default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            ws_auth_secret: env::var("WS_AUTH_SECRET")
                .map_err(|_| ConfigError::Missing("WS_AUTH_SECRET"))?,

            matching: MatchConfig {
                match_size: parse_env_or("MATCH_SIZE", defaults.match_size)?,
                match_duration_ms: parse_env_or("MATCH_DURATION_MS", defaults.match_duration_ms)?,
                start_delay_ms: parse_env_or("START_DELAY_MS", defaults.start_delay_ms)?,
                cleanup_delay_ms: parse_env_or("CLEANUP_DELAY_MS", defaults.cleanup_delay_ms)?,
                max_taps_per_second: parse_env_or(
                    "MAX_TAPS_PER_SECOND",
                    defaults.max_taps_per_second,
                )?,
                tap_clock_skew_window_ms: parse_env_or(
                    "TAP_CLOCK_SKEW_WINDOW_MS",
                    defaults.tap_clock_skew_window_ms,
                )?,
            },
        })
    }
}

/// Parse an environment variable if set, falling back to `default` if unset;
/// a value that is present but unparseable is a fail-fast `ConfigError`.
fn parse_env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
