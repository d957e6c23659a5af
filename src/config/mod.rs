//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Thresholds for the end-of-match rule. Three stopping conditions are
/// evaluated together; they live here so they can be tuned without a code
/// change.
#[derive(Clone, Copy, Debug)]
pub struct EndRules {
    /// Match ends once the leading score reaches this
    pub target_score: u32,
    /// Match ends once the gap between best and worst score reaches this
    pub score_spread: u32,
    /// Match ends after this many completed rounds regardless of score
    pub max_rounds: u32,
}

impl Default for EndRules {
    fn default() -> Self {
        Self {
            target_score: 20,
            score_spread: 10,
            max_rounds: 12,
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

    /// Public base URL clients use to join (shown as a QR code in the UI)
    pub public_base_url: String,
    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Optional JSON file overriding the built-in question bank
    pub question_file: Option<String>,

    /// End-of-match thresholds
    pub end_rules: EndRules,
    /// Maximum players in a match
    pub max_players: usize,
    /// Default turn duration when the start request doesn't specify one
    pub default_turn_secs: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            question_file: env::var("QUESTION_FILE").ok(),

            end_rules: EndRules {
                target_score: parse_var("GAME_TARGET_SCORE", 20)?,
                score_spread: parse_var("GAME_SCORE_SPREAD", 10)?,
                max_rounds: parse_var("GAME_MAX_ROUNDS", 12)?,
            },
            max_players: parse_var("GAME_MAX_PLAYERS", 4)?,
            default_turn_secs: parse_var("GAME_DEFAULT_TURN_SECS", 45)?,
        })
    }
}

/// Parse an optional numeric env var, falling back to a default
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
}
