//! # Server Configuration
//!
//! Read once at startup from the environment:
//!
//! | variable                     | default        | meaning                              |
//! |------------------------------|----------------|--------------------------------------|
//! | `CASCADE_LISTEN_ADDR`        | `0.0.0.0:3000` | socket address to bind               |
//! | `CASCADE_MAX_ITERATIONS`     | `1000000`      | rule applications per optimization   |
//! | `CASCADE_MAX_SEARCH_TIME_MS` | unset          | wall-clock limit per optimization    |
//! | `CASCADE_SOURCE_TYPE`        | unset          | connector-specific rule set to apply |
//!
//! Logging is configured separately through `RUST_LOG`.

use cascade_core::search::SearchConfig;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Limits applied to every optimization request.
    pub search: SearchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            search: SearchConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let number = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
            }
        };

        let mut config = Self::default();
        if let Some(addr) = lookup("CASCADE_LISTEN_ADDR").filter(|a| !a.is_empty()) {
            config.listen_addr = addr;
        }
        if let Some(n) = number("CASCADE_MAX_ITERATIONS")? {
            config.search.max_iterations = n as usize;
        }
        if let Some(ms) = number("CASCADE_MAX_SEARCH_TIME_MS")? {
            config.search.max_search_time = Some(Duration::from_millis(ms));
        }
        config.search.source_type = lookup("CASCADE_SOURCE_TYPE").filter(|s| !s.is_empty());
        Ok(config)
    }
}
