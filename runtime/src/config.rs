//! Configuration for the queue service.
//!
//! Loads configuration from environment variables with sensible defaults. Unlike
//! unset variables, a variable that is set but cannot be parsed is an error: a typo
//! in `DRIVER_QUEUE_CEILING` must not silently fall back to 1000.

use driver_queue_core::geo::ELIGIBILITY_RADIUS_METERS;
use driver_queue_core::sequence::DEFAULT_CEILING;
use driver_queue_core::ticket::CallOrdering;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default upper bound for a single batch call.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 20;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is set but cannot be parsed.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// A parsed value is outside its allowed range.
    #[error("{key} {reason}")]
    OutOfRange {
        /// Setting name
        key: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Queue behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Highest ticket number before wrapping back to 1
    pub ceiling: u32,
    /// Maximum distance from the hub, in meters, for a ticket request
    pub eligibility_radius_m: f64,
    /// Maximum quantity accepted by a batch call
    pub max_batch_size: u32,
    /// How waiting tickets are ordered for calling
    pub call_ordering: CallOrdering,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            eligibility_radius_m: ELIGIBILITY_RADIUS_METERS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            call_ordering: CallOrdering::default(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DRIVER_QUEUE_CEILING` | 1000 |
    /// | `DRIVER_QUEUE_ELIGIBILITY_RADIUS_M` | 100 |
    /// | `DRIVER_QUEUE_MAX_BATCH` | 20 |
    /// | `DRIVER_QUEUE_CALL_ORDER` | `lexicographic` |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparsable value or the
    /// result fails [`QueueConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            ceiling: parse_var("DRIVER_QUEUE_CEILING")?.unwrap_or(defaults.ceiling),
            eligibility_radius_m: parse_var("DRIVER_QUEUE_ELIGIBILITY_RADIUS_M")?
                .unwrap_or(defaults.eligibility_radius_m),
            max_batch_size: parse_var("DRIVER_QUEUE_MAX_BATCH")?
                .unwrap_or(defaults.max_batch_size),
            call_ordering: parse_var("DRIVER_QUEUE_CALL_ORDER")?
                .unwrap_or(defaults.call_ordering),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ceiling == 0 {
            return Err(ConfigError::OutOfRange {
                key: "ceiling",
                reason: "must be at least 1",
            });
        }
        if !(self.eligibility_radius_m.is_finite() && self.eligibility_radius_m > 0.0) {
            return Err(ConfigError::OutOfRange {
                key: "eligibility_radius_m",
                reason: "must be a positive number of meters",
            });
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                key: "max_batch_size",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `PostgreSQL` connection URL; `None` selects the in-memory store
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Address for the Prometheus scrape endpoint
    pub metrics_addr: String,
}

impl StorageConfig {
    /// Load storage settings from `DATABASE_URL`, `DRIVER_QUEUE_MAX_CONNECTIONS`
    /// (default 10) and `METRICS_ADDR` (default `0.0.0.0:9090`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `DRIVER_QUEUE_MAX_CONNECTIONS` is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            max_connections: parse_var("DRIVER_QUEUE_MAX_CONNECTIONS")?.unwrap_or(10),
            metrics_addr: env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}
