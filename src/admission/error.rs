//! Error types for controller configuration.
//!
//! The admission check itself is infallible. Everything that can go wrong
//! happens before the controller exists: a config file that cannot be read,
//! a TOML document that does not parse, or values that make no sense.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating an [`AdmissionConfig`](crate::AdmissionConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_events` was zero; no event could ever be admitted.
    #[error("max_events must be greater than 0")]
    ZeroMaxEvents,

    /// `timeframe_ms` was zero; the window would never hold anything.
    #[error("timeframe_ms must be greater than 0")]
    ZeroTimeframe,

    /// `eviction.max_tracked` was zero.
    #[error("eviction.max_tracked must be greater than 0")]
    ZeroCapacity,

    /// `eviction.sweep_interval_ms` was zero.
    #[error("eviction.sweep_interval_ms must be greater than 0")]
    ZeroSweepInterval,

    /// The config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The config document is not valid TOML or has the wrong shape.
    #[error("invalid config document: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::ZeroMaxEvents.to_string(),
            "max_events must be greater than 0"
        );
        assert!(ConfigError::ZeroCapacity.to_string().contains("max_tracked"));
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("/nowhere/floodgate.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nowhere/floodgate.toml"));
        assert!(msg.contains("missing"));
    }
}
