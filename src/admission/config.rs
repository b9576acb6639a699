//! # Admission Configuration
//!
//! Settings that decide how much traffic an identity may send and what it
//! costs to send too much. Values are read once at startup and never change
//! for the lifetime of a controller.
//!
//! ## The Window Budget
//!
//! ```text
//!     max_events = 5, timeframe = 60s, cooldown = 300s
//!
//!     t(s)  0    1    2    3    4    5 ........................ 305
//!           ✅   ✅   ✅   ✅   ✅   ❌ ── cooldown armed ──────► ✅
//!           └──────── 5 in window ─┘    every event rejected     window reset
//! ```
//!
//! ## Deployment Profiles
//!
//! Two profiles are in live use. They are plain data, not separate code paths:
//!
//! | Profile      | max_events | timeframe | cooldown |
//! |--------------|------------|-----------|----------|
//! | `strict`     | 5          | 60s       | 300s     |
//! | `permissive` | 100        | 60s       | 300s     |
//!
//! ## Loading From TOML
//!
//! ```toml
//! profile = "permissive"   # optional, defaults to "strict"
//! cooldown_ms = 120000     # overrides the profile value
//!
//! [eviction]
//! max_tracked = 50000
//! sweep_interval_ms = 30000
//! ```

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on simultaneously tracked identities.
pub const DEFAULT_MAX_TRACKED: usize = 10_000;

/// Default interval between background sweeps (milliseconds).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Named configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 5 events per 60 seconds, 300 second cooldown.
    Strict,
    /// 100 events per 60 seconds, 300 second cooldown.
    Permissive,
}

impl Profile {
    /// Returns the admission config this profile stands for.
    pub fn config(self) -> AdmissionConfig {
        match self {
            Self::Strict => AdmissionConfig::strict(),
            Self::Permissive => AdmissionConfig::permissive(),
        }
    }
}

/// Memory bounds for the identity map.
///
/// A tracked identity whose cooldown has passed and whose newest event has
/// left the window is indistinguishable from one never seen before. Such
/// states are swept away; `idle_retention_ms` delays that by a grace period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvictionConfig {
    /// Maximum number of identities tracked at once.
    pub max_tracked: usize,

    /// Interval between background sweeps in milliseconds.
    pub sweep_interval_ms: u64,

    /// How long a redundant state is kept before it may be swept.
    pub idle_retention_ms: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            max_tracked: DEFAULT_MAX_TRACKED,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            idle_retention_ms: 0,
        }
    }
}

impl EvictionConfig {
    /// Tracked count at which inserts trigger an emergency sweep (90%).
    #[inline]
    pub fn emergency_threshold(&self) -> usize {
        percent_of(self.max_tracked, 90)
    }

    /// Tracked count an emergency sweep tries to get down to (70%).
    #[inline]
    pub fn emergency_target(&self) -> usize {
        percent_of(self.max_tracked, 70)
    }
}

/// `value * percent / 100` rounded down, without overflowing for any `value`.
#[inline]
fn percent_of(value: usize, percent: usize) -> usize {
    value / 100 * percent + value % 100 * percent / 100
}

/// Configuration for an [`AdmissionController`](crate::AdmissionController).
///
/// # Examples
///
/// ```rust
/// use floodgate::AdmissionConfig;
///
/// let strict = AdmissionConfig::strict();
/// assert_eq!(strict.max_events, 5);
///
/// let custom = AdmissionConfig::new(20, 10_000, 60_000);
/// assert!(custom.validate().is_ok());
///
/// let broken = AdmissionConfig::new(0, 10_000, 60_000);
/// assert!(broken.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct AdmissionConfig {
    /// Events admitted per window before the cooldown is armed.
    pub max_events: u32,

    /// Length of the sliding window in milliseconds.
    pub timeframe_ms: u64,

    /// Length of the lockout in milliseconds. Zero is allowed.
    pub cooldown_ms: u64,

    /// Memory bounds.
    pub eviction: EvictionConfig,
}

impl Default for AdmissionConfig {
    /// The strict profile.
    fn default() -> Self {
        Self::strict()
    }
}

impl AdmissionConfig {
    /// Creates a config with default eviction settings.
    pub fn new(max_events: u32, timeframe_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            max_events,
            timeframe_ms,
            cooldown_ms,
            eviction: EvictionConfig::default(),
        }
    }

    /// 5 events per 60 seconds, then a 300 second cooldown.
    pub fn strict() -> Self {
        Self::new(5, 60_000, 300_000)
    }

    /// 100 events per 60 seconds, then a 300 second cooldown.
    pub fn permissive() -> Self {
        Self::new(100, 60_000, 300_000)
    }

    /// Replaces the eviction settings.
    pub fn with_eviction(mut self, eviction: EvictionConfig) -> Self {
        self.eviction = eviction;
        self
    }

    /// Sets the cap on tracked identities.
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.eviction.max_tracked = max_tracked;
        self
    }

    /// Window length as a `Duration`.
    pub fn timeframe(&self) -> Duration {
        Duration::from_millis(self.timeframe_ms)
    }

    /// Cooldown length as a `Duration`.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::ZeroMaxEvents);
        }
        if self.timeframe_ms == 0 {
            return Err(ConfigError::ZeroTimeframe);
        }
        if self.eviction.max_tracked == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.eviction.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// ```rust
    /// use floodgate::AdmissionConfig;
    ///
    /// let config = AdmissionConfig::from_toml_str(r#"
    ///     profile = "permissive"
    ///     cooldown_ms = 120000
    /// "#).unwrap();
    ///
    /// assert_eq!(config.max_events, 100);
    /// assert_eq!(config.cooldown_ms, 120_000);
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document)
    }

    /// Rough admitted-events-per-second ceiling, for display.
    pub fn effective_rate_per_second(&self) -> f64 {
        if self.timeframe_ms == 0 {
            0.0
        } else {
            (self.max_events as f64 * 1000.0) / self.timeframe_ms as f64
        }
    }
}

/// On-disk shape: a profile plus optional per-field overrides.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    profile: Option<Profile>,
    max_events: Option<u32>,
    timeframe_ms: Option<u64>,
    cooldown_ms: Option<u64>,
    #[serde(default)]
    eviction: EvictionConfig,
}

impl From<RawConfig> for AdmissionConfig {
    fn from(raw: RawConfig) -> Self {
        let base = raw.profile.unwrap_or(Profile::Strict).config();
        Self {
            max_events: raw.max_events.unwrap_or(base.max_events),
            timeframe_ms: raw.timeframe_ms.unwrap_or(base.timeframe_ms),
            cooldown_ms: raw.cooldown_ms.unwrap_or(base.cooldown_ms),
            eviction: raw.eviction,
        }
    }
}
