//! # Floodgate - Per-Identity Admission Control
//!
//! Decides, for every inbound message, whether its sender may proceed or is
//! sending too much. Each identity (a chat, a user, a channel) gets a sliding
//! window budget; going over it earns a fixed cooldown during which every
//! message from that identity is rejected.
//!
//! ## The Algorithm
//!
//! ```text
//!     max_events = 3, timeframe = 10s, cooldown = 30s
//!
//!     t=0s   ✅  window [0]
//!     t=1s   ✅  window [0, 1]
//!     t=2s   ✅  window [0, 1, 2]
//!     t=3s   ❌  window full: cooldown until t=33s
//!     t=20s  ❌  cooling down
//!     t=33s  ✅  cooldown served: window reset to [33]
//! ```
//!
//! - **Window**: events counted over the last `timeframe`, sliding with time
//! - **Cooldown**: flat lockout, not extended by events that arrive during it
//! - **Hard reset**: once a cooldown is served, older events no longer count
//!
//! ## Quick Start
//!
//! ```rust
//! use floodgate::{AdmissionConfig, AdmissionController, Decision};
//!
//! let controller = AdmissionController::<String>::new(AdmissionConfig::strict());
//!
//! // Times are milliseconds; `check_now` reads the system clock instead.
//! match controller.check("chat:42", 1_000) {
//!     Decision::Admit => { /* hand the message to the pipeline */ }
//!     Decision::Reject => { /* drop it */ }
//! }
//! ```
//!
//! ### Custom Limits with the Builder
//!
//! ```rust
//! use floodgate::AdmissionControllerBuilder;
//! use std::time::Duration;
//!
//! let controller = AdmissionControllerBuilder::new()
//!     .max_events(20)
//!     .timeframe(Duration::from_secs(10))
//!     .cooldown(Duration::from_secs(60))
//!     .max_tracked(50_000)
//!     .build::<String>();
//!
//! assert!(controller.check("user:7", 0).is_admit());
//! ```
//!
//! ### Loading Settings From TOML
//!
//! ```rust
//! use floodgate::{AdmissionConfig, AdmissionController};
//!
//! let config = AdmissionConfig::from_toml_str(r#"
//!     profile = "permissive"
//!
//!     [eviction]
//!     max_tracked = 20000
//! "#)?;
//!
//! let controller = AdmissionController::<String>::try_new(config)?;
//! # Ok::<(), floodgate::ConfigError>(())
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Message transport     │
//!                    └──────────┬──────────────┘
//!                               │ identity, now
//!                    ┌──────────▼──────────────┐
//!                    │  AdmissionController    │
//!                    ├─────────────────────────┤
//!                    │  • check()              │
//!                    │  • sweep()              │
//!                    │  • metrics() / stats()  │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   RateState         │       │   Identity map       │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • Sliding window    │       │ • Sharded DashMap    │
//!     │ • Cooldown          │       │ • Idle sweeping      │
//!     │ • Hard reset        │       │ • Capacity cap       │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity | Space Complexity |
//! |-----------|----------------|------------------|
//! | check() | O(1) amortized | O(max_events) per identity |
//! | is_cooling_down() | O(1) | O(1) |
//! | sweep() | O(tracked) | O(1) |
//! | metrics() | O(1) | O(1) |
//!
//! ## Memory
//!
//! An identity whose cooldown is over and whose newest event has left the
//! window behaves exactly like one never seen. [`AdmissionController::sweep`]
//! drops those, and [`AdmissionController::start_sweeper`] does it
//! periodically. On top of that the number of identities is capped by
//! [`EvictionConfig::max_tracked`].
//!
//! ## Thread Safety
//!
//! [`AdmissionController`] is `Send + Sync`; share it through an `Arc`
//! ([`SharedController`]). Checks for the same identity are serialized,
//! checks for different identities mostly run in parallel.
//!
//! ## Demos
//!
//! See the `demos/` directory:
//! - `basic.rs` - walking one identity through the window and cooldown
//! - `dispatcher.rs` - threads, a TOML config, the sweeper and logging

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod admission;

// Public re-exports
pub use admission::{
    current_time_ms, AdmissionConfig, AdmissionController, AdmissionMetrics, Clock, ConfigError,
    ControllerStats, Decision, EvictionConfig, HealthStatus, ManualClock, Outcome, Profile,
    SystemClock, DEFAULT_MAX_TRACKED, DEFAULT_SWEEP_INTERVAL_MS,
};

use admission::duration_ms;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// A controller wrapped in `Arc` for sharing across threads.
///
/// # Example
/// ```rust
/// use floodgate::{AdmissionConfig, AdmissionController, SharedController};
/// use std::sync::Arc;
///
/// let shared: SharedController = Arc::new(AdmissionController::new(AdmissionConfig::strict()));
///
/// let worker = shared.clone();
/// std::thread::spawn(move || {
///     worker.check_now("chat:1");
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedController<K = String> = Arc<AdmissionController<K>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// `std::sync::OnceLock` needs 1.70.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use floodgate::prelude::*;
/// ```
pub mod prelude {
    //! Common imports.
    //!
    //! # Example
    //! ```rust
    //! use floodgate::prelude::*;
    //!
    //! let controller: AdmissionController = AdmissionControllerBuilder::new().build();
    //! assert_eq!(controller.check("x", 0), Decision::Admit);
    //! ```

    pub use crate::{
        AdmissionConfig, AdmissionController, AdmissionControllerBuilder, AdmissionMetrics,
        ConfigError, Decision, HealthStatus, Outcome, SharedController,
    };
}

/// Fluent construction of an [`AdmissionController`].
///
/// Starts from the strict profile (5 events per minute, 5 minute cooldown)
/// with default eviction settings.
///
/// # Example
///
/// ```rust
/// use floodgate::{AdmissionControllerBuilder, ManualClock};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let controller = AdmissionControllerBuilder::new()
///     .max_events(2)
///     .timeframe(Duration::from_secs(1))
///     .cooldown(Duration::from_secs(5))
///     .clock(Arc::new(clock.clone()))
///     .build::<String>();
///
/// assert!(controller.check_now("a").is_admit());
/// assert!(controller.check_now("a").is_admit());
/// assert!(controller.check_now("a").is_reject());
///
/// clock.advance(Duration::from_secs(5));
/// assert!(controller.check_now("a").is_admit());
///
/// // try_build reports invalid settings instead of panicking
/// let result = AdmissionControllerBuilder::new().max_events(0).try_build::<String>();
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionControllerBuilder {
    config: AdmissionConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl AdmissionControllerBuilder {
    /// Creates a builder with the strict profile.
    pub fn new() -> Self {
        Self::from_config(AdmissionConfig::strict())
    }

    /// Creates a builder starting from an existing configuration.
    pub fn from_config(config: AdmissionConfig) -> Self {
        Self {
            config,
            clock: None,
        }
    }

    /// Events admitted per window (must be > 0).
    pub fn max_events(mut self, max_events: u32) -> Self {
        self.config.max_events = max_events;
        self
    }

    /// Length of the sliding window (must be at least 1 ms).
    pub fn timeframe(mut self, timeframe: Duration) -> Self {
        self.config.timeframe_ms = duration_ms(timeframe);
        self
    }

    /// Length of the lockout after the window budget is exceeded.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown_ms = duration_ms(cooldown);
        self
    }

    /// Maximum number of identities tracked at once.
    pub fn max_tracked(mut self, max_tracked: usize) -> Self {
        self.config.eviction.max_tracked = max_tracked;
        self
    }

    /// Interval of the background sweeper.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.eviction.sweep_interval_ms = duration_ms(interval);
        self
    }

    /// Grace period before a redundant state may be swept.
    pub fn idle_retention(mut self, retention: Duration) -> Self {
        self.config.eviction.idle_retention_ms = duration_ms(retention);
        self
    }

    /// Time source for `check_now`, `sweep_now` and the sweeper.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the controller.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid:
    /// - `max_events` is 0
    /// - `timeframe` is under 1 ms
    /// - `max_tracked` is 0
    /// - `sweep_interval` is under 1 ms
    ///
    /// Use `try_build()` to handle errors.
    pub fn build<K>(self) -> AdmissionController<K>
    where
        K: Eq + Hash + Clone + std::fmt::Debug,
    {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        AdmissionController::with_clock(self.config, clock)
    }

    /// Builds the controller, returning an error if the configuration is invalid.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] for the first offending setting.
    pub fn try_build<K>(self) -> Result<AdmissionController<K>, ConfigError>
    where
        K: Eq + Hash + Clone + std::fmt::Debug,
    {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        AdmissionController::try_with_clock(self.config, clock)
    }

    /// The configuration built so far.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }
}

impl Default for AdmissionControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_builder_defaults_to_strict() {
        let builder = AdmissionControllerBuilder::new();
        assert_eq!(builder.config(), &AdmissionConfig::strict());

        let controller: AdmissionController = builder.build();
        for t in 0..5 {
            assert!(controller.check("u", t).is_admit());
        }
        assert!(controller.check("u", 5).is_reject());
    }

    #[test]
    fn test_builder_settings() {
        let builder = AdmissionControllerBuilder::new()
            .max_events(10)
            .timeframe(Duration::from_secs(2))
            .cooldown(Duration::from_millis(500))
            .max_tracked(64)
            .sweep_interval(Duration::from_secs(5))
            .idle_retention(Duration::from_secs(1));

        let config = builder.config();
        assert_eq!(config.max_events, 10);
        assert_eq!(config.timeframe_ms, 2_000);
        assert_eq!(config.cooldown_ms, 500);
        assert_eq!(config.eviction.max_tracked, 64);
        assert_eq!(config.eviction.sweep_interval_ms, 5_000);
        assert_eq!(config.eviction.idle_retention_ms, 1_000);
    }

    #[test]
    fn test_builder_saturates_huge_durations() {
        let builder = AdmissionControllerBuilder::new()
            .timeframe(Duration::MAX)
            .cooldown(Duration::MAX)
            .sweep_interval(Duration::MAX)
            .idle_retention(Duration::MAX);

        let config = builder.config();
        assert_eq!(config.timeframe_ms, u64::MAX);
        assert_eq!(config.cooldown_ms, u64::MAX);
        assert_eq!(config.eviction.sweep_interval_ms, u64::MAX);
        assert_eq!(config.eviction.idle_retention_ms, u64::MAX);

        let controller = builder.build::<String>();
        assert!(controller.check("u", 1).is_admit());
    }

    #[test]
    fn test_builder_try_build_errors() {
        let result = AdmissionControllerBuilder::new()
            .timeframe(Duration::from_micros(10))
            .try_build::<String>();
        assert!(matches!(result, Err(ConfigError::ZeroTimeframe)));

        let result = AdmissionControllerBuilder::new()
            .max_tracked(0)
            .try_build::<String>();
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_builder_from_config() {
        let controller = AdmissionControllerBuilder::from_config(AdmissionConfig::permissive())
            .build::<String>();
        assert_eq!(controller.config().max_events, 100);
    }

    #[test]
    fn test_builder_with_manual_clock() {
        let clock = ManualClock::new(1_000);
        let controller = AdmissionControllerBuilder::new()
            .max_events(1)
            .cooldown(Duration::from_secs(10))
            .clock(Arc::new(clock.clone()))
            .build::<String>();

        assert!(controller.check_now("a").is_admit());
        assert!(controller.check_now("a").is_reject());
        assert!(controller.is_cooling_down("a", clock.now_ms()));

        clock.advance(Duration::from_secs(10));
        assert!(!controller.is_cooling_down("a", clock.now_ms()));
        assert!(controller.check_now("a").is_admit());
    }

    #[test]
    fn test_shared_controller_across_threads() {
        let shared: SharedController = Arc::new(AdmissionController::new(AdmissionConfig::new(
            10, 60_000, 60_000,
        )));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let controller = shared.clone();
                thread::spawn(move || {
                    let identity = format!("worker-{i}");
                    (0..20)
                        .filter(|&t| controller.check(identity.as_str(), t).is_admit())
                        .count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 10);
        }
        assert_eq!(shared.tracked_identities(), 4);
        assert_eq!(shared.metrics().total_admitted, 40);
    }

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(MSRV, "1.70.0");
    }
}
