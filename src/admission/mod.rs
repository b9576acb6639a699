//! # Admission Module
//!
//! Internal implementation of per-identity admission control.
//!
//! ## Module Structure
//!
//! ```text
//!     admission/
//!     ├── mod.rs          (module organization)
//!     ├── clock.rs        (time sources)
//!     ├── config.rs       (budget, cooldown, eviction, TOML loading)
//!     ├── core.rs         (sliding window + cooldown state machine)
//!     ├── error.rs        (configuration errors)
//!     ├── manager.rs      (identity map, sweeping, capacity)
//!     └── metrics.rs      (outcome counters and health)
//! ```
//!
//! ## Flow
//!
//! ```text
//!     check(identity, now)
//!          │
//!          ▼
//!     ┌────────────┐
//!     │ Controller │ ◄── finds or creates the identity's state
//!     └─────┬──────┘
//!           │ shard lock held
//!           ▼
//!     ┌────────────┐
//!     │ RateState  │ ◄── cooldown? prune, count, append or arm
//!     └─────┬──────┘
//!           │
//!           ▼
//!     ┌────────────┐
//!     │  Counters  │ ◄── one increment per outcome
//!     └────────────┘
//! ```

mod clock;
mod config;
mod core;
mod error;
mod manager;
mod metrics;

/// Time sources
pub use clock::{current_time_ms, Clock, ManualClock, SystemClock};
pub(crate) use clock::duration_ms;

/// Settings and profiles
pub use config::{
    AdmissionConfig, EvictionConfig, Profile, DEFAULT_MAX_TRACKED, DEFAULT_SWEEP_INTERVAL_MS,
};

/// Verdicts
pub use self::core::{Decision, Outcome};

/// Errors
pub use error::ConfigError;

/// The per-identity controller
pub use manager::{AdmissionController, ControllerStats};

/// Observability
pub use metrics::{AdmissionMetrics, HealthStatus};
