//! Counters and health reporting for an admission controller.
//!
//! ```text
//!     Admission Metrics:
//!     ┌─────────────────────────────────────┐
//!     │  Admitted:           9 412          │
//!     │  Cooldowns armed:       37          │
//!     │  Rejected (cooling):   611          │
//!     │  Rejected (capacity):    0          │
//!     │                                     │
//!     │  Health: ✅ Healthy                 │
//!     └─────────────────────────────────────┘
//! ```

use super::core::Outcome;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Rejection rate above which the controller is reported as degraded.
const DEGRADED_REJECTION_RATE: f64 = 0.2;

/// Rejection rate above which the controller is reported as critical.
const CRITICAL_REJECTION_RATE: f64 = 0.5;

/// Live counters, one per outcome kind.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    admitted: AtomicU64,
    cooldowns_armed: AtomicU64,
    rejected_cooling_down: AtomicU64,
    rejected_at_capacity: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Admitted => &self.admitted,
            Outcome::CooldownArmed { .. } => &self.cooldowns_armed,
            Outcome::CoolingDown { .. } => &self.rejected_cooling_down,
            Outcome::AtCapacity => &self.rejected_at_capacity,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AdmissionMetrics {
        AdmissionMetrics {
            total_admitted: self.admitted.load(Ordering::Relaxed),
            cooldowns_armed: self.cooldowns_armed.load(Ordering::Relaxed),
            rejected_cooling_down: self.rejected_cooling_down.load(Ordering::Relaxed),
            rejected_at_capacity: self.rejected_at_capacity.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.admitted.store(0, Ordering::Relaxed);
        self.cooldowns_armed.store(0, Ordering::Relaxed);
        self.rejected_cooling_down.store(0, Ordering::Relaxed);
        self.rejected_at_capacity.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a controller's counters.
///
/// Every `CooldownArmed` outcome is also a rejection: the event that fills
/// the window is the one that gets turned away.
///
/// ```rust
/// use floodgate::{AdmissionConfig, AdmissionController};
///
/// let controller = AdmissionController::<String>::new(AdmissionConfig::new(1, 60_000, 60_000));
/// controller.check("alice", 0);
/// controller.check("alice", 1);
/// controller.check("alice", 2);
///
/// let metrics = controller.metrics();
/// assert_eq!(metrics.total_admitted, 1);
/// assert_eq!(metrics.cooldowns_armed, 1);
/// assert_eq!(metrics.rejected_cooling_down, 1);
/// assert_eq!(metrics.total_rejected(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmissionMetrics {
    /// Events admitted.
    pub total_admitted: u64,

    /// Rejections that armed a new cooldown.
    pub cooldowns_armed: u64,

    /// Rejections because a cooldown was already running.
    pub rejected_cooling_down: u64,

    /// Rejections of new identities while the controller was full.
    pub rejected_at_capacity: u64,
}

impl AdmissionMetrics {
    /// All rejections, whatever the reason.
    #[inline]
    pub fn total_rejected(&self) -> u64 {
        self.cooldowns_armed + self.rejected_cooling_down + self.rejected_at_capacity
    }

    /// All checks performed.
    #[inline]
    pub fn total_checks(&self) -> u64 {
        self.total_admitted + self.total_rejected()
    }

    /// Fraction of checks admitted; 1.0 before any traffic.
    pub fn admit_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            1.0
        } else {
            self.total_admitted as f64 / total as f64
        }
    }

    /// Fraction of checks rejected.
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.admit_rate()
    }

    /// Coarse health assessment.
    ///
    /// Any capacity rejection is critical: legitimate first-time senders are
    /// being turned away for reasons that have nothing to do with their rate.
    pub fn health_status(&self) -> HealthStatus {
        let rejection_rate = self.rejection_rate();
        if self.rejected_at_capacity > 0 || rejection_rate > CRITICAL_REJECTION_RATE {
            HealthStatus::Critical
        } else if rejection_rate > DEGRADED_REJECTION_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "Admission Metrics:\n\
             ├─ Checks: {}\n\
             │  ├─ Admitted: {} ({:.2}%)\n\
             │  └─ Rejected: {} ({:.2}%)\n\
             ├─ Rejections:\n\
             │  ├─ Cooldowns Armed: {}\n\
             │  ├─ During Cooldown: {}\n\
             │  └─ At Capacity: {}\n\
             └─ Health: {}",
            self.total_checks(),
            self.total_admitted,
            self.admit_rate() * 100.0,
            self.total_rejected(),
            self.rejection_rate() * 100.0,
            self.cooldowns_armed,
            self.rejected_cooling_down,
            self.rejected_at_capacity,
            self.health_status(),
        )
    }
}

impl fmt::Display for AdmissionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Health of a controller, derived from its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Rejections are rare.
    Healthy,
    /// A noticeable share of traffic is being throttled.
    Degraded,
    /// Most traffic is rejected, or new identities are refused for capacity.
    Critical,
}

impl HealthStatus {
    /// `true` unless healthy.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Operator guidance.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Monitor closely, check for abusive senders or a too strict profile",
            Self::Critical => "Immediate action required: raise max_tracked or investigate flood",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Degraded => write!(f, "⚠️ Degraded"),
            Self::Critical => write!(f, "🔴 Critical"),
        }
    }
}
