//! # Per-Identity Admission State
//!
//! The sliding-window-with-cooldown state machine. One [`RateState`] exists
//! per tracked identity; the controller serializes access to it, so nothing
//! here is concurrent.
//!
//! ## State Machine
//!
//! ```text
//!                  first event (admit)
//!     Fresh ───────────────────────────► Active ◄──┐ under budget (admit)
//!                                          │  └────┘
//!                            window full   │
//!                       (reject, arm timer)▼
//!                                       Cooldown ◄─┐ now < until (reject)
//!                                          │  └────┘
//!              now >= until, next event    │
//!              (admit, window reset)       ▼
//!                                        Active
//! ```
//!
//! ## Window Pruning
//!
//! ```text
//!     timeframe = 60_000, now = 61_000
//!
//!     timestamps: [0, 10, 20, 30, 40]
//!                  ▲ 61_000 - 0 > 60_000 → dropped (and so on)
//!     after prune: []
//! ```
//!
//! An entry survives while `now - ts <= timeframe`.

use super::config::AdmissionConfig;
use std::collections::VecDeque;
use std::time::Duration;

/// Upper bound on the initial window allocation.
const MAX_INITIAL_WINDOW_CAPACITY: usize = 64;

/// Verdict of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The message may proceed.
    Admit,
    /// The message must be dropped.
    Reject,
}

impl Decision {
    /// `true` for [`Decision::Admit`].
    #[inline]
    pub fn is_admit(self) -> bool {
        matches!(self, Self::Admit)
    }

    /// `true` for [`Decision::Reject`].
    #[inline]
    pub fn is_reject(self) -> bool {
        matches!(self, Self::Reject)
    }
}

/// Detailed result of a check.
///
/// Callers that only care about the verdict convert this into a
/// [`Decision`]. The variants distinguish why a rejection happened, which the
/// glue layer needs to word its throttling notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Event admitted and recorded in the window.
    Admitted,
    /// The window was full. A new cooldown now runs until `until`.
    CooldownArmed {
        /// Instant (ms) the cooldown ends.
        until: u64,
    },
    /// An earlier cooldown is still running until `until`.
    CoolingDown {
        /// Instant (ms) the cooldown ends.
        until: u64,
    },
    /// A previously unseen identity could not be tracked because the
    /// controller is at capacity.
    AtCapacity,
}

impl Outcome {
    /// The caller-visible verdict.
    #[inline]
    pub fn decision(self) -> Decision {
        match self {
            Self::Admitted => Decision::Admit,
            _ => Decision::Reject,
        }
    }

    /// Time left until the identity may send again, if it is cooling down.
    ///
    /// ```rust
    /// use floodgate::Outcome;
    /// use std::time::Duration;
    ///
    /// let outcome = Outcome::CooldownArmed { until: 300_005 };
    /// assert_eq!(outcome.retry_after(5), Some(Duration::from_secs(300)));
    /// assert_eq!(Outcome::Admitted.retry_after(5), None);
    /// ```
    pub fn retry_after(self, now: u64) -> Option<Duration> {
        match self {
            Self::CooldownArmed { until } | Self::CoolingDown { until } => {
                Some(Duration::from_millis(until.saturating_sub(now)))
            }
            Self::Admitted | Self::AtCapacity => None,
        }
    }
}

impl From<Outcome> for Decision {
    fn from(outcome: Outcome) -> Self {
        outcome.decision()
    }
}

/// Recent events and penalty status for one identity.
#[derive(Debug, Clone)]
pub(crate) struct RateState {
    /// Event instants inside the window, oldest first.
    timestamps: VecDeque<u64>,

    /// Instant before which every event is rejected. 0 means none.
    cooldown_until: u64,

    /// Most recent check time, admitted or not. Drives LRU eviction.
    last_seen: u64,
}

impl RateState {
    /// State for an identity whose first event arrives at `now`.
    ///
    /// The first event is always admitted, so it is recorded immediately.
    pub(crate) fn first(now: u64, config: &AdmissionConfig) -> Self {
        let capacity = (config.max_events as usize).min(MAX_INITIAL_WINDOW_CAPACITY);
        let mut timestamps = VecDeque::with_capacity(capacity);
        timestamps.push_back(now);
        Self {
            timestamps,
            cooldown_until: 0,
            last_seen: now,
        }
    }

    /// Runs one admission check at `now`.
    ///
    /// `now` must not be older than any earlier `now` passed for this state.
    pub(crate) fn check(&mut self, now: u64, config: &AdmissionConfig) -> Outcome {
        self.last_seen = self.last_seen.max(now);

        if self.cooldown_until > now {
            return Outcome::CoolingDown {
                until: self.cooldown_until,
            };
        }

        // A served cooldown wipes the slate.
        if self.cooldown_until != 0 {
            self.cooldown_until = 0;
            self.timestamps.clear();
        }

        self.prune(now, config.timeframe_ms);

        if self.timestamps.len() >= config.max_events as usize {
            self.cooldown_until = now.saturating_add(config.cooldown_ms);
            return Outcome::CooldownArmed {
                until: self.cooldown_until,
            };
        }

        self.timestamps.push_back(now);
        Outcome::Admitted
    }

    /// Drops entries that fell out of the window.
    #[inline]
    fn prune(&mut self, now: u64, timeframe_ms: u64) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_sub(oldest) > timeframe_ms {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// End of the cooldown if one is running at `now`.
    #[inline]
    pub(crate) fn cooling_down(&self, now: u64) -> Option<u64> {
        (self.cooldown_until > now).then_some(self.cooldown_until)
    }

    /// First instant at which this state behaves exactly like a fresh one.
    ///
    /// From then on the cooldown has passed and the newest event is outside
    /// the window, so a check admits and leaves `[now]` behind, same as a
    /// first-ever event.
    pub(crate) fn redundant_from(&self, timeframe_ms: u64) -> u64 {
        let window_end = self
            .timestamps
            .back()
            .map_or(0, |&newest| newest.saturating_add(timeframe_ms).saturating_add(1));
        window_end.max(self.cooldown_until)
    }

    /// Whether the state may be evicted at `now` after `retention_ms` grace.
    #[inline]
    pub(crate) fn is_evictable(&self, now: u64, timeframe_ms: u64, retention_ms: u64) -> bool {
        now >= self.redundant_from(timeframe_ms).saturating_add(retention_ms)
    }

    #[inline]
    pub(crate) fn last_seen(&self) -> u64 {
        self.last_seen
    }

    #[inline]
    pub(crate) fn window_len(&self) -> usize {
        self.timestamps.len()
    }

    #[cfg(test)]
    pub(crate) fn timestamps(&self) -> Vec<u64> {
        self.timestamps.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> AdmissionConfig {
        AdmissionConfig::new(5, 60_000, 300_000)
    }

    #[test]
    fn test_first_event_admitted_and_recorded() {
        let state = RateState::first(42, &strict());
        assert_eq!(state.timestamps(), vec![42]);
        assert_eq!(state.cooling_down(42), None);
        assert_eq!(state.last_seen(), 42);
    }

    #[test]
    fn test_budget_then_cooldown() {
        let config = strict();
        let mut state = RateState::first(0, &config);

        for t in 1..5 {
            assert_eq!(state.check(t, &config), Outcome::Admitted);
        }
        assert_eq!(state.window_len(), 5);

        // The sixth event in the window arms the cooldown instead of being admitted.
        assert_eq!(
            state.check(5, &config),
            Outcome::CooldownArmed { until: 300_005 }
        );
        assert_eq!(state.window_len(), 5);

        assert_eq!(
            state.check(150_000, &config),
            Outcome::CoolingDown { until: 300_005 }
        );

        assert_eq!(state.check(300_006, &config), Outcome::Admitted);
        assert_eq!(state.timestamps(), vec![300_006]);
    }

    #[test]
    fn test_rejections_during_cooldown_do_not_extend_it() {
        let config = AdmissionConfig::new(1, 1_000, 10_000);
        let mut state = RateState::first(0, &config);

        assert_eq!(state.check(1, &config), Outcome::CooldownArmed { until: 10_001 });
        for t in [2, 500, 5_000, 10_000] {
            assert_eq!(state.check(t, &config), Outcome::CoolingDown { until: 10_001 });
        }
        assert_eq!(state.check(10_001, &config), Outcome::Admitted);
    }

    #[test]
    fn test_window_slides() {
        let config = strict();

        let mut late = RateState::first(0, &config);
        for t in [10, 20, 30, 40] {
            assert_eq!(late.check(t, &config), Outcome::Admitted);
        }
        assert_eq!(late.check(61_000, &config), Outcome::Admitted);

        let mut early = RateState::first(0, &config);
        for t in [10, 20, 30, 40] {
            assert_eq!(early.check(t, &config), Outcome::Admitted);
        }
        assert_eq!(
            early.check(59_000, &config),
            Outcome::CooldownArmed { until: 359_000 }
        );
    }

    #[test]
    fn test_prune_boundary_is_inclusive() {
        let config = AdmissionConfig::new(1, 1_000, 0);
        let mut state = RateState::first(0, &config);

        // now - ts == timeframe still counts.
        assert!(matches!(
            state.check(1_000, &config),
            Outcome::CooldownArmed { .. }
        ));

        let mut state = RateState::first(0, &config);
        assert_eq!(state.check(1_001, &config), Outcome::Admitted);
        assert_eq!(state.timestamps(), vec![1_001]);
    }

    #[test]
    fn test_cooldown_is_a_hard_reset() {
        // Cooldown shorter than the window: old events would otherwise still count.
        let config = AdmissionConfig::new(2, 60_000, 1_000);
        let mut state = RateState::first(0, &config);
        assert_eq!(state.check(1, &config), Outcome::Admitted);
        assert_eq!(state.check(2, &config), Outcome::CooldownArmed { until: 1_002 });

        assert_eq!(state.check(1_002, &config), Outcome::Admitted);
        assert_eq!(state.timestamps(), vec![1_002]);
        assert_eq!(state.check(1_003, &config), Outcome::Admitted);
        assert!(matches!(state.check(1_004, &config), Outcome::CooldownArmed { .. }));
    }

    #[test]
    fn test_zero_cooldown() {
        let config = AdmissionConfig::new(2, 60_000, 0);
        let mut state = RateState::first(100, &config);
        assert_eq!(state.check(101, &config), Outcome::Admitted);
        assert_eq!(state.check(102, &config), Outcome::CooldownArmed { until: 102 });
        assert_eq!(state.cooling_down(102), None);
        assert_eq!(state.check(103, &config), Outcome::Admitted);
    }

    #[test]
    fn test_non_monotonic_now_does_not_panic() {
        let config = strict();
        let mut state = RateState::first(1_000, &config);
        assert_eq!(state.check(10, &config), Outcome::Admitted);
        assert_eq!(state.last_seen(), 1_000);
    }

    #[test]
    fn test_saturating_cooldown() {
        let config = AdmissionConfig::new(1, 10, u64::MAX);
        let mut state = RateState::first(5, &config);
        assert_eq!(
            state.check(6, &config),
            Outcome::CooldownArmed { until: u64::MAX }
        );
    }

    #[test]
    fn test_redundancy() {
        let config = AdmissionConfig::new(2, 1_000, 5_000);
        let mut state = RateState::first(0, &config);
        assert_eq!(state.redundant_from(config.timeframe_ms), 1_001);
        assert!(!state.is_evictable(1_000, config.timeframe_ms, 0));
        assert!(state.is_evictable(1_001, config.timeframe_ms, 0));
        assert!(!state.is_evictable(1_001, config.timeframe_ms, 10));
        assert!(state.is_evictable(1_011, config.timeframe_ms, 10));

        state.check(1, &config);
        state.check(2, &config);
        // Cooldown until 5_002 dominates the window end at 1_002.
        assert_eq!(state.redundant_from(config.timeframe_ms), 5_002);
        assert!(!state.is_evictable(5_001, config.timeframe_ms, 0));
        assert!(state.is_evictable(5_002, config.timeframe_ms, 0));
    }

    #[test]
    fn test_evictable_state_behaves_like_fresh() {
        let config = AdmissionConfig::new(3, 1_000, 2_000);
        let mut state = RateState::first(0, &config);
        for t in 1..=3 {
            state.check(t, &config);
        }
        let now = state.redundant_from(config.timeframe_ms);
        assert!(state.is_evictable(now, config.timeframe_ms, 0));

        let fresh = RateState::first(now, &config);
        assert_eq!(state.check(now, &config), Outcome::Admitted);
        assert_eq!(state.timestamps(), fresh.timestamps());
    }

    #[test]
    fn test_outcome_conversions() {
        assert_eq!(Decision::from(Outcome::Admitted), Decision::Admit);
        assert_eq!(Outcome::CooldownArmed { until: 1 }.decision(), Decision::Reject);
        assert_eq!(Outcome::CoolingDown { until: 1 }.decision(), Decision::Reject);
        assert_eq!(Outcome::AtCapacity.decision(), Decision::Reject);

        assert!(Decision::Admit.is_admit());
        assert!(Decision::Reject.is_reject());
        assert!(!Decision::Reject.is_admit());
    }

    #[test]
    fn test_retry_after() {
        let outcome = Outcome::CoolingDown { until: 1_500 };
        assert_eq!(outcome.retry_after(1_000), Some(Duration::from_millis(500)));
        assert_eq!(outcome.retry_after(2_000), Some(Duration::ZERO));
        assert_eq!(Outcome::AtCapacity.retry_after(0), None);
    }
}
