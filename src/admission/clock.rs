//! Time sources.
//!
//! Every check takes an explicit `now` in milliseconds. The controller also
//! carries a [`Clock`] for the convenience entry points (`check_now`,
//! `sweep_now`) and for the background sweeper.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch captured once, advanced with a monotonic Instant so the
// result never goes backwards when the system clock is adjusted.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// Milliseconds since the UNIX epoch, monotonic within the process.
///
/// ```rust
/// use floodgate::current_time_ms;
///
/// let a = current_time_ms();
/// let b = current_time_ms();
/// assert!(b >= a);
/// ```
#[inline]
pub fn current_time_ms() -> u64 {
    let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
        let epoch_ms = duration_ms(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        );
        (Instant::now(), epoch_ms)
    });
    base_ms.saturating_add(duration_ms(start.elapsed()))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Source of "now" in milliseconds.
pub trait Clock: Send + Sync + Debug {
    /// Current time in milliseconds. Must never decrease.
    fn now_ms(&self) -> u64;
}

/// Process-monotonic wall clock backed by [`current_time_ms`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time value, so a test can hand one clone to the
/// controller and keep another to drive it.
///
/// ```rust
/// use floodgate::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// let handle = clock.clone();
/// handle.advance(Duration::from_secs(2));
/// assert_eq!(clock.now_ms(), 3_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.advance_ms(duration_ms(by));
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }

    /// Jumps to `ms`. Callers are responsible for not going backwards.
    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_monotonicity() {
        let mut last = 0;
        for _ in 0..10 {
            let now = current_time_ms();
            assert!(now >= last);
            last = now;
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_system_clock_tracks_current_time() {
        let clock = SystemClock;
        let before = current_time_ms();
        let now = clock.now_ms();
        let after = current_time_ms();
        assert!(before <= now && now <= after);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(500);
        assert_eq!(clock.now_ms(), 500);

        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 750);

        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_ms(), 1_750);

        clock.set_ms(10_000);
        assert_eq!(clock.now_ms(), 10_000);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::from_micros(999)), 0);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let remote = clock.clone();

        std::thread::spawn(move || remote.advance_ms(42))
            .join()
            .unwrap();

        assert_eq!(clock.now_ms(), 42);
    }
}
