//! # Admission Controller
//!
//! Owns the identity → state map and is the only way in or out of it.
//!
//! ## Architecture
//!
//! ```text
//!     Inbound messages:
//!     chat:1001 ──┐
//!     chat:1002 ──┤
//!     chat:1001 ──┼──► AdmissionController::check ──► Admit / Reject
//!     chat:2077 ──┤            │
//!     chat:1003 ──┘            ▼
//!                       ┌──────────────────┐
//!                       │  DashMap         │
//!                       │  ┌────────────┐  │   one shard lock held for the
//!                       │  │ id → state │  │   whole prune / count / append
//!                       │  │ id → state │  │
//!                       │  └────────────┘  │
//!                       └──────────────────┘
//! ```
//!
//! ## Memory Bounds
//!
//! 1. **Sweeping**: states that behave like fresh ones are dropped, either by
//!    [`AdmissionController::sweep`] or by the background sweeper thread.
//! 2. **Capacity cap**: at most `max_tracked` identities are tracked.
//! 3. **Emergency sweep**: at 90% of capacity, inserts first sweep redundant
//!    states, then the least recently seen ones, down to 70%.

use super::{
    clock::{Clock, SystemClock},
    config::AdmissionConfig,
    core::{Decision, Outcome, RateState},
    error::ConfigError,
    metrics::{AdmissionMetrics, Counters},
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on shards regardless of core count.
const MAX_SHARDS: usize = 64;

/// Minimum initial capacity per shard.
const MIN_SHARD_CAPACITY: usize = 16;

/// Per-identity admission controller.
///
/// Identities are any hashable key; the default is `String`, and lookups
/// accept borrowed forms such as `&str`.
///
/// ## Example
///
/// ```rust
/// use floodgate::{AdmissionConfig, AdmissionController, Decision};
///
/// let controller = AdmissionController::<String>::new(AdmissionConfig::strict());
///
/// for t in 0..5 {
///     assert_eq!(controller.check("u1", t), Decision::Admit);
/// }
/// assert_eq!(controller.check("u1", 5), Decision::Reject);
/// assert_eq!(controller.check("u1", 150_000), Decision::Reject);
/// assert_eq!(controller.check("u1", 300_006), Decision::Admit);
///
/// // Other identities are unaffected.
/// assert_eq!(controller.check("u2", 6), Decision::Admit);
/// ```
///
/// ## Sharing
///
/// ```rust
/// use floodgate::{AdmissionConfig, AdmissionController};
/// use std::sync::Arc;
/// use std::thread;
///
/// let controller = Arc::new(AdmissionController::<String>::new(AdmissionConfig::permissive()));
///
/// let handles: Vec<_> = (0..4)
///     .map(|i| {
///         let controller = controller.clone();
///         thread::spawn(move || controller.check_now(&format!("chat:{i}")))
///     })
///     .collect();
///
/// for handle in handles {
///     assert!(handle.join().unwrap().is_admit());
/// }
/// ```
pub struct AdmissionController<K = String>
where
    K: Eq + Hash,
{
    /// Identity → state. Each check runs under the entry's shard lock.
    states: DashMap<K, RateState, ahash::RandomState>,

    /// Number of tracked identities, kept alongside the map for cheap reads.
    tracked: AtomicUsize,

    /// Immutable settings.
    config: AdmissionConfig,

    /// Time source for `check_now`, `sweep_now` and the sweeper thread.
    clock: Arc<dyn Clock>,

    /// Per-outcome counters.
    counters: Counters,

    /// Identities ever inserted.
    total_created: AtomicU64,

    /// Identities ever removed (sweeps, emergency eviction, forget, clear).
    total_evicted: AtomicU64,

    /// Set while an emergency sweep runs so only one thread does it.
    emergency_in_progress: AtomicBool,
}

impl<K> AdmissionController<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Creates a controller using the system clock.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Use [`try_new`](Self::try_new)
    /// to handle that case.
    pub fn new(config: AdmissionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a controller, rejecting invalid configuration.
    pub fn try_new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        Self::try_with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a controller with a custom time source.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn with_clock(config: AdmissionConfig, clock: Arc<dyn Clock>) -> Self {
        match Self::try_with_clock(config, clock) {
            Ok(controller) => controller,
            Err(err) => panic!("invalid admission configuration: {err}"),
        }
    }

    /// Creates a controller with a custom time source, rejecting invalid
    /// configuration.
    pub fn try_with_clock(
        config: AdmissionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        // More shards = less contention between identities, more memory
        let num_shards = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .saturating_mul(4)
            .next_power_of_two()
            .clamp(2, MAX_SHARDS);

        let per_shard = (config.eviction.max_tracked / num_shards)
            .clamp(MIN_SHARD_CAPACITY, 1024);

        Ok(Self {
            states: DashMap::with_capacity_and_hasher_and_shard_amount(
                per_shard * num_shards,
                ahash::RandomState::new(),
                num_shards,
            ),
            tracked: AtomicUsize::new(0),
            config,
            clock,
            counters: Counters::default(),
            total_created: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            emergency_in_progress: AtomicBool::new(false),
        })
    }

    /// Decides whether an event from `identity` at `now` (ms) may proceed.
    ///
    /// `now` must not be older than a previous `now` for the same identity.
    #[inline]
    pub fn check<Q>(&self, identity: &Q, now: u64) -> Decision
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.check_detailed(identity, now).decision()
    }

    /// [`check`](Self::check) at the controller clock's current time.
    #[inline]
    pub fn check_now<Q>(&self, identity: &Q) -> Decision
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.check(identity, self.clock.now_ms())
    }

    /// Like [`check`](Self::check) but reports why an event was rejected.
    pub fn check_detailed<Q>(&self, identity: &Q, now: u64) -> Outcome
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        // Fast path: identity already tracked, no allocation
        let existing = self
            .states
            .get_mut(identity)
            .map(|mut state| state.check(now, &self.config));

        let outcome = match existing {
            Some(outcome) => outcome,
            None => self.check_untracked(identity.to_owned(), now),
        };

        if let Outcome::CooldownArmed { until } = outcome {
            debug!(
                identity = ?identity.to_owned(),
                until,
                "window budget exceeded, cooldown armed"
            );
        }

        self.counters.record(outcome);
        outcome
    }

    /// Slow path: the identity was not tracked a moment ago.
    fn check_untracked(&self, identity: K, now: u64) -> Outcome {
        let eviction = &self.config.eviction;

        if self.tracked.load(Ordering::Acquire) >= eviction.emergency_threshold() {
            self.emergency_sweep(now);
        }

        match self.states.entry(identity) {
            Entry::Occupied(mut occupied) => {
                // Another thread inserted it in the meantime
                occupied.get_mut().check(now, &self.config)
            }
            Entry::Vacant(vacant) => {
                let prev = self.tracked.fetch_add(1, Ordering::AcqRel);
                if prev >= eviction.max_tracked {
                    self.tracked.fetch_sub(1, Ordering::AcqRel);
                    warn!(
                        identity = ?vacant.key(),
                        max_tracked = eviction.max_tracked,
                        "admission controller at capacity, rejecting new identity"
                    );
                    return Outcome::AtCapacity;
                }

                debug!(identity = ?vacant.key(), now, "tracking new identity");
                vacant.insert(RateState::first(now, &self.config));
                self.total_created.fetch_add(1, Ordering::Relaxed);
                Outcome::Admitted
            }
        }
    }

    /// Whether `identity` is serving a cooldown at `now`. Never creates state.
    pub fn is_cooling_down<Q>(&self, identity: &Q, now: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cooldown_remaining(identity, now).is_some()
    }

    /// Time left on `identity`'s cooldown at `now`, if one is running.
    pub fn cooldown_remaining<Q>(&self, identity: &Q, now: u64) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states
            .get(identity)
            .and_then(|state| state.cooling_down(now))
            .map(|until| Duration::from_millis(until - now))
    }

    /// Number of events currently counted in `identity`'s window.
    ///
    /// Entries are pruned lazily, so this may include events that the next
    /// check would discard.
    pub fn window_len<Q>(&self, identity: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.states.get(identity).map_or(0, |state| state.window_len())
    }

    /// Drops all state for `identity`, lifting any cooldown.
    ///
    /// Returns `true` if the identity was tracked.
    pub fn forget<Q>(&self, identity: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.states.remove(identity).is_some() {
            self.tracked.fetch_sub(1, Ordering::AcqRel);
            self.total_evicted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Removes every state that has been redundant for at least
    /// `idle_retention_ms` at `now`. Returns the number removed.
    ///
    /// A redundant state answers the next check exactly as a fresh one
    /// would, so sweeping never changes a verdict as long as no later check
    /// for a swept identity passes a `now` older than the sweep's.
    ///
    /// Callers whose timestamps may lag the sweeping clock (the background
    /// sweeper reads the controller clock, callers may read their own) must
    /// set `idle_retention_ms` to at least that lag. Otherwise a lagging
    /// check can find the state of an identity still cooling down at its own
    /// `now` already gone, and be admitted.
    pub fn sweep(&self, now: u64) -> usize {
        // An emergency sweep is already thinning the map
        if self.emergency_in_progress.load(Ordering::Acquire) {
            return 0;
        }

        let removed = self.remove_redundant(now, self.config.eviction.idle_retention_ms);
        if removed > 0 {
            debug!(removed, remaining = self.tracked_identities(), "swept idle identities");
        }

        self.shrink_to_fit();
        removed
    }

    /// [`sweep`](Self::sweep) at the controller clock's current time.
    pub fn sweep_now(&self) -> usize {
        self.sweep(self.clock.now_ms())
    }

    fn remove_redundant(&self, now: u64, retention_ms: u64) -> usize {
        let timeframe_ms = self.config.timeframe_ms;
        let mut removed = 0usize;

        self.states.retain(|_, state| {
            if state.is_evictable(now, timeframe_ms, retention_ms) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.tracked.fetch_sub(removed, Ordering::AcqRel);
            self.total_evicted.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Makes room when the map nears capacity.
    ///
    /// Redundant states go first, ignoring the retention grace period. If
    /// that is not enough, the least recently seen identities are dropped,
    /// which forgets their window and any running cooldown.
    fn emergency_sweep(&self, now: u64) {
        if self
            .emergency_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let _guard = EmergencyGuard {
            flag: &self.emergency_in_progress,
        };

        let target = self.config.eviction.emergency_target();
        let before = self.tracked.load(Ordering::Acquire);
        if before <= target {
            return;
        }

        info!(tracked = before, target, "starting emergency sweep");

        let mut removed = self.remove_redundant(now, 0);

        let excess = self.tracked.load(Ordering::Acquire).saturating_sub(target);
        if excess > 0 {
            let mut candidates: Vec<(u64, K)> = self
                .states
                .iter()
                .map(|entry| (entry.value().last_seen(), entry.key().clone()))
                .collect();
            candidates.sort_unstable_by_key(|(last_seen, _)| *last_seen);

            let mut dropped = 0usize;
            for (last_seen, identity) in candidates.into_iter().take(excess) {
                // Skip identities that were active while we were collecting
                if self
                    .states
                    .remove_if(&identity, |_, state| state.last_seen() <= last_seen)
                    .is_some()
                {
                    dropped += 1;
                }
            }

            if dropped > 0 {
                self.tracked.fetch_sub(dropped, Ordering::AcqRel);
                self.total_evicted.fetch_add(dropped as u64, Ordering::Relaxed);
                warn!(dropped, "emergency sweep evicted active identities");
            }
            removed += dropped;
        }

        let after = self.tracked.load(Ordering::Acquire);
        info!(removed, tracked = after, "emergency sweep finished");
        if after > target {
            warn!(tracked = after, target, "emergency sweep incomplete");
        }
    }

    /// Releases map capacity left over from a large sweep.
    pub fn shrink_to_fit(&self) {
        let current = self.tracked.load(Ordering::Acquire);
        let capacity = self.states.capacity();

        if capacity > current.saturating_mul(4) && capacity > 1024 {
            self.states.shrink_to_fit();
            debug!(from = capacity, to = current, "shrunk identity map");
        }
    }

    /// Number of identities currently tracked.
    #[inline]
    pub fn tracked_identities(&self) -> usize {
        self.tracked.load(Ordering::Acquire)
    }

    /// The configuration this controller was built with.
    #[inline]
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Snapshot of the per-outcome counters.
    pub fn metrics(&self) -> AdmissionMetrics {
        self.counters.snapshot()
    }

    /// Zeroes the per-outcome counters. Tracked state is untouched.
    pub fn reset_metrics(&self) {
        self.counters.reset();
    }

    /// Capacity and lifetime statistics.
    pub fn stats(&self) -> ControllerStats {
        let tracked = self.tracked_identities();
        let max_tracked = self.config.eviction.max_tracked;
        ControllerStats {
            tracked,
            max_tracked,
            total_created: self.total_created.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            capacity_used: tracked as f64 / max_tracked as f64,
        }
    }

    /// Drops every tracked identity.
    ///
    /// Inserts racing with this call may survive it; the tracked count only
    /// drops by what was actually removed.
    pub fn clear(&self) {
        let mut count = 0usize;
        self.states.retain(|_, _| {
            count += 1;
            false
        });

        if count > 0 {
            self.tracked.fetch_sub(count, Ordering::AcqRel);
            self.total_evicted.fetch_add(count as u64, Ordering::Relaxed);
        }
        info!(count, "cleared all identities");
    }
}

impl<K> AdmissionController<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Starts a background thread that sweeps every `sweep_interval_ms`.
    ///
    /// The thread stops when a message is sent on the returned channel or
    /// the sender is dropped.
    ///
    /// ```rust
    /// use floodgate::{AdmissionConfig, AdmissionController};
    /// use std::sync::Arc;
    ///
    /// let controller = Arc::new(AdmissionController::<String>::new(AdmissionConfig::strict()));
    /// let (handle, stop) = controller.clone().start_sweeper().unwrap();
    ///
    /// stop.send(()).unwrap();
    /// handle.join().unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start_sweeper(
        self: Arc<Self>,
    ) -> std::io::Result<(thread::JoinHandle<()>, mpsc::Sender<()>)> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = Duration::from_millis(self.config.eviction.sweep_interval_ms);

        let handle = thread::Builder::new()
            .name("floodgate-sweeper".to_string())
            .spawn(move || {
                info!(
                    interval_ms = self.config.eviction.sweep_interval_ms,
                    "sweeper started"
                );

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("sweeper stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            self.sweep_now();

                            let stats = self.stats();
                            if stats.tracked > self.config.eviction.emergency_threshold() {
                                warn!(
                                    tracked = stats.tracked,
                                    percent = stats.capacity_used * 100.0,
                                    "high identity count after sweep"
                                );
                            }
                        }
                    }
                }
            })?;

        Ok((handle, stop_tx))
    }
}

impl<K> Debug for AdmissionController<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("tracked", &self.tracked.load(Ordering::Relaxed))
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Resets the emergency flag on every exit path.
struct EmergencyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for EmergencyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Capacity and lifetime statistics for a controller.
#[derive(Debug, Clone)]
pub struct ControllerStats {
    /// Identities currently tracked.
    pub tracked: usize,

    /// Configured cap.
    pub max_tracked: usize,

    /// Identities inserted since startup.
    pub total_created: u64,

    /// Identities removed since startup.
    pub total_evicted: u64,

    /// `tracked / max_tracked`, 0.0 to 1.0.
    pub capacity_used: f64,
}

impl ControllerStats {
    /// Multi-line report for logs.
    pub fn summary(&self) -> String {
        format!(
            "Admission Controller Stats:\n\
             ├─ Capacity:\n\
             │  ├─ Tracked Identities: {}/{}\n\
             │  ├─ Capacity Used: {:.2}%\n\
             │  └─ Available Slots: {}\n\
             └─ Lifetime:\n\
                ├─ Total Created: {}\n\
                ├─ Total Evicted: {}\n\
                └─ Net Tracked: {}",
            self.tracked,
            self.max_tracked,
            self.capacity_used * 100.0,
            self.max_tracked.saturating_sub(self.tracked),
            self.total_created,
            self.total_evicted,
            self.total_created.saturating_sub(self.total_evicted)
        )
    }

    /// `true` above 80% of capacity.
    pub fn is_near_capacity(&self) -> bool {
        self.capacity_used > 0.8
    }

    /// Share of created identities that have since been evicted.
    pub fn eviction_ratio(&self) -> f64 {
        if self.total_created == 0 {
            0.0
        } else {
            self.total_evicted as f64 / self.total_created as f64
        }
    }
}

impl std::fmt::Display for ControllerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}
