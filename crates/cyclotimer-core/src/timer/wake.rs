use std::time::Duration;

use tracing::debug;

use super::state::{Phase, SessionState};

/// Shortest lease ever requested.
pub const MIN_LEASE: Duration = Duration::from_secs(10 * 60);
/// Longest lease ever requested.
pub const MAX_LEASE: Duration = Duration::from_secs(2 * 60 * 60);
/// Cycles assumed for the lease estimate of an unlimited session.
const UNLIMITED_ESTIMATE_CYCLES: u64 = 3;

/// Platform resource that keeps the host awake (e.g. a partial wake lock).
pub trait WakeLock: Send {
    /// Hold the lock for at most `timeout`.
    fn acquire(&mut self, timeout: Duration);
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Lock that holds nothing. For hosts without such a resource.
#[derive(Debug, Default)]
pub struct NoWakeLock {
    held: bool,
}

impl WakeLock for NoWakeLock {
    fn acquire(&mut self, _timeout: Duration) {
        self.held = true;
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Bounded wrapper: every acquisition is clamped to `[MIN_LEASE, MAX_LEASE]`.
pub struct WakeLease {
    lock: Box<dyn WakeLock>,
}

impl WakeLease {
    pub fn new(lock: Box<dyn WakeLock>) -> Self {
        Self { lock }
    }

    /// Acquire for the estimated rest of the session if not already held.
    /// Returns the lease length requested.
    pub fn acquire_for(&mut self, state: &SessionState) -> Option<Duration> {
        if self.lock.is_held() {
            return None;
        }
        let lease = lease_duration(state);
        self.lock.acquire(lease);
        debug!(lease_ms = lease.as_millis() as u64, "wake lease acquired");
        Some(lease)
    }

    pub fn release(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
            debug!("wake lease released");
        }
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_held()
    }
}

/// Estimated time left in the session, clamped to the lease bounds.
pub fn lease_duration(state: &SessionState) -> Duration {
    let remaining_cycles = match state.settings.repeat_count.limit() {
        None => UNLIMITED_ESTIMATE_CYCLES,
        Some(limit) => {
            let in_progress = match state.phase {
                Phase::Active => 1,
                Phase::Rest => 0,
            };
            (limit as u64).saturating_sub(state.completed_cycles as u64 + in_progress)
        }
    };
    let total = state
        .remaining_ms
        .saturating_add(remaining_cycles.saturating_mul(state.settings.cycle_duration_ms()));
    Duration::from_millis(total).clamp(MIN_LEASE, MAX_LEASE)
}
