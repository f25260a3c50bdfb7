//! Deadline-based wake-up scheduling.
//!
//! [`DeadlineScheduler`] keeps at most one pending wake-up, the one for "the
//! current phase has elapsed". It asks its [`WakeupBackend`] for precise
//! delivery first and falls back to best-effort delivery when precise
//! delivery is refused. A delivered wake-up is one-shot; the caller re-arms.
//!
//! Backends may deliver late, and may deliver the same wake-up more than
//! once. [`DeadlineScheduler::accept`] turns every delivery that does not
//! match the pending token into [`Acceptance::Stale`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::Clock;
use crate::error::ScheduleError;

/// Default rounding window for best-effort delivery.
pub const DEFAULT_INEXACT_WINDOW_MS: u64 = 2_000;
/// Longest single sleep before the wall clock is read again.
pub const RECHECK_SLICE_MS: u64 = 1_000;

/// A requested wake-up. `token` is the generation of the phase run it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wakeup {
    pub token: u64,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Exact,
    Inexact,
}

/// The OS-level scheduler seam.
pub trait WakeupBackend: Send {
    /// Request delivery at exactly `wakeup.deadline_ms`.
    fn schedule_exact(&mut self, wakeup: Wakeup) -> Result<(), ScheduleError>;

    /// Request delivery no earlier than `wakeup.deadline_ms`. Never refuses.
    fn schedule_inexact(&mut self, wakeup: Wakeup);

    /// Withdraw a pending request. Unknown tokens are ignored.
    fn cancel(&mut self, token: u64);
}

/// Result of matching a delivered wake-up against the pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The delivery ends the pending request; carries the armed wake-up.
    Current(Wakeup),
    /// Duplicate, late or cancelled delivery.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    wakeup: Wakeup,
    mode: DeliveryMode,
}

pub struct DeadlineScheduler {
    backend: Box<dyn WakeupBackend>,
    pending: Option<Pending>,
    degraded: bool,
}

impl DeadlineScheduler {
    pub fn new(backend: Box<dyn WakeupBackend>) -> Self {
        Self {
            backend,
            pending: None,
            degraded: false,
        }
    }

    /// Replace any pending wake-up with one at `deadline_ms`.
    pub fn arm(&mut self, deadline_ms: u64, token: u64) -> DeliveryMode {
        self.cancel();
        let wakeup = Wakeup { token, deadline_ms };
        let mode = match self.backend.schedule_exact(wakeup) {
            Ok(()) => {
                if self.degraded {
                    info!(token, "exact wake-ups available again");
                }
                self.degraded = false;
                DeliveryMode::Exact
            }
            Err(err) => {
                warn!(%err, token, deadline_ms, "exact wake-up refused, falling back to inexact delivery");
                self.backend.schedule_inexact(wakeup);
                self.degraded = true;
                DeliveryMode::Inexact
            }
        };
        debug!(token, deadline_ms, ?mode, "wake-up armed");
        self.pending = Some(Pending { wakeup, mode });
        mode
    }

    /// Withdraw the pending wake-up. Returns whether one existed.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(p) => {
                self.backend.cancel(p.wakeup.token);
                debug!(token = p.wakeup.token, "wake-up cancelled");
                true
            }
            None => false,
        }
    }

    /// Match a delivery against the pending wake-up, consuming it on a match.
    pub fn accept(&mut self, fired: Wakeup) -> Acceptance {
        match self.pending {
            Some(p) if p.wakeup.token == fired.token => {
                self.pending = None;
                Acceptance::Current(p.wakeup)
            }
            _ => Acceptance::Stale,
        }
    }

    pub fn pending(&self) -> Option<Wakeup> {
        self.pending.map(|p| p.wakeup)
    }

    pub fn pending_mode(&self) -> Option<DeliveryMode> {
        self.pending.map(|p| p.mode)
    }

    /// True while the last arm had to use inexact delivery.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Shared switch modelling the "exact alarms" permission.
#[derive(Debug, Clone)]
pub struct ExactPermission(Arc<AtomicBool>);

impl ExactPermission {
    pub fn granted() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn denied() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn grant(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_granted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ExactPermission {
    fn default() -> Self {
        Self::granted()
    }
}

/// In-process backend: one tokio task per request, delivering on a channel.
///
/// Tokio timers run on the monotonic clock, which stops while the host is
/// suspended. Each task therefore sleeps in slices of at most
/// [`RECHECK_SLICE_MS`] and fires once the wall clock has reached the target.
///
/// Must be used from within a tokio runtime.
pub struct TokioWakeups {
    tx: mpsc::UnboundedSender<Wakeup>,
    clock: Arc<dyn Clock>,
    permission: ExactPermission,
    inexact_window_ms: u64,
    tasks: HashMap<u64, JoinHandle<()>>,
}

impl TokioWakeups {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<Wakeup>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self {
            tx,
            clock,
            permission: ExactPermission::granted(),
            inexact_window_ms: DEFAULT_INEXACT_WINDOW_MS,
            tasks: HashMap::new(),
        };
        (backend, rx)
    }

    pub fn with_permission(mut self, permission: ExactPermission) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_inexact_window(mut self, window_ms: u64) -> Self {
        self.inexact_window_ms = window_ms.max(1);
        self
    }

    pub fn permission(&self) -> ExactPermission {
        self.permission.clone()
    }

    fn spawn_at(&mut self, wakeup: Wakeup, fire_at_ms: u64) {
        self.tasks.retain(|_, h| !h.is_finished());
        let clock = self.clock.clone();
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                let left = fire_at_ms.saturating_sub(clock.now_ms());
                if left == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(left.min(RECHECK_SLICE_MS))).await;
            }
            // Receiver gone means the engine shut down.
            let _ = tx.send(wakeup);
        });
        if let Some(previous) = self.tasks.insert(wakeup.token, handle) {
            previous.abort();
        }
    }
}

impl WakeupBackend for TokioWakeups {
    fn schedule_exact(&mut self, wakeup: Wakeup) -> Result<(), ScheduleError> {
        if !self.permission.is_granted() {
            return Err(ScheduleError::PermissionDenied);
        }
        self.spawn_at(wakeup, wakeup.deadline_ms);
        Ok(())
    }

    fn schedule_inexact(&mut self, wakeup: Wakeup) {
        let window = self.inexact_window_ms;
        let fire_at = wakeup.deadline_ms.div_ceil(window).saturating_mul(window);
        self.spawn_at(wakeup, fire_at);
    }

    fn cancel(&mut self, token: u64) {
        if let Some(handle) = self.tasks.remove(&token) {
            handle.abort();
        }
    }
}
