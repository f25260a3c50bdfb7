//! Self-healing status surface.
//!
//! The surface belongs to the environment, which may dismiss it at any time.
//! The monitor keeps it in step with committed transitions ([`SurfaceMonitor::sync`])
//! and, on every poll tick, checks that it is still there and restores it if
//! not. Restores are rate limited to one per `2 × poll interval`.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::ports::{NotificationSink, SurfaceHandle};
use super::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MonitorOutcome {
    /// Session stopped; nothing to monitor.
    Idle,
    /// Surface still visible and refreshed.
    Present,
    Restored { retried: bool },
    /// Surface missing but the last restore is too recent.
    Suppressed { cooldown_ms: u64 },
    /// Restore failed twice; monitoring continues next tick.
    RestoreFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub restores: u64,
    pub suppressed: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct SurfaceMonitor {
    handle: Option<SurfaceHandle>,
    last_restore_ms: Option<u64>,
    stats: MonitorStats,
}

impl SurfaceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Option<SurfaceHandle> {
        self.handle
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn last_restore_ms(&self) -> Option<u64> {
        self.last_restore_ms
    }

    /// Follow a committed transition: render while active, dismiss on stop.
    pub fn sync(&mut self, sink: &mut dyn NotificationSink, state: &SessionState) {
        if state.is_stopped() {
            if let Some(handle) = self.handle.take() {
                sink.dismiss(handle);
                debug!(?handle, "surface dismissed");
            }
            self.last_restore_ms = None;
            return;
        }
        match sink.render(state) {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => warn!(%err, "surface render failed, monitor will restore it"),
        }
    }

    /// One poll tick. `display` is the projected state to show.
    pub fn tick(
        &mut self,
        sink: &mut dyn NotificationSink,
        display: &SessionState,
        now_ms: u64,
        poll_interval_ms: u64,
    ) -> MonitorOutcome {
        if display.is_stopped() {
            return MonitorOutcome::Idle;
        }

        let present = self.handle.is_some_and(|h| sink.is_present(h));
        if present {
            match sink.render(display) {
                Ok(handle) => self.handle = Some(handle),
                Err(err) => warn!(%err, "surface refresh failed"),
            }
            return MonitorOutcome::Present;
        }

        let cooldown_ms = poll_interval_ms.saturating_mul(2);
        if let Some(last) = self.last_restore_ms {
            if now_ms.saturating_sub(last) <= cooldown_ms {
                self.stats.suppressed += 1;
                debug!(cooldown_ms, since_last = now_ms.saturating_sub(last), "surface restore suppressed");
                return MonitorOutcome::Suppressed { cooldown_ms };
            }
        }

        warn!("surface missing, restoring");
        self.last_restore_ms = Some(now_ms);
        self.restore(sink, display)
    }

    fn restore(&mut self, sink: &mut dyn NotificationSink, state: &SessionState) -> MonitorOutcome {
        match sink.render(state) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.stats.restores += 1;
                info!(?handle, "surface restored");
                MonitorOutcome::Restored { retried: false }
            }
            Err(first) => {
                warn!(%first, "surface restore failed, resetting configuration and retrying");
                sink.reset();
                match sink.render(state) {
                    Ok(handle) => {
                        self.handle = Some(handle);
                        self.stats.restores += 1;
                        info!(?handle, "surface restored after reset");
                        MonitorOutcome::Restored { retried: true }
                    }
                    Err(second) => {
                        self.stats.failures += 1;
                        error!(%second, "surface restore failed after reset");
                        MonitorOutcome::RestoreFailed
                    }
                }
            }
        }
    }
}
