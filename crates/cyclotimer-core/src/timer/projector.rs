//! Display-only countdown between scheduler wake-ups.
//!
//! The projector derives remaining time from the wall clock and the recorded
//! phase start. It is never authoritative: a projection that reaches zero is
//! clamped and flagged `overdue`, and the display keeps polling with a short
//! grace delay until the scheduler confirms the boundary.

use serde::{Deserialize, Serialize};

use super::settings::Settings;
use super::state::Phase;

/// Poll delay while a projection is overdue.
pub const BOUNDARY_GRACE_MS: u64 = 250;

const FINAL_STRETCH_MS: u64 = 3_000;
const FINAL_STRETCH_INTERVAL_MS: u64 = 500;
const NEAR_BOUNDARY_MS: u64 = 10_000;
const NEAR_BOUNDARY_INTERVAL_MS: u64 = 1_000;

/// Where the running phase sits on the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAnchor {
    pub phase: Phase,
    /// Effective start of the phase (epoch ms).
    pub started_at_ms: u64,
    pub duration_ms: u64,
    /// Paused time not already folded into `started_at_ms`.
    #[serde(default)]
    pub paused_ms: u64,
}

impl PhaseAnchor {
    /// Anchor a phase so that `remaining_ms` is left at `now_ms`.
    pub fn resume_at(phase: Phase, duration_ms: u64, remaining_ms: u64, now_ms: u64) -> Self {
        let consumed = duration_ms.saturating_sub(remaining_ms);
        Self {
            phase,
            started_at_ms: now_ms.saturating_sub(consumed),
            duration_ms,
            paused_ms: 0,
        }
    }

    pub fn deadline_ms(&self) -> u64 {
        self.started_at_ms
            .saturating_add(self.paused_ms)
            .saturating_add(self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub remaining_ms: u64,
    /// The raw projection hit zero before the scheduler confirmed the boundary.
    pub overdue: bool,
}

#[derive(Debug, Clone)]
pub struct RemainingTimeProjector {
    base_interval_ms: u64,
}

impl RemainingTimeProjector {
    pub fn new(base_interval_ms: u64) -> Self {
        Self {
            base_interval_ms: base_interval_ms.max(1),
        }
    }

    pub fn base_interval_ms(&self) -> u64 {
        self.base_interval_ms
    }

    pub fn set_base_interval(&mut self, base_interval_ms: u64) {
        self.base_interval_ms = base_interval_ms.max(1);
    }

    pub fn project(&self, anchor: &PhaseAnchor, now_ms: u64) -> Projection {
        let elapsed = now_ms as i128 - anchor.started_at_ms as i128 - anchor.paused_ms as i128;
        let raw = anchor.duration_ms as i128 - elapsed.max(0);
        if raw <= 0 {
            Projection {
                remaining_ms: 0,
                overdue: true,
            }
        } else {
            Projection {
                remaining_ms: raw.min(anchor.duration_ms as i128) as u64,
                overdue: false,
            }
        }
    }

    /// Redraw/poll cadence for a phase with `remaining_ms` left.
    ///
    /// Tightens near the boundary and never exceeds the base interval, nor
    /// the rest duration while resting.
    pub fn poll_interval(&self, phase: Phase, remaining_ms: u64, settings: &Settings) -> u64 {
        let escalated = if remaining_ms <= FINAL_STRETCH_MS {
            FINAL_STRETCH_INTERVAL_MS
        } else if remaining_ms <= NEAR_BOUNDARY_MS {
            NEAR_BOUNDARY_INTERVAL_MS
        } else {
            self.base_interval_ms
        };
        let mut interval = escalated.min(self.base_interval_ms);
        if phase == Phase::Rest {
            interval = interval.min(settings.rest_duration_ms);
        }
        interval.max(1)
    }

    /// Delay before the next display poll of a running phase.
    pub fn next_poll_ms(&self, anchor: &PhaseAnchor, now_ms: u64, settings: &Settings) -> u64 {
        let projection = self.project(anchor, now_ms);
        if projection.overdue {
            BOUNDARY_GRACE_MS
        } else {
            self.poll_interval(anchor.phase, projection.remaining_ms, settings)
        }
    }
}
