//! Phase/status state machine.
//!
//! Every function here is pure: it takes a [`SessionState`] by value and
//! returns the next one. No clocks, no scheduling, no I/O. The controller is
//! the only caller that commits the results.
//!
//! ```text
//! Stopped --start--> Running --pause--> Paused --start--> Running
//! Running --advance--> Running (next phase)
//! any --stop--> Stopped
//! ```

use serde::{Deserialize, Serialize};

use super::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Active,
    Rest,
}

impl Phase {
    pub fn duration_ms(&self, settings: &Settings) -> u64 {
        match self {
            Phase::Active => settings.active_duration_ms,
            Phase::Rest => settings.rest_duration_ms,
        }
    }

    pub fn next(&self) -> Phase {
        match self {
            Phase::Active => Phase::Rest,
            Phase::Rest => Phase::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Running,
    Paused,
}

/// Immutable session value. Replaced as a whole on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub status: Status,
    /// Authoritative while not running, or right after a confirmed boundary.
    pub remaining_ms: u64,
    pub completed_cycles: u32,
    pub settings: Settings,
}

impl SessionState {
    /// The canonical stopped state for `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: Phase::Active,
            status: Status::Stopped,
            remaining_ms: settings.active_duration_ms,
            completed_cycles: 0,
            settings,
        }
    }

    /// Full duration of the current phase.
    pub fn phase_duration_ms(&self) -> u64 {
        self.phase.duration_ms(&self.settings)
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.status == Status::Stopped
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Stopped or Paused -> Running. Running stays as is.
pub fn start(s: SessionState) -> SessionState {
    match s.status {
        Status::Stopped | Status::Paused => SessionState {
            status: Status::Running,
            ..s
        },
        Status::Running => s,
    }
}

/// Running -> Paused with `remaining_ms` frozen. No-op otherwise.
pub fn pause(s: SessionState) -> SessionState {
    match s.status {
        Status::Running => SessionState {
            status: Status::Paused,
            ..s
        },
        _ => s,
    }
}

/// Any state -> canonical Stopped, keeping the settings.
pub fn stop(s: SessionState) -> SessionState {
    SessionState::new(s.settings)
}

/// Move to the other phase. Rest -> Active completes a cycle.
///
/// Check [`is_completed`] on the result before committing it.
pub fn advance_phase(s: SessionState) -> SessionState {
    match s.phase {
        Phase::Active => SessionState {
            phase: Phase::Rest,
            remaining_ms: s.settings.rest_duration_ms,
            ..s
        },
        Phase::Rest => SessionState {
            phase: Phase::Active,
            remaining_ms: s.settings.active_duration_ms,
            completed_cycles: s.completed_cycles.saturating_add(1),
            ..s
        },
    }
}

pub fn is_completed(s: &SessionState) -> bool {
    match s.settings.repeat_count.limit() {
        Some(limit) => s.completed_cycles >= limit,
        None => false,
    }
}

/// Always stops, then reinitializes under `settings`.
pub fn apply_settings(s: SessionState, settings: Settings) -> SessionState {
    stop(SessionState { settings, ..stop(s) })
}
