use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{DeliveryMode, Phase, Settings};

/// Every engine command reports what happened as an Event.
/// Front-ends print them; observers of the state stream get snapshots instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Started {
        phase: Phase,
        remaining_ms: u64,
        deadline_ms: u64,
        mode: DeliveryMode,
        at: DateTime<Utc>,
    },
    Paused {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    Resumed {
        phase: Phase,
        remaining_ms: u64,
        deadline_ms: u64,
        mode: DeliveryMode,
        at: DateTime<Utc>,
    },
    Stopped {
        at: DateTime<Utc>,
    },
    PhaseCompleted {
        completed: Phase,
        next: Phase,
        completed_cycles: u32,
        deadline_ms: u64,
        at: DateTime<Utc>,
    },
    /// All configured cycles finished; the session is stopped.
    SessionFinished {
        completed_cycles: u32,
        at: DateTime<Utc>,
    },
    SettingsApplied {
        settings: Settings,
        at: DateTime<Utc>,
    },
    /// Exact wake-ups were refused; the engine runs on inexact delivery.
    SchedulingDegraded {
        at: DateTime<Utc>,
    },
    SurfaceRestored {
        retried: bool,
        at: DateTime<Utc>,
    },
    SurfaceRestoreSuppressed {
        cooldown_ms: u64,
        at: DateTime<Utc>,
    },
    SurfaceRestoreFailed {
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::Stopped { at: Utc::now() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stopped");

        let event = Event::PhaseCompleted {
            completed: Phase::Active,
            next: Phase::Rest,
            completed_cycles: 0,
            deadline_ms: 1_000,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_completed");
        assert_eq!(json["completed"], "active");
    }
}
