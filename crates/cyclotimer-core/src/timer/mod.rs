mod actor;
pub mod clock;
pub mod display;
mod engine;
mod monitor;
mod ports;
mod projector;
mod scheduler;
mod settings;
mod state;
mod wake;

pub use actor::{spawn_engine, EngineHandle};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use engine::{
    Collaborators, DeadlineOutcome, EngineController, Snapshot, StateStreams,
    EARLY_TOLERANCE_MS, STREAM_CAPACITY,
};
pub use monitor::{MonitorOutcome, MonitorStats, SurfaceMonitor};
pub use ports::{AlertSink, LogAlerts, NotificationSink, NullSurface, SettingsSource, SurfaceHandle};
pub use projector::{PhaseAnchor, Projection, RemainingTimeProjector, BOUNDARY_GRACE_MS};
pub use scheduler::{
    Acceptance, DeadlineScheduler, DeliveryMode, ExactPermission, TokioWakeups, Wakeup,
    WakeupBackend, DEFAULT_INEXACT_WINDOW_MS,
};
pub use settings::{
    NotificationSettings, PlaybackMode, RepeatCount, Settings, SurfacePriority, UpdateInterval,
};
pub use state::{
    advance_phase, apply_settings, is_completed, pause, start, stop, Phase, SessionState, Status,
};
pub use wake::{lease_duration, NoWakeLock, WakeLease, WakeLock, MAX_LEASE, MIN_LEASE};
