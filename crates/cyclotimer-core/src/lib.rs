//! # Cyclotimer Core Library
//!
//! This library provides the interval engine behind cyclotimer: a session
//! alternates an ACTIVE phase and a REST phase for a configurable number of
//! cycles, and phase boundaries are driven by one-shot deadline wake-ups
//! rather than a per-second tick. All operations are available via the
//! standalone CLI binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Engine**: [`EngineController`] owns the session state and composes a
//!   pure phase state machine, a deadline scheduler with exact/inexact
//!   fallback, a display-only countdown projector and a self-healing
//!   status-surface monitor
//! - **Actor**: [`spawn_engine`] serializes commands, wake-ups and monitor
//!   ticks on one task and hands out cloneable [`EngineHandle`]s
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`EngineController`]: Single writer of the session state
//! - [`DeadlineScheduler`]: One pending wake-up per running phase
//! - [`SurfaceMonitor`]: Restores a dismissed status surface, rate limited
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, EngineError, ScheduleError, SurfaceError, ValidationError};
pub use events::Event;
pub use storage::Config;
pub use timer::{
    spawn_engine, Collaborators, DeadlineOutcome, DeadlineScheduler, EngineController,
    EngineHandle, NotificationSettings, Phase, RepeatCount, SessionState, Settings, Snapshot,
    Status, SurfaceMonitor,
};
