//! Core error types for cyclotimer-core.
//!
//! This module defines the error hierarchy using thiserror. Most conditions
//! the engine meets at runtime are recoverable and never reach these types:
//! scheduling degradation and failed surface restores are reported through
//! events, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for cyclotimer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Engine command errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory could not be resolved or created
    #[error("Config directory unavailable: {0}")]
    DirUnavailable(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Duration must be strictly positive
    #[error("Invalid duration for '{field}': must be greater than zero")]
    NonPositiveDuration { field: &'static str },

    /// Repeat count must be at least one (or unlimited)
    #[error("Invalid repeat count {0}: must be at least 1 or \"unlimited\"")]
    InvalidRepeatCount(i64),

    /// Volume outside 0.0..=1.0
    #[error("Invalid sound volume {0}: must be between 0.0 and 1.0")]
    VolumeOutOfRange(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors reported by a [`crate::timer::NotificationSink`] while rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The environment refused to show the surface
    #[error("surface rejected by environment: {0}")]
    Rejected(String),

    /// Rendering configuration is stale or missing
    #[error("surface configuration unavailable: {0}")]
    ConfigurationLost(String),
}

/// Errors reported by a [`crate::timer::WakeupBackend`] for exact delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Precise delivery permission was revoked or never granted
    #[error("exact wake-up permission denied")]
    PermissionDenied,

    /// The platform does not offer precise delivery right now
    #[error("exact wake-up unavailable: {0}")]
    ExactUnavailable(String),
}

/// Errors returned by engine commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Settings rejected at the apply boundary; the session is untouched
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] ValidationError),

    /// The engine task is gone (shut down or panicked)
    #[error("engine is not running")]
    Closed,
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
