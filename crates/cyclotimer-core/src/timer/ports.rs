//! Narrow interfaces to the collaborators the engine does not own.
//!
//! Rendering, sound, vibration and storage formats live behind these traits.
//! The engine only decides *when* to call them.

use serde::{Deserialize, Serialize};

use super::settings::{NotificationSettings, Settings};
use super::state::{Phase, SessionState};
use crate::error::{Result, SurfaceError};

/// Opaque identifier of a rendered status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

/// Where timer settings come from and go to.
pub trait SettingsSource {
    fn load(&self) -> Result<Settings>;
    fn save(&mut self, settings: &Settings) -> Result<()>;
}

/// The externally owned status surface (e.g. a persistent notification).
pub trait NotificationSink: Send {
    /// Show or refresh the surface for `state`.
    fn render(&mut self, state: &SessionState) -> std::result::Result<SurfaceHandle, SurfaceError>;

    /// Whether the environment still shows the surface.
    fn is_present(&self, handle: SurfaceHandle) -> bool;

    fn dismiss(&mut self, handle: SurfaceHandle);

    /// Drop any cached rendering configuration before a retry.
    fn reset(&mut self) {}

    fn configure(&mut self, _settings: &NotificationSettings) {}
}

/// Sound/vibration on a genuine phase boundary.
pub trait AlertSink: Send {
    fn on_phase_completed(&mut self, completed: Phase);

    fn configure(&mut self, _settings: &NotificationSettings) {}
}

/// Sink that renders nothing and always reports the surface as present.
#[derive(Debug, Default)]
pub struct NullSurface;

impl NotificationSink for NullSurface {
    fn render(&mut self, _state: &SessionState) -> std::result::Result<SurfaceHandle, SurfaceError> {
        Ok(SurfaceHandle(0))
    }

    fn is_present(&self, _handle: SurfaceHandle) -> bool {
        true
    }

    fn dismiss(&mut self, _handle: SurfaceHandle) {}
}

/// Alert sink that only logs.
#[derive(Debug, Default)]
pub struct LogAlerts {
    settings: NotificationSettings,
}

impl AlertSink for LogAlerts {
    fn on_phase_completed(&mut self, completed: Phase) {
        let sound = self
            .settings
            .enable_sound
            .then(|| self.settings.completion_sound(completed).unwrap_or("default"));
        tracing::info!(?completed, ?sound, "phase completed");
    }

    fn configure(&mut self, settings: &NotificationSettings) {
        self.settings = settings.clone();
    }
}
