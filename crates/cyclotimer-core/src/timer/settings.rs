use serde::{Deserialize, Serialize};

use super::state::Phase;
use crate::error::ValidationError;

pub const DEFAULT_ACTIVE_DURATION_MS: u64 = 20 * 60 * 1000;
pub const DEFAULT_REST_DURATION_MS: u64 = 20 * 1000;

/// How many ACTIVE+REST cycles a session runs before it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RepeatCountRepr", into = "RepeatCountRepr")]
pub enum RepeatCount {
    Finite(u32),
    Unlimited,
}

impl RepeatCount {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, RepeatCount::Unlimited)
    }

    /// Number of cycles, or `None` when unlimited.
    pub fn limit(&self) -> Option<u32> {
        match self {
            RepeatCount::Finite(n) => Some(*n),
            RepeatCount::Unlimited => None,
        }
    }
}

impl std::fmt::Display for RepeatCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatCount::Finite(n) => write!(f, "{n}"),
            RepeatCount::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl std::str::FromStr for RepeatCount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(RepeatCount::Unlimited);
        }
        let n: i64 = s.parse().map_err(|_| ValidationError::InvalidValue {
            field: "repeat_count".into(),
            message: format!("'{s}' is neither a number nor \"unlimited\""),
        })?;
        RepeatCountRepr::Count(n).try_into()
    }
}

/// On-disk shape: a positive integer or the string `"unlimited"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RepeatCountRepr {
    Count(i64),
    Keyword(String),
}

impl TryFrom<RepeatCountRepr> for RepeatCount {
    type Error = ValidationError;

    fn try_from(repr: RepeatCountRepr) -> Result<Self, Self::Error> {
        match repr {
            RepeatCountRepr::Count(n) if n >= 1 && n <= u32::MAX as i64 => {
                Ok(RepeatCount::Finite(n as u32))
            }
            RepeatCountRepr::Count(n) => Err(ValidationError::InvalidRepeatCount(n)),
            RepeatCountRepr::Keyword(k) if k.eq_ignore_ascii_case("unlimited") => {
                Ok(RepeatCount::Unlimited)
            }
            RepeatCountRepr::Keyword(k) => Err(ValidationError::InvalidValue {
                field: "repeat_count".into(),
                message: format!("unknown keyword '{k}'"),
            }),
        }
    }
}

impl From<RepeatCount> for RepeatCountRepr {
    fn from(count: RepeatCount) -> Self {
        match count {
            RepeatCount::Finite(n) => RepeatCountRepr::Count(n as i64),
            RepeatCount::Unlimited => RepeatCountRepr::Keyword("unlimited".into()),
        }
    }
}

/// Timer settings. Replaced wholesale, never patched in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_active_duration_ms")]
    pub active_duration_ms: u64,
    #[serde(default = "default_rest_duration_ms")]
    pub rest_duration_ms: u64,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: RepeatCount,
}

fn default_active_duration_ms() -> u64 {
    DEFAULT_ACTIVE_DURATION_MS
}
fn default_rest_duration_ms() -> u64 {
    DEFAULT_REST_DURATION_MS
}
fn default_repeat_count() -> RepeatCount {
    RepeatCount::Unlimited
}

impl Settings {
    /// Build validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if either duration is zero or the repeat count is
    /// `Finite(0)`.
    pub fn new(
        active_duration_ms: u64,
        rest_duration_ms: u64,
        repeat_count: RepeatCount,
    ) -> Result<Self, ValidationError> {
        let settings = Self {
            active_duration_ms,
            rest_duration_ms,
            repeat_count,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the invariants a deserialized or hand-built value may violate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.active_duration_ms == 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "active_duration_ms",
            });
        }
        if self.rest_duration_ms == 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "rest_duration_ms",
            });
        }
        if let RepeatCount::Finite(0) = self.repeat_count {
            return Err(ValidationError::InvalidRepeatCount(0));
        }
        Ok(())
    }

    /// Length of one ACTIVE+REST pair.
    pub fn cycle_duration_ms(&self) -> u64 {
        self.active_duration_ms.saturating_add(self.rest_duration_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_duration_ms: DEFAULT_ACTIVE_DURATION_MS,
            rest_duration_ms: DEFAULT_REST_DURATION_MS,
            repeat_count: RepeatCount::Unlimited,
        }
    }
}

/// Base refresh cadence of the status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateInterval {
    EverySecond,
    Every2Seconds,
    Every5Seconds,
    Every10Seconds,
    Every30Seconds,
}

impl UpdateInterval {
    pub fn interval_ms(&self) -> u64 {
        match self {
            UpdateInterval::EverySecond => 1_000,
            UpdateInterval::Every2Seconds => 2_000,
            UpdateInterval::Every5Seconds => 5_000,
            UpdateInterval::Every10Seconds => 10_000,
            UpdateInterval::Every30Seconds => 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Play through the notification stream.
    Notification,
    /// Play through the media stream (respects media volume).
    Music,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfacePriority {
    Silent,
    Default,
}

/// Presentation preferences handed to the notification and alert sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enable_sound: bool,
    #[serde(default = "default_true")]
    pub enable_vibration: bool,
    /// 0.0 - 1.0
    #[serde(default = "default_volume")]
    pub sound_volume: f32,
    #[serde(default = "default_playback_mode")]
    pub playback_mode: PlaybackMode,
    #[serde(default = "default_priority")]
    pub priority: SurfacePriority,
    #[serde(default = "default_update_interval")]
    pub update_interval: UpdateInterval,
    /// Sound played when an ACTIVE phase ends; `None` is the system default.
    #[serde(default)]
    pub active_complete_sound: Option<String>,
    /// Sound played when a REST phase ends; `None` is the system default.
    #[serde(default)]
    pub rest_complete_sound: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_volume() -> f32 {
    1.0
}
fn default_playback_mode() -> PlaybackMode {
    PlaybackMode::Notification
}
fn default_priority() -> SurfacePriority {
    SurfacePriority::Default
}
fn default_update_interval() -> UpdateInterval {
    UpdateInterval::EverySecond
}

impl NotificationSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.sound_volume) {
            return Err(ValidationError::VolumeOutOfRange(
                self.sound_volume.to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_interval_ms(&self) -> u64 {
        self.update_interval.interval_ms()
    }

    /// Custom sound for the end of `completed`, if one is configured.
    pub fn completion_sound(&self, completed: Phase) -> Option<&str> {
        match completed {
            Phase::Active => self.active_complete_sound.as_deref(),
            Phase::Rest => self.rest_complete_sound.as_deref(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enable_sound: true,
            enable_vibration: true,
            sound_volume: default_volume(),
            playback_mode: default_playback_mode(),
            priority: default_priority(),
            update_interval: default_update_interval(),
            active_complete_sound: None,
            rest_complete_sound: None,
        }
    }
}
