//! Recording collaborators shared by the scenario tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cyclotimer_core::error::{ScheduleError, SurfaceError};
use cyclotimer_core::timer::{
    AlertSink, Collaborators, DeliveryMode, EngineController, ManualClock, NotificationSettings,
    NotificationSink, Phase, RepeatCount, SessionState, Settings, SurfaceHandle, Wakeup,
    WakeupBackend,
};

pub const START_MS: u64 = 1_700_000_000_000;

/// Wake-up backend that records every request and never delivers.
#[derive(Clone, Default)]
pub struct RecordingWakeups {
    pub requests: Arc<Mutex<Vec<(Wakeup, DeliveryMode)>>>,
    pub cancelled: Arc<Mutex<Vec<u64>>>,
    pub refuse_exact: Arc<Mutex<bool>>,
}

impl RecordingWakeups {
    pub fn refuse_exact(&self, refuse: bool) {
        *self.refuse_exact.lock().unwrap() = refuse;
    }

    pub fn last(&self) -> Option<(Wakeup, DeliveryMode)> {
        self.requests.lock().unwrap().last().copied()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl WakeupBackend for RecordingWakeups {
    fn schedule_exact(&mut self, wakeup: Wakeup) -> Result<(), ScheduleError> {
        if *self.refuse_exact.lock().unwrap() {
            return Err(ScheduleError::PermissionDenied);
        }
        self.requests
            .lock()
            .unwrap()
            .push((wakeup, DeliveryMode::Exact));
        Ok(())
    }

    fn schedule_inexact(&mut self, wakeup: Wakeup) {
        self.requests
            .lock()
            .unwrap()
            .push((wakeup, DeliveryMode::Inexact));
    }

    fn cancel(&mut self, token: u64) {
        self.cancelled.lock().unwrap().push(token);
    }
}

/// Surface the test can dismiss and make fail on demand.
#[derive(Clone, Default)]
pub struct ScriptedSurface {
    pub visible: Arc<Mutex<bool>>,
    pub fail_next: Arc<Mutex<u32>>,
    pub renders: Arc<Mutex<Vec<SessionState>>>,
    pub resets: Arc<Mutex<u32>>,
}

impl ScriptedSurface {
    pub fn dismiss_externally(&self) {
        *self.visible.lock().unwrap() = false;
    }

    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.lock().unwrap()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }
}

impl NotificationSink for ScriptedSurface {
    fn render(&mut self, state: &SessionState) -> Result<SurfaceHandle, SurfaceError> {
        self.renders.lock().unwrap().push(*state);
        let mut fail = self.fail_next.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            return Err(SurfaceError::ConfigurationLost("channel missing".into()));
        }
        *self.visible.lock().unwrap() = true;
        Ok(SurfaceHandle(42))
    }

    fn is_present(&self, _handle: SurfaceHandle) -> bool {
        self.is_visible()
    }

    fn dismiss(&mut self, _handle: SurfaceHandle) {
        *self.visible.lock().unwrap() = false;
    }

    fn reset(&mut self) {
        *self.resets.lock().unwrap() += 1;
    }
}

#[derive(Clone, Default)]
pub struct RecordingAlerts {
    pub fired: Arc<Mutex<Vec<Phase>>>,
    pub configured: Arc<Mutex<Vec<NotificationSettings>>>,
}

impl RecordingAlerts {
    pub fn fired(&self) -> Vec<Phase> {
        self.fired.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn on_phase_completed(&mut self, completed: Phase) {
        self.fired.lock().unwrap().push(completed);
    }

    fn configure(&mut self, settings: &NotificationSettings) {
        self.configured.lock().unwrap().push(settings.clone());
    }
}

pub struct Harness {
    pub engine: EngineController,
    pub clock: ManualClock,
    pub wakeups: RecordingWakeups,
    pub surface: ScriptedSurface,
    pub alerts: RecordingAlerts,
}

impl Harness {
    pub fn new(active_ms: u64, rest_ms: u64, repeat: RepeatCount) -> Self {
        Self::with_notifications(active_ms, rest_ms, repeat, NotificationSettings::default())
    }

    pub fn with_notifications(
        active_ms: u64,
        rest_ms: u64,
        repeat: RepeatCount,
        notifications: NotificationSettings,
    ) -> Self {
        let clock = ManualClock::new(START_MS);
        let wakeups = RecordingWakeups::default();
        let surface = ScriptedSurface::default();
        let alerts = RecordingAlerts::default();
        let parts = Collaborators::new(Arc::new(clock.clone()), Box::new(wakeups.clone()))
            .surface(Box::new(surface.clone()))
            .alerts(Box::new(alerts.clone()));
        let settings = Settings::new(active_ms, rest_ms, repeat).unwrap();
        let engine = EngineController::new(settings, notifications, parts).unwrap();
        Self {
            engine,
            clock,
            wakeups,
            surface,
            alerts,
        }
    }

    /// Advance the clock to the pending deadline and deliver it.
    pub fn fire_pending(&mut self) -> cyclotimer_core::DeadlineOutcome {
        let pending = self.engine.pending_wakeup().expect("a pending wake-up");
        self.clock.set(pending.deadline_ms);
        self.engine.on_deadline_fired(pending)
    }
}
