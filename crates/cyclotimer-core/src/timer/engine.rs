//! Engine controller.
//!
//! Owns the only mutable [`SessionState`] and composes the state machine,
//! the deadline scheduler, the projector and the surface monitor. It is a
//! plain `&mut self` single writer with no threads of its own; wrap it with
//! [`super::actor::spawn_engine`] to drive it from async callers, wake-ups
//! and monitor ticks.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped --start--> Running --pause--> Paused --start--> Running
//! Running --deadline (more cycles)--> Running (next phase)
//! Running --deadline (last cycle)--> Stopped
//! any --stop--> Stopped
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = EngineController::new(settings, notifications, parts)?;
//! engine.start();
//! // When the backend delivers a wake-up:
//! engine.on_deadline_fired(wakeup);
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::monitor::{MonitorOutcome, MonitorStats, SurfaceMonitor};
use super::ports::{AlertSink, LogAlerts, NotificationSink, NullSurface, SettingsSource};
use super::projector::{PhaseAnchor, RemainingTimeProjector};
use super::scheduler::{Acceptance, DeadlineScheduler, DeliveryMode, Wakeup, WakeupBackend};
use super::settings::{NotificationSettings, Settings};
use super::state::{self, SessionState, Status};
use super::wake::{NoWakeLock, WakeLease, WakeLock};
use crate::error::{CoreError, EngineError};
use crate::events::Event;

/// Buffered snapshots/events per slow subscriber before it lags.
pub const STREAM_CAPACITY: usize = 64;
/// Deliveries this close before the deadline count as on time.
pub const EARLY_TOLERANCE_MS: u64 = 20;

/// What observers see after every committed transition and every re-arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SessionState,
    /// Tag of the current phase run; bumps on every arm.
    pub generation: u64,
    /// Exact wake-ups were refused and the engine runs on inexact ones.
    pub degraded: bool,
}

/// Result of handling a delivered wake-up.
#[derive(Debug, Clone, PartialEq)]
pub enum DeadlineOutcome {
    /// Genuine boundary; the next phase is running.
    Advanced(Event),
    /// Genuine boundary that completed the last cycle; the session stopped.
    Finished(Event),
    /// Delivered before the deadline; re-armed for the same deadline.
    Early { deadline_ms: u64 },
    /// Duplicate, late or cancelled delivery. Nothing changed.
    Stale,
}

impl DeadlineOutcome {
    pub fn event(&self) -> Option<&Event> {
        match self {
            DeadlineOutcome::Advanced(e) | DeadlineOutcome::Finished(e) => Some(e),
            _ => None,
        }
    }
}

/// Everything the controller talks to but does not own the logic of.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub wakeups: Box<dyn WakeupBackend>,
    pub surface: Box<dyn NotificationSink>,
    pub alerts: Box<dyn AlertSink>,
    pub wake_lock: Box<dyn WakeLock>,
}

impl Collaborators {
    /// Clock and wake-up backend are required; the rest default to no-ops.
    pub fn new(clock: Arc<dyn Clock>, wakeups: Box<dyn WakeupBackend>) -> Self {
        Self {
            clock,
            wakeups,
            surface: Box::new(NullSurface),
            alerts: Box::new(LogAlerts::default()),
            wake_lock: Box::new(NoWakeLock::default()),
        }
    }

    pub fn surface(mut self, surface: Box<dyn NotificationSink>) -> Self {
        self.surface = surface;
        self
    }

    pub fn alerts(mut self, alerts: Box<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn wake_lock(mut self, wake_lock: Box<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }
}

/// Subscription points shared between the controller and its handles.
#[derive(Clone)]
pub struct StateStreams {
    snapshots: broadcast::Sender<Snapshot>,
    latest: watch::Receiver<Snapshot>,
    events: broadcast::Sender<Event>,
}

impl StateStreams {
    /// Every committed transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// Latest snapshot, for observers that only care about the current value.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.latest.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

pub struct EngineController {
    state: SessionState,
    generation: u64,
    /// Present exactly while running.
    anchor: Option<PhaseAnchor>,
    /// Set by `stop()`, consumed by the next stale delivery or phase start.
    manual_stop: bool,
    notification_settings: NotificationSettings,

    clock: Arc<dyn Clock>,
    scheduler: DeadlineScheduler,
    projector: RemainingTimeProjector,
    monitor: SurfaceMonitor,
    surface: Box<dyn NotificationSink>,
    alerts: Box<dyn AlertSink>,
    wake: WakeLease,

    snapshots: broadcast::Sender<Snapshot>,
    latest: watch::Sender<Snapshot>,
    events: broadcast::Sender<Event>,
}

impl EngineController {
    /// Create a stopped engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] if either settings value
    /// fails validation.
    pub fn new(
        settings: Settings,
        notification_settings: NotificationSettings,
        parts: Collaborators,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        notification_settings.validate()?;

        let Collaborators {
            clock,
            wakeups,
            mut surface,
            mut alerts,
            wake_lock,
        } = parts;
        surface.configure(&notification_settings);
        alerts.configure(&notification_settings);

        let state = SessionState::new(settings);
        let initial = Snapshot {
            state,
            generation: 0,
            degraded: false,
        };
        let (snapshots, _) = broadcast::channel(STREAM_CAPACITY);
        let (events, _) = broadcast::channel(STREAM_CAPACITY);
        let (latest, _) = watch::channel(initial);

        Ok(Self {
            state,
            generation: 0,
            anchor: None,
            manual_stop: false,
            projector: RemainingTimeProjector::new(notification_settings.base_interval_ms()),
            notification_settings,
            clock,
            scheduler: DeadlineScheduler::new(wakeups),
            monitor: SurfaceMonitor::new(),
            surface,
            alerts,
            wake: WakeLease::new(wake_lock),
            snapshots,
            latest,
            events,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            generation: self.generation,
            degraded: self.scheduler.is_degraded(),
        }
    }

    pub fn anchor(&self) -> Option<PhaseAnchor> {
        self.anchor
    }

    pub fn pending_wakeup(&self) -> Option<Wakeup> {
        self.scheduler.pending()
    }

    pub fn delivery_mode(&self) -> Option<DeliveryMode> {
        self.scheduler.pending_mode()
    }

    pub fn is_degraded(&self) -> bool {
        self.scheduler.is_degraded()
    }

    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor.stats()
    }

    pub fn notification_settings(&self) -> &NotificationSettings {
        &self.notification_settings
    }

    pub fn wake_lease_held(&self) -> bool {
        self.wake.is_held()
    }

    pub fn streams(&self) -> StateStreams {
        StateStreams {
            snapshots: self.snapshots.clone(),
            latest: self.latest.subscribe(),
            events: self.events.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.latest.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Current state with `remaining_ms` projected from the wall clock.
    ///
    /// For display only; never committed.
    pub fn display_state(&self) -> SessionState {
        self.display_state_at(self.clock.now_ms())
    }

    /// Delay until the next surface poll, or `None` while stopped.
    pub fn next_poll_ms(&self) -> Option<u64> {
        self.next_poll_at(self.clock.now_ms())
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        let resuming = match self.state.status {
            Status::Running => {
                debug!("already running, ignoring start");
                return None;
            }
            Status::Paused => true,
            Status::Stopped => false,
        };

        self.manual_stop = false;
        let now = self.clock.now_ms();
        let next = state::start(self.state);
        let anchor = PhaseAnchor::resume_at(
            next.phase,
            next.phase_duration_ms(),
            next.remaining_ms,
            now,
        );
        self.wake.acquire_for(&next);
        let mode = self.arm(anchor);
        self.commit(next);

        let event = if resuming {
            info!(phase = ?next.phase, remaining_ms = next.remaining_ms, "timer resumed");
            Event::Resumed {
                phase: next.phase,
                remaining_ms: next.remaining_ms,
                deadline_ms: anchor.deadline_ms(),
                mode,
                at: Utc::now(),
            }
        } else {
            info!(phase = ?next.phase, remaining_ms = next.remaining_ms, "timer started");
            Event::Started {
                phase: next.phase,
                remaining_ms: next.remaining_ms,
                deadline_ms: anchor.deadline_ms(),
                mode,
                at: Utc::now(),
            }
        };
        Some(self.emit(event))
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.state.status != Status::Running {
            return None;
        }
        self.scheduler.cancel();
        let now = self.clock.now_ms();
        let remaining_ms = self
            .anchor
            .take()
            .map(|a| self.projector.project(&a, now).remaining_ms)
            .unwrap_or(self.state.remaining_ms);
        let next = state::pause(SessionState {
            remaining_ms,
            ..self.state
        });
        self.commit(next);
        info!(remaining_ms, "timer paused");
        Some(self.emit(Event::Paused {
            phase: next.phase,
            remaining_ms,
            at: Utc::now(),
        }))
    }

    pub fn stop(&mut self) -> Option<Event> {
        self.manual_stop = true;
        self.scheduler.cancel();
        self.anchor = None;
        self.wake.release();
        if self.state.is_stopped() {
            return None;
        }
        self.commit(state::stop(self.state));
        info!("timer stopped");
        Some(self.emit(Event::Stopped { at: Utc::now() }))
    }

    /// Handle a wake-up delivered by the backend.
    ///
    /// The wake-up is only a trigger: whether the boundary really passed is
    /// decided from the clock and the recorded phase start.
    pub fn on_deadline_fired(&mut self, fired: Wakeup) -> DeadlineOutcome {
        let armed = match self.scheduler.accept(fired) {
            Acceptance::Current(armed) => armed,
            Acceptance::Stale => {
                if self.manual_stop {
                    self.manual_stop = false;
                    debug!(token = fired.token, "wake-up after manual stop ignored");
                } else {
                    debug!(token = fired.token, current = self.generation, "stale wake-up ignored");
                }
                return DeadlineOutcome::Stale;
            }
        };
        let Some(anchor) = self.anchor else {
            warn!(token = armed.token, "wake-up accepted without a running phase");
            return DeadlineOutcome::Stale;
        };

        let now = self.clock.now_ms();
        let deadline_ms = anchor.deadline_ms();
        if now.saturating_add(EARLY_TOLERANCE_MS) < deadline_ms {
            debug!(now, deadline_ms, "early wake-up, re-arming");
            self.arm(anchor);
            self.publish();
            return DeadlineOutcome::Early { deadline_ms };
        }

        let completed = self.state.phase;
        let next = state::advance_phase(self.state);
        self.alerts.on_phase_completed(completed);

        if state::is_completed(&next) {
            self.anchor = None;
            self.wake.release();
            self.commit(state::stop(next));
            info!(completed_cycles = next.completed_cycles, "all cycles finished");
            let event = self.emit(Event::SessionFinished {
                completed_cycles: next.completed_cycles,
                at: Utc::now(),
            });
            return DeadlineOutcome::Finished(event);
        }

        // Anchor at the old deadline, not at `now`: a late delivery must not
        // stretch the next phase.
        let next_anchor = PhaseAnchor {
            phase: next.phase,
            started_at_ms: deadline_ms,
            duration_ms: next.phase_duration_ms(),
            paused_ms: 0,
        };
        self.manual_stop = false;
        self.arm(next_anchor);
        self.commit(next);
        info!(
            ?completed,
            next = ?next.phase,
            completed_cycles = next.completed_cycles,
            late_ms = now.saturating_sub(deadline_ms),
            "phase completed"
        );
        DeadlineOutcome::Advanced(self.emit(Event::PhaseCompleted {
            completed,
            next: next.phase,
            completed_cycles: next.completed_cycles,
            deadline_ms: next_anchor.deadline_ms(),
            at: Utc::now(),
        }))
    }

    /// Replace the timer settings. Always stops the session first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] and leaves the session
    /// untouched if `settings` fails validation.
    pub fn update_settings(&mut self, settings: Settings) -> Result<Option<Event>, EngineError> {
        settings.validate()?;
        self.stop();
        self.commit(state::apply_settings(self.state, settings));
        info!(?settings, "settings applied");
        Ok(Some(self.emit(Event::SettingsApplied {
            settings,
            at: Utc::now(),
        })))
    }

    /// Load settings from `source` and apply them.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails or the settings are invalid.
    pub fn update_settings_from(
        &mut self,
        source: &dyn SettingsSource,
    ) -> Result<Option<Event>, CoreError> {
        let settings = source.load()?;
        Ok(self.update_settings(settings)?)
    }

    /// Replace presentation preferences. Does not touch the session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] if the volume is out of range.
    pub fn update_notification_settings(
        &mut self,
        settings: NotificationSettings,
    ) -> Result<(), EngineError> {
        settings.validate()?;
        self.projector.set_base_interval(settings.base_interval_ms());
        self.surface.configure(&settings);
        self.alerts.configure(&settings);
        debug!(interval_ms = settings.base_interval_ms(), "notification settings updated");
        self.notification_settings = settings;
        Ok(())
    }

    /// One surface-monitor tick. Returns the delay until the next tick, or
    /// `None` once the session is stopped.
    pub fn on_monitor_tick(&mut self) -> Option<u64> {
        if self.state.is_stopped() {
            return None;
        }
        let now = self.clock.now_ms();
        let display = self.display_state_at(now);
        let interval = self.projector.poll_interval(
            display.phase,
            display.remaining_ms,
            &display.settings,
        );
        match self.monitor.tick(self.surface.as_mut(), &display, now, interval) {
            MonitorOutcome::Restored { retried } => {
                self.emit(Event::SurfaceRestored {
                    retried,
                    at: Utc::now(),
                });
            }
            MonitorOutcome::Suppressed { cooldown_ms } => {
                self.emit(Event::SurfaceRestoreSuppressed {
                    cooldown_ms,
                    at: Utc::now(),
                });
            }
            MonitorOutcome::RestoreFailed => {
                self.emit(Event::SurfaceRestoreFailed { at: Utc::now() });
            }
            MonitorOutcome::Present | MonitorOutcome::Idle => {}
        }
        self.next_poll_at(now)
    }

    /// Tear down: stop the session and drop every pending request.
    pub fn shutdown(&mut self) {
        self.stop();
        self.manual_stop = false;
        debug!("engine shut down");
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn arm(&mut self, anchor: PhaseAnchor) -> DeliveryMode {
        self.generation += 1;
        let was_degraded = self.scheduler.is_degraded();
        let mode = self.scheduler.arm(anchor.deadline_ms(), self.generation);
        self.anchor = Some(anchor);
        if mode == DeliveryMode::Inexact && !was_degraded {
            self.emit(Event::SchedulingDegraded { at: Utc::now() });
        }
        mode
    }

    fn commit(&mut self, next: SessionState) {
        self.state = next;
        self.publish();
        self.monitor.sync(self.surface.as_mut(), &next);
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.latest.send_replace(snapshot);
        // No subscribers is fine.
        let _ = self.snapshots.send(snapshot);
    }

    fn emit(&self, event: Event) -> Event {
        let _ = self.events.send(event.clone());
        event
    }

    fn display_state_at(&self, now_ms: u64) -> SessionState {
        match self.anchor {
            Some(anchor) if self.state.is_running() => SessionState {
                remaining_ms: self.projector.project(&anchor, now_ms).remaining_ms,
                ..self.state
            },
            _ => self.state,
        }
    }

    fn next_poll_at(&self, now_ms: u64) -> Option<u64> {
        match (self.state.status, self.anchor) {
            (Status::Stopped, _) => None,
            (Status::Running, Some(anchor)) => {
                Some(self.projector.next_poll_ms(&anchor, now_ms, &self.state.settings))
            }
            _ => Some(self.projector.poll_interval(
                self.state.phase,
                self.state.remaining_ms,
                &self.state.settings,
            )),
        }
    }
}

impl std::fmt::Debug for EngineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineController")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("anchor", &self.anchor)
            .field("manual_stop", &self.manual_stop)
            .field("degraded", &self.scheduler.is_degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScheduleError;
    use crate::timer::clock::ManualClock;
    use crate::timer::settings::RepeatCount;
    use crate::timer::state::Phase;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Wakeups {
        armed: Arc<Mutex<Vec<Wakeup>>>,
    }

    impl WakeupBackend for Wakeups {
        fn schedule_exact(&mut self, wakeup: Wakeup) -> Result<(), ScheduleError> {
            self.armed.lock().unwrap().push(wakeup);
            Ok(())
        }
        fn schedule_inexact(&mut self, wakeup: Wakeup) {
            self.armed.lock().unwrap().push(wakeup);
        }
        fn cancel(&mut self, _token: u64) {}
    }

    fn engine(active: u64, rest: u64, repeat: RepeatCount) -> (EngineController, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let parts = Collaborators::new(Arc::new(clock.clone()), Box::new(Wakeups::default()));
        let settings = Settings::new(active, rest, repeat).unwrap();
        let engine =
            EngineController::new(settings, NotificationSettings::default(), parts).unwrap();
        (engine, clock)
    }

    #[test]
    fn start_pause_resume() {
        let (mut engine, clock) = engine(1_000, 500, RepeatCount::Unlimited);
        assert_eq!(engine.state().status, Status::Stopped);

        assert!(engine.start().is_some());
        assert_eq!(engine.state().status, Status::Running);
        assert!(engine.start().is_none());

        clock.advance(400);
        assert!(engine.pause().is_some());
        assert_eq!(engine.state().status, Status::Paused);
        assert_eq!(engine.state().remaining_ms, 600);
        assert!(engine.pending_wakeup().is_none());

        clock.advance(10_000);
        match engine.start() {
            Some(Event::Resumed {
                remaining_ms,
                deadline_ms,
                ..
            }) => {
                assert_eq!(remaining_ms, 600);
                assert_eq!(deadline_ms, clock.now_ms() + 600);
            }
            other => panic!("expected Resumed, got {other:?}"),
        }
    }

    #[test]
    fn running_implies_one_pending_wakeup() {
        let (mut engine, _clock) = engine(1_000, 500, RepeatCount::Unlimited);
        engine.start();
        let pending = engine.pending_wakeup().unwrap();
        assert_eq!(pending.token, engine.generation());
        engine.stop();
        assert!(engine.pending_wakeup().is_none());
    }

    #[test]
    fn early_delivery_rearms_without_advancing() {
        let (mut engine, clock) = engine(1_000, 500, RepeatCount::Unlimited);
        engine.start();
        let wakeup = engine.pending_wakeup().unwrap();
        clock.advance(500);
        let outcome = engine.on_deadline_fired(wakeup);
        assert_eq!(
            outcome,
            DeadlineOutcome::Early {
                deadline_ms: wakeup.deadline_ms
            }
        );
        assert_eq!(engine.state().phase, Phase::Active);
        assert_eq!(engine.pending_wakeup().unwrap().deadline_ms, wakeup.deadline_ms);
    }

    #[test]
    fn late_delivery_keeps_next_phase_on_schedule() {
        let (mut engine, clock) = engine(1_000, 500, RepeatCount::Unlimited);
        engine.start();
        let wakeup = engine.pending_wakeup().unwrap();
        clock.advance(1_300);
        engine.on_deadline_fired(wakeup);
        assert_eq!(engine.state().phase, Phase::Rest);
        assert_eq!(
            engine.pending_wakeup().unwrap().deadline_ms,
            wakeup.deadline_ms + 500
        );
        assert_eq!(engine.display_state().remaining_ms, 200);
    }

    #[test]
    fn invalid_settings_leave_session_running() {
        let (mut engine, _clock) = engine(1_000, 500, RepeatCount::Unlimited);
        engine.start();
        let before = engine.snapshot();
        let bad = Settings {
            active_duration_ms: 0,
            ..Settings::default()
        };
        assert!(engine.update_settings(bad).is_err());
        assert_eq!(engine.snapshot(), before);
        assert!(engine.pending_wakeup().is_some());
    }

    #[test]
    fn next_poll_is_none_when_stopped() {
        let (mut engine, _clock) = engine(60_000, 500, RepeatCount::Unlimited);
        assert_eq!(engine.next_poll_ms(), None);
        engine.start();
        assert_eq!(engine.next_poll_ms(), Some(1_000));
        assert_eq!(engine.on_monitor_tick(), Some(1_000));
    }

    #[test]
    fn notification_settings_change_base_interval() {
        let (mut engine, _clock) = engine(60_000, 500, RepeatCount::Unlimited);
        let settings = NotificationSettings {
            update_interval: crate::timer::settings::UpdateInterval::Every5Seconds,
            ..Default::default()
        };
        engine.update_notification_settings(settings).unwrap();
        engine.start();
        assert_eq!(engine.next_poll_ms(), Some(5_000));
    }

    #[test]
    fn wake_lease_follows_session() {
        let (mut engine, _clock) = engine(1_000, 500, RepeatCount::Unlimited);
        engine.start();
        assert!(engine.wake_lease_held());
        engine.pause();
        assert!(engine.wake_lease_held());
        engine.stop();
        assert!(!engine.wake_lease_held());
    }
}
