//! The engine task under paused tokio time: real wake-up tasks, real
//! monitor ticks, virtual clock.

mod support;

use std::sync::Arc;
use std::time::Duration;

use cyclotimer_core::timer::{
    spawn_engine, Collaborators, EngineController, EngineHandle, ExactPermission,
    NotificationSettings, Phase, RepeatCount, Settings, Status, TokioClock, TokioWakeups,
};
use cyclotimer_core::Event;
use support::{RecordingAlerts, ScriptedSurface};

struct Running {
    handle: EngineHandle,
    surface: ScriptedSurface,
    alerts: RecordingAlerts,
    permission: ExactPermission,
}

fn spawn(active_ms: u64, rest_ms: u64, repeat: RepeatCount) -> Running {
    let clock = Arc::new(TokioClock::new());
    let permission = ExactPermission::granted();
    let (backend, wakeups) = TokioWakeups::new(clock.clone());
    let backend = backend.with_permission(permission.clone());
    let surface = ScriptedSurface::default();
    let alerts = RecordingAlerts::default();
    let parts = Collaborators::new(clock, Box::new(backend))
        .surface(Box::new(surface.clone()))
        .alerts(Box::new(alerts.clone()));
    let settings = Settings::new(active_ms, rest_ms, repeat).unwrap();
    let controller =
        EngineController::new(settings, NotificationSettings::default(), parts).unwrap();
    let (handle, _task) = spawn_engine(controller, wakeups);
    Running {
        handle,
        surface,
        alerts,
        permission,
    }
}

#[tokio::test(start_paused = true)]
async fn finite_session_finishes_on_its_own() {
    let r = spawn(1_000, 1_000, RepeatCount::Finite(2));
    let mut events = r.handle.events();
    r.handle.start().await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(Event::SessionFinished {
                completed_cycles, ..
            }) = events.recv().await
            {
                return completed_cycles;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(finished, 2);

    let snap = r.handle.snapshot().await.unwrap();
    assert_eq!(snap.state.status, Status::Stopped);
    assert_eq!(
        r.alerts.fired(),
        vec![Phase::Active, Phase::Rest, Phase::Active, Phase::Rest]
    );
}

#[tokio::test(start_paused = true)]
async fn pause_holds_the_countdown() {
    let r = spawn(1_000, 500, RepeatCount::Unlimited);
    r.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    r.handle.pause().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let display = r.handle.display_state().await.unwrap();
    assert_eq!(display.status, Status::Paused);
    assert_eq!(display.phase, Phase::Active);
    assert_eq!(display.remaining_ms, 600);

    r.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(650)).await;
    let snap = r.handle.snapshot().await.unwrap();
    assert_eq!(snap.state.phase, Phase::Rest);
}

#[tokio::test(start_paused = true)]
async fn stop_silences_pending_boundaries() {
    let r = spawn(1_000, 500, RepeatCount::Unlimited);
    r.handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;
    r.handle.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(r.alerts.fired().is_empty());
    assert!(!r.surface.is_visible());
    let renders = r.surface.render_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(r.surface.render_count(), renders, "monitor kept ticking after stop");
}

#[tokio::test(start_paused = true)]
async fn monitor_restores_a_dismissed_surface() {
    let r = spawn(60_000, 5_000, RepeatCount::Unlimited);
    let mut events = r.handle.events();
    r.handle.start().await.unwrap();
    r.surface.dismiss_externally();

    let restored = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Event::SurfaceRestored { .. }) = events.recv().await {
                return true;
            }
        }
    })
    .await
    .unwrap();
    assert!(restored);
    assert!(r.surface.is_visible());
}

#[tokio::test(start_paused = true)]
async fn revoked_permission_falls_back_to_inexact_delivery() {
    let r = spawn(1_000, 60_000, RepeatCount::Unlimited);
    r.permission.revoke();
    r.handle.start().await.unwrap();
    assert!(r.handle.snapshot().await.unwrap().degraded);

    // Inexact delivery may be late, never early.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(r.handle.snapshot().await.unwrap().state.phase, Phase::Active);
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(r.handle.snapshot().await.unwrap().state.phase, Phase::Rest);
}

#[tokio::test(start_paused = true)]
async fn settings_update_through_the_handle() {
    let r = spawn(1_000, 500, RepeatCount::Unlimited);
    let mut snapshots = r.handle.subscribe();
    r.handle.start().await.unwrap();

    let fresh = Settings::new(2_000, 1_000, RepeatCount::Finite(1)).unwrap();
    r.handle.update_settings(fresh).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let snap = r.handle.snapshot().await.unwrap();
    assert_eq!(snap.state.status, Status::Stopped);
    assert_eq!(snap.state.settings, fresh);
    assert!(r.alerts.fired().is_empty());

    let mut last = None;
    while let Ok(s) = snapshots.try_recv() {
        last = Some(s);
    }
    assert_eq!(last.map(|s| s.state.settings), Some(fresh));

    let bad = Settings {
        rest_duration_ms: 0,
        ..fresh
    };
    assert!(r.handle.update_settings(bad).await.is_err());
}
