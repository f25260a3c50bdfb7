use std::io::Write;
use std::sync::Arc;

use clap::Args;
use cyclotimer_core::timer::display::{format_remaining, phase_label, status_line};
use cyclotimer_core::timer::{
    spawn_engine, AlertSink, Clock, Collaborators, EngineController, EngineHandle,
    NotificationSettings, NotificationSink, Phase, RepeatCount, SessionState, Settings,
    SurfaceHandle, SystemClock, TokioWakeups,
};
use cyclotimer_core::{Config, Event, SurfaceError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Active phase length (e.g. 20m, 90s, 1500ms)
    #[arg(long, value_parser = parse_duration)]
    active: Option<u64>,
    /// Rest phase length
    #[arg(long, value_parser = parse_duration)]
    rest: Option<u64>,
    /// Number of cycles, or "unlimited"
    #[arg(long)]
    repeat: Option<RepeatCount>,
    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

/// Parse `500ms`, `20s`, `20m`, `1h`. A bare number is milliseconds.
pub fn parse_duration(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, factor) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1)
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (use e.g. 500ms, 20s, 20m, 1h)"))?;
    if value == 0 {
        return Err(format!("duration '{s}' must be greater than zero"));
    }
    value
        .checked_mul(factor)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Status line on stderr, redrawn in place.
struct TerminalSurface {
    enabled: bool,
    shown: bool,
}

impl NotificationSink for TerminalSurface {
    fn render(&mut self, state: &SessionState) -> Result<SurfaceHandle, SurfaceError> {
        if self.enabled {
            let mut err = std::io::stderr().lock();
            write!(err, "\r\x1b[2K{}", status_line(state))
                .and_then(|_| err.flush())
                .map_err(|e| SurfaceError::Rejected(e.to_string()))?;
            self.shown = true;
        }
        Ok(SurfaceHandle(1))
    }

    fn is_present(&self, _handle: SurfaceHandle) -> bool {
        true
    }

    fn dismiss(&mut self, _handle: SurfaceHandle) {
        if self.shown {
            eprintln!();
            self.shown = false;
        }
    }
}

/// Terminal bell on every phase boundary.
#[derive(Default)]
struct BellAlerts {
    sound: bool,
}

impl AlertSink for BellAlerts {
    fn on_phase_completed(&mut self, completed: Phase) {
        debug!(?completed, sound = self.sound, "phase alert");
        if self.sound {
            eprint!("\x07");
        }
    }

    fn configure(&mut self, settings: &NotificationSettings) {
        self.sound = settings.enable_sound;
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut settings = config.timer;
    if let Some(active) = args.active {
        settings.active_duration_ms = active;
    }
    if let Some(rest) = args.rest {
        settings.rest_duration_ms = rest;
    }
    if let Some(repeat) = args.repeat {
        settings.repeat_count = repeat;
    }
    settings.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(session(settings, config.notifications, args.json));
    // A pending stdin read would otherwise keep the runtime from dropping.
    runtime.shutdown_background();
    result
}

async fn session(
    settings: Settings,
    notifications: NotificationSettings,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (backend, wakeups) = TokioWakeups::new(clock.clone());
    let parts = Collaborators::new(clock, Box::new(backend))
        .surface(Box::new(TerminalSurface {
            enabled: !json,
            shown: false,
        }))
        .alerts(Box::new(BellAlerts::default()));
    let controller = EngineController::new(settings, notifications, parts)?;
    let (handle, task) = spawn_engine(controller, wakeups);

    let mut events = handle.events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    handle.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event, json)?;
                    if matches!(event, Event::SessionFinished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    handle.stop().await?;
                    break;
                };
                if !command(&handle, line.trim(), json).await? {
                    break;
                }
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

/// Handle one stdin command. Returns false to end the session.
async fn command(
    handle: &EngineHandle,
    line: &str,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    match line {
        "" => {}
        "pause" => {
            handle.pause().await?;
        }
        "start" | "resume" => {
            handle.start().await?;
        }
        "stop" => {
            handle.stop().await?;
        }
        "status" => {
            let state = handle.display_state().await?;
            if json {
                println!("{}", serde_json::to_string(&state)?);
            } else {
                println!("{}", status_line(&state));
            }
        }
        "quit" | "exit" => {
            handle.stop().await?;
            return Ok(false);
        }
        other => eprintln!("unknown command: {other} (pause, start, stop, status, quit)"),
    }
    Ok(true)
}

fn print_event(event: &Event, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    let text = match event {
        Event::Started {
            phase,
            remaining_ms,
            ..
        } => format!(
            "started: {} {}",
            phase_label(*phase),
            format_remaining(*remaining_ms)
        ),
        Event::Resumed {
            phase,
            remaining_ms,
            ..
        } => format!(
            "resumed: {} {}",
            phase_label(*phase),
            format_remaining(*remaining_ms)
        ),
        Event::Paused { remaining_ms, .. } => {
            format!("paused with {} left", format_remaining(*remaining_ms))
        }
        Event::Stopped { .. } => "stopped".to_string(),
        Event::PhaseCompleted {
            completed,
            next,
            completed_cycles,
            ..
        } => format!(
            "{} finished, {} begins ({} cycles done)",
            phase_label(*completed),
            phase_label(*next),
            completed_cycles
        ),
        Event::SessionFinished {
            completed_cycles, ..
        } => format!("session finished after {completed_cycles} cycles"),
        Event::SettingsApplied { settings, .. } => format!(
            "settings applied: active {} rest {} repeat {}",
            format_remaining(settings.active_duration_ms),
            format_remaining(settings.rest_duration_ms),
            settings.repeat_count
        ),
        Event::SchedulingDegraded { .. } => {
            "exact timing unavailable, boundaries may arrive late".to_string()
        }
        Event::SurfaceRestored { .. }
        | Event::SurfaceRestoreSuppressed { .. }
        | Event::SurfaceRestoreFailed { .. } => return Ok(()),
    };
    println!("\r\x1b[2K{text}");
    Ok(())
}
