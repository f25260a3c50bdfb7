//! Async front of the engine.
//!
//! One task owns the [`EngineController`]; commands, wake-up deliveries and
//! surface-monitor ticks all arrive on channels and are handled one at a
//! time. The monitor runs as its own task that sleeps for the interval the
//! controller hands back and is aborted as soon as the session stops.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::engine::{EngineController, Snapshot, StateStreams};
use super::scheduler::Wakeup;
use super::settings::{NotificationSettings, Settings};
use super::state::SessionState;
use crate::error::EngineError;
use crate::events::Event;

const COMMAND_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<T>;
type TickRequest = Reply<Option<u64>>;

enum Command {
    Start(Reply<Option<Event>>),
    Pause(Reply<Option<Event>>),
    Stop(Reply<Option<Event>>),
    UpdateSettings(Settings, Reply<Result<Option<Event>, EngineError>>),
    UpdateNotificationSettings(NotificationSettings, Reply<Result<(), EngineError>>),
    Snapshot(Reply<Snapshot>),
    Display(Reply<SessionState>),
    Shutdown(Reply<()>),
}

/// Cloneable handle to a running engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    streams: StateStreams,
}

/// Move `controller` onto its own task, fed by `wakeups`.
///
/// `wakeups` is the delivery side of the backend the controller was built
/// with (see [`super::scheduler::TokioWakeups::new`]).
pub fn spawn_engine(
    controller: EngineController,
    wakeups: mpsc::UnboundedReceiver<Wakeup>,
) -> (EngineHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
    let streams = controller.streams();
    let (ticks_tx, ticks_rx) = mpsc::channel(1);
    let actor = Actor {
        controller,
        commands: rx,
        wakeups,
        ticks: ticks_rx,
        ticks_tx,
        monitor: None,
    };
    let task = tokio::spawn(actor.run());
    (EngineHandle { commands, streams }, task)
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    pub async fn start(&self) -> Result<Option<Event>, EngineError> {
        self.request(Command::Start).await
    }

    pub async fn pause(&self) -> Result<Option<Event>, EngineError> {
        self.request(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<Option<Event>, EngineError> {
        self.request(Command::Stop).await
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<Option<Event>, EngineError> {
        self.request(|tx| Command::UpdateSettings(settings, tx)).await?
    }

    pub async fn update_notification_settings(
        &self,
        settings: NotificationSettings,
    ) -> Result<(), EngineError> {
        self.request(|tx| Command::UpdateNotificationSettings(settings, tx))
            .await?
    }

    pub async fn snapshot(&self) -> Result<Snapshot, EngineError> {
        self.request(Command::Snapshot).await
    }

    /// State with a projected countdown, for display.
    pub async fn display_state(&self) -> Result<SessionState, EngineError> {
        self.request(Command::Display).await
    }

    /// Stop the session and end the engine task.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(Command::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.streams.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.streams.watch()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.streams.events()
    }
}

struct Actor {
    controller: EngineController,
    commands: mpsc::Receiver<Command>,
    wakeups: mpsc::UnboundedReceiver<Wakeup>,
    ticks: mpsc::Receiver<TickRequest>,
    ticks_tx: mpsc::Sender<TickRequest>,
    monitor: Option<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        break;
                    }
                }
                Some(wakeup) = self.wakeups.recv() => {
                    self.controller.on_deadline_fired(wakeup);
                }
                Some(reply) = self.ticks.recv() => {
                    let _ = reply.send(self.controller.on_monitor_tick());
                }
            }
            self.sync_monitor(false);
        }
        self.controller.shutdown();
        self.stop_monitor();
        debug!("engine task finished");
    }

    /// Returns false when the loop should end.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                let event = self.controller.start();
                self.sync_monitor(false);
                let _ = reply.send(event);
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.controller.pause());
            }
            Command::Stop(reply) => {
                let event = self.controller.stop();
                // Tear the monitor down before the caller hears back.
                self.sync_monitor(false);
                let _ = reply.send(event);
            }
            Command::UpdateSettings(settings, reply) => {
                let result = self.controller.update_settings(settings);
                self.sync_monitor(false);
                let _ = reply.send(result);
            }
            Command::UpdateNotificationSettings(settings, reply) => {
                let result = self.controller.update_notification_settings(settings);
                // New cadence takes effect now, not after the current sleep.
                self.sync_monitor(result.is_ok());
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            Command::Display(reply) => {
                let _ = reply.send(self.controller.display_state());
            }
            Command::Shutdown(reply) => {
                self.controller.shutdown();
                self.stop_monitor();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn sync_monitor(&mut self, restart: bool) {
        if restart {
            self.stop_monitor();
        }
        match self.controller.next_poll_ms() {
            None => self.stop_monitor(),
            Some(first_ms) => {
                let alive = self.monitor.as_ref().is_some_and(|t| !t.is_finished());
                if !alive {
                    let ticks = self.ticks_tx.clone();
                    self.monitor = Some(tokio::spawn(monitor_loop(ticks, first_ms)));
                }
            }
        }
    }

    fn stop_monitor(&mut self) {
        if let Some(task) = self.monitor.take() {
            task.abort();
        }
    }
}

async fn monitor_loop(ticks: mpsc::Sender<TickRequest>, first_ms: u64) {
    let mut next_ms = first_ms;
    loop {
        tokio::time::sleep(Duration::from_millis(next_ms)).await;
        let (tx, rx) = oneshot::channel();
        if ticks.send(tx).await.is_err() {
            break;
        }
        match rx.await {
            Ok(Some(ms)) => next_ms = ms,
            _ => break,
        }
    }
}
