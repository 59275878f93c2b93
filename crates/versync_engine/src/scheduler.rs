//! Background scheduling of sync work.
//!
//! One loop owns every trigger:
//! - connectivity: coming online or returning to the foreground schedules a
//!   full pass after the settle delay; going offline cancels it
//! - local mutations: each change spawns an eager single-item sync after the
//!   eager delay
//! - a periodic timer runs a full pass every sync interval
//! - manual triggers from [`SchedulerHandle`]
//!
//! Full passes run in their own task so the loop keeps serving triggers
//! while one is in progress. A trigger that arrives during a pass is
//! dropped, except the settle deadline, which is pushed back.

use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::monitor::ConnectivityEvent;
use crate::orchestrator::SyncOrchestrator;
use crate::registry::ItemChange;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

enum Command {
    SyncNow(SyncOptions),
    Stop(Instant),
}

/// The full pass currently running, if any. Dropping the slot aborts it.
#[derive(Default)]
struct PassSlot(Option<JoinHandle<()>>);

impl Drop for PassSlot {
    fn drop(&mut self) {
        if let Some(task) = &self.0 {
            task.abort();
        }
    }
}

impl PassSlot {
    fn is_running(&self) -> bool {
        self.0.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts a pass unless one is already running. Returns false if busy.
    fn start(&mut self, orchestrator: &SyncOrchestrator, options: SyncOptions) -> bool {
        if self.is_running() {
            debug!("sync pass already running");
            return false;
        }
        let orchestrator = orchestrator.clone();
        self.0 = Some(tokio::spawn(async move {
            run_pass(&orchestrator, options).await;
        }));
        true
    }

    /// Waits for the running pass until `deadline`, then aborts it.
    async fn finish(&mut self, deadline: Instant) {
        let Some(mut task) = self.0.take() else {
            return;
        };
        if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
            warn!("sync pass still running at shutdown, aborting");
            task.abort();
            let _ = task.await;
        }
    }
}

/// Spawns and drives the background sync loop.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Starts the loop on the current tokio runtime.
    ///
    /// If the device is online, a first full pass runs after the settle
    /// delay.
    pub fn spawn(orchestrator: SyncOrchestrator) -> SchedulerHandle {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let mut connectivity = orchestrator.monitor().subscribe();
        let mut changes = orchestrator.registry().subscribe_changes();

        let loop_orchestrator = orchestrator.clone();
        let task = tokio::spawn(async move {
            let orchestrator = loop_orchestrator;
            let config = orchestrator.config().clone();

            let period = config.sync_interval.max(Duration::from_millis(1));
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut deadline =
                orchestrator.is_online().then(|| Instant::now() + config.settle_delay);

            let mut pass = PassSlot::default();

            info!("sync scheduler started");
            loop {
                tokio::select! {
                    Some(event) = connectivity.recv() => match event {
                        ConnectivityEvent::Online | ConnectivityEvent::Foreground => {
                            if orchestrator.is_online() {
                                deadline = Some(Instant::now() + config.settle_delay);
                            }
                        }
                        ConnectivityEvent::Offline => deadline = None,
                        ConnectivityEvent::Background => {}
                    },
                    Some(change) = changes.recv() => {
                        spawn_eager(&orchestrator, change, config.eager_delay);
                    }
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() =>
                    {
                        deadline = if pass.start(&orchestrator, config.default_options()) {
                            None
                        } else {
                            Some(Instant::now() + config.settle_delay)
                        };
                    }
                    _ = interval.tick() => {
                        if orchestrator.is_online() {
                            pass.start(&orchestrator, config.default_options());
                        }
                    }
                    command = rx.recv() => match command {
                        Some(Command::SyncNow(options)) => {
                            pass.start(&orchestrator, options);
                        }
                        Some(Command::Stop(until)) => {
                            pass.finish(until).await;
                            break;
                        }
                        None => {
                            pass.finish(Instant::now()).await;
                            break;
                        }
                    },
                }
            }
            info!("sync scheduler stopped");
        });

        SchedulerHandle {
            orchestrator,
            commands,
            task,
        }
    }
}

fn spawn_eager(orchestrator: &SyncOrchestrator, change: ItemChange, delay: Duration) {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match orchestrator.sync_one(&change.id).await {
            Ok(outcome) => debug!(id = %change.id, ?outcome, "eager sync finished"),
            Err(e) => debug!(id = %change.id, error = %e, "eager sync abandoned"),
        }
    });
}

async fn run_pass(orchestrator: &SyncOrchestrator, options: SyncOptions) {
    match orchestrator.sync_all(options).await {
        Ok(result) => debug!(
            synced = result.synced,
            errored = result.errored,
            "scheduled pass finished"
        ),
        Err(SyncError::Offline | SyncError::SyncInProgress) => {
            debug!("scheduled pass skipped");
        }
        Err(e) => warn!(error = %e, "scheduled pass failed"),
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    orchestrator: SyncOrchestrator,
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Requests a full pass with the configured defaults.
    ///
    /// Returns false if the loop has stopped.
    pub fn trigger(&self) -> bool {
        self.trigger_with(self.orchestrator.config().default_options())
    }

    /// Requests a full pass with the given options.
    pub fn trigger_with(&self, options: SyncOptions) -> bool {
        self.commands.send(Command::SyncNow(options)).is_ok()
    }

    /// Returns true if the loop is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop, then runs the final sync.
    ///
    /// The whole teardown, including any pass still running, is bounded by
    /// the configured teardown timeout. Returns true if the final sync
    /// completed.
    pub async fn shutdown(self) -> bool {
        let deadline = Instant::now() + self.orchestrator.config().teardown_timeout;
        let _ = self.commands.send(Command::Stop(deadline));
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync scheduler task failed");
        }
        self.orchestrator.shutdown_until(deadline).await
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
