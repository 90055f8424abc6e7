//! Background sync service
//!
//! Runs a [`SyncCoordinator`] on a periodic timer inside one tokio task and
//! accepts commands through a [`SyncHandle`]. Cycles run strictly one after
//! another; a manual refresh arriving mid-cycle is handled once the current
//! cycle has finished.

use crate::error::{MeterbookError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::source::Reauthenticate;
use crate::sync::{SyncCoordinator, UsageUpdated};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Commands accepted by the running service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Run a forced cycle now
    RefreshNow,
    Shutdown,
}

/// Periodic driver around a [`SyncCoordinator`]
pub struct SyncService {
    coordinator: SyncCoordinator,
    period: Duration,
    reauth: Option<Arc<dyn Reauthenticate>>,
    logger: StructuredLogger,
}

impl SyncService {
    pub fn new(coordinator: SyncCoordinator, period: Duration) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("service").with_contract(coordinator.contract_id()),
        );
        Self {
            coordinator,
            period,
            reauth: None,
            logger,
        }
    }

    /// Log in again through `hook` after a cycle failed authentication
    pub fn with_reauth(mut self, hook: Arc<dyn Reauthenticate>) -> Self {
        self.reauth = Some(hook);
        self
    }

    /// Spawn a service without a re-authentication hook
    pub fn spawn(coordinator: SyncCoordinator, period: Duration) -> SyncHandle {
        Self::new(coordinator, period).start()
    }

    /// Move the service onto a tokio task. The first cycle runs immediately.
    pub fn start(self) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.coordinator.events();
        let task = tokio::spawn(self.run(rx));
        SyncHandle { tx, events, task }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SyncCommand>) -> SyncCoordinator {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut needs_reauth = false;

        self.logger.info(&format!(
            "Sync service started, period {}s",
            self.period.as_secs()
        ));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle(false, &mut needs_reauth).await;
                }
                cmd = commands.recv() => match cmd {
                    Some(SyncCommand::RefreshNow) => {
                        self.logger.info("Manual refresh requested");
                        self.cycle(true, &mut needs_reauth).await;
                    }
                    Some(SyncCommand::Shutdown) => {
                        self.logger.info("Shutdown requested");
                        break;
                    }
                    None => {
                        self.logger.debug("All handles dropped, stopping");
                        break;
                    }
                }
            }
        }

        self.coordinator
    }

    async fn cycle(&mut self, force: bool, needs_reauth: &mut bool) {
        if *needs_reauth {
            if let Some(hook) = &self.reauth {
                match hook.reauthenticate().await {
                    Ok(()) => self.logger.info("Re-authenticated"),
                    Err(e) => self.logger.error(&format!("Re-authentication failed: {}", e)),
                }
            }
            *needs_reauth = false;
        }

        let result = if force {
            self.coordinator.force_sync().await
        } else {
            self.coordinator.sync().await
        };

        match result {
            Ok(_) => {}
            Err(e) if e.is_auth() => {
                self.logger
                    .warn(&format!("Sync cycle hit an authentication error: {}", e));
                *needs_reauth = true;
            }
            Err(e) => self.logger.error(&format!("Sync cycle failed: {}", e)),
        }
    }
}

/// Owner's handle on a running [`SyncService`].
///
/// Dropping the handle closes the command channel; the task stops once its
/// current cycle is over and any result is discarded.
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
    events: broadcast::Sender<UsageUpdated>,
    task: JoinHandle<SyncCoordinator>,
}

impl SyncHandle {
    /// Ask for a forced cycle
    pub fn refresh_now(&self) -> Result<()> {
        self.tx
            .send(SyncCommand::RefreshNow)
            .map_err(|_| MeterbookError::generic("Sync service is not running"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UsageUpdated> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop after the current cycle and hand the coordinator back
    pub async fn shutdown(self) -> Result<SyncCoordinator> {
        // The task may already be gone; joining reports why
        let _ = self.tx.send(SyncCommand::Shutdown);
        Ok(self.task.await?)
    }

    /// Cancel the task at its next await point
    pub fn abort(self) {
        self.task.abort();
    }
}
