//! Background sync loop.
//!
//! Runs an incremental refresh of every collection at a fixed interval and
//! listens for commands on an mpsc channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::AppError;
use crate::models::cache_state::SyncMode;
use crate::models::CollectionType;
use crate::services::orchestrator::SyncOrchestrator;

/// Default sync interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;

/// Commands that can be sent to the scheduler.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run an incremental sync of every collection now.
    TriggerSync,

    /// Rebuild one collection from scratch.
    Rebuild(CollectionType),

    /// Stop the loop.
    Stop,
}

/// Cloneable handle for controlling the background loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Trigger an immediate sync.
    pub async fn trigger_sync(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::TriggerSync).await
    }

    /// Queue a rebuild of one collection.
    pub async fn rebuild(&self, collection_type: CollectionType) -> Result<(), AppError> {
        self.send(SchedulerCommand::Rebuild(collection_type)).await
    }

    /// Ask the loop to stop after the command in progress.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::Stop).await
    }

    async fn send(&self, command: SchedulerCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AppError::internal("Scheduler not running"))
    }
}

/// Start the background loop.
///
/// The first sync runs immediately. Returns the control handle and the
/// task's join handle, which resolves once the loop stops.
pub fn start_background(
    orchestrator: Arc<SyncOrchestrator>,
    interval_secs: u64,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<SchedulerCommand>(16);

    let task = tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    log::info!("[scheduler] Running periodic sync");
                    run_sync(&orchestrator).await;
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::TriggerSync) => {
                            log::info!("[scheduler] Manual sync triggered");
                            run_sync(&orchestrator).await;
                        }
                        Some(SchedulerCommand::Rebuild(collection_type)) => {
                            log::info!("[scheduler] Rebuilding {}", collection_type);
                            if let Err(e) = orchestrator.rebuild(collection_type).await {
                                log::warn!("[scheduler] Rebuild of {} failed: {}", collection_type, e);
                            }
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            log::info!("[scheduler] Stopping");
                            break;
                        }
                    }
                }
            }
        }
        log::info!("[scheduler] Stopped");
    });

    (SchedulerHandle { command_tx: tx }, task)
}

async fn run_sync(orchestrator: &SyncOrchestrator) {
    match orchestrator.refresh_all(SyncMode::Incremental).await {
        Ok(states) => log::info!("[scheduler] Sync complete: {} collection(s)", states.len()),
        Err(e) => log::warn!("[scheduler] Sync error: {}", e),
    }
}
