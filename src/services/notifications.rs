//! Cache state notifications.
//!
//! The orchestrator publishes one event whenever a `CacheState` row
//! changes, so a presentation layer can follow a run as it happens.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{CacheState, CollectionType, Operation};

/// Payload for cache-state events.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStateEvent {
    /// Collection the state belongs to.
    pub collection_type: CollectionType,

    /// Which progress pair is being driven.
    pub operation: Operation,

    /// Where the run is.
    pub phase: SyncPhase,

    /// Snapshot of the state right after the change was persisted.
    pub state: CacheState,

    /// Error message for failed runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CacheStateEvent {
    pub fn new(
        collection_type: CollectionType,
        operation: Operation,
        phase: SyncPhase,
        state: &CacheState,
    ) -> Self {
        Self {
            collection_type,
            operation,
            phase,
            state: state.clone(),
            error: None,
        }
    }

    /// `(processed, total)` of the snapshot.
    pub fn progress(&self) -> (i64, i64) {
        self.state.progress(self.operation)
    }
}

/// Phase of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Run started, total known.
    Started,

    /// Progress tick.
    Progress,

    /// Run finished.
    Completed,

    /// Run aborted; the state was left mid-flight.
    Failed,
}

/// Receiver of cache state events. Must not block.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: CacheStateEvent);
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: CacheStateEvent) {
        let (processed, total) = event.progress();
        match event.phase {
            SyncPhase::Failed => log::warn!(
                "[{}] {} failed at {}/{}: {}",
                event.collection_type,
                event.operation,
                processed,
                total,
                event.error.as_deref().unwrap_or("unknown error")
            ),
            SyncPhase::Progress => log::debug!(
                "[{}] {} {}/{}",
                event.collection_type,
                event.operation,
                processed,
                total
            ),
            phase => log::info!(
                "[{}] {} {:?} ({}/{}), status={}",
                event.collection_type,
                event.operation,
                phase,
                processed,
                total,
                event.state.status
            ),
        }
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CacheStateEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CacheStateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: CacheStateEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _event: CacheStateEvent) {}
}
