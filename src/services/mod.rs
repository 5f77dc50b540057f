//! Sync engine services.
//!
//! Leaf-first: the remote boundary and its Jira client, pagers, the record
//! resolver, the per-collection adapters, and the orchestrator that drives
//! them through their cache lifecycle.

pub mod adapter;
pub mod collections;
pub mod derived;
pub mod jira_client;
pub mod jira_types;
pub mod notifications;
pub mod orchestrator;
pub mod page_source;
pub mod record_resolver;
pub mod remote;
pub mod resumable;
pub mod scheduler;

pub use adapter::{CollectionSyncAdapter, ProgressReporter, SyncContext, SyncSettings};
pub use jira_client::{JiraClient, JiraClientConfig};
pub use notifications::{CacheStateEvent, ChannelSink, LogSink, NoopSink, NotificationSink};
pub use orchestrator::SyncOrchestrator;
pub use record_resolver::{LocalRef, RecordResolver};
pub use remote::{Endpoint, RemotePage, RemoteSource};
pub use scheduler::{SchedulerCommand, SchedulerHandle};
