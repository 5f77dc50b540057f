//! The contract every synchronizable collection implements, and the
//! per-invocation context adapters run in.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::page_source::PageSource;
use crate::services::record_resolver::RecordResolver;
use crate::services::remote::RemoteSource;

/// Default page size for top-level collections.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Default page size for per-issue child collections.
pub const DEFAULT_CHILD_PAGE_SIZE: u64 = 100;

/// Tunables shared by every adapter.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Page size for top-level collections.
    pub page_size: u64,

    /// Page size for changelog and worklog pages.
    pub child_page_size: u64,

    /// Base JQL restricting which issues are mirrored.
    pub jql: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            child_page_size: DEFAULT_CHILD_PAGE_SIZE,
            jql: None,
        }
    }
}

/// Everything an adapter needs for one sync invocation.
///
/// The resolver lives here rather than in a global so that its memoized
/// maps are scoped to the invocation that loaded them.
pub struct SyncContext {
    pub pool: DbPool,
    pub remote: Arc<dyn RemoteSource>,
    pub settings: SyncSettings,
    resolver: Mutex<RecordResolver>,
}

impl SyncContext {
    pub fn new(pool: DbPool, remote: Arc<dyn RemoteSource>, settings: SyncSettings) -> Self {
        Self {
            pool,
            remote,
            settings,
            resolver: Mutex::new(RecordResolver::new()),
        }
    }

    /// Pages of top-level collections.
    pub fn pages(&self) -> PageSource<'_> {
        PageSource::new(self.remote.as_ref(), self.settings.page_size)
    }

    /// Pages of per-issue child collections.
    pub fn child_pages(&self) -> PageSource<'_> {
        PageSource::new(self.remote.as_ref(), self.settings.child_page_size)
    }

    /// Resolve an external key to a local row id, loading the record map
    /// on first use. Misses are logged and yield `None`.
    pub async fn resolve_id(
        &self,
        collection_type: CollectionType,
        key: Option<&str>,
        alias: Option<&str>,
    ) -> Result<Option<i64>, AppError> {
        let Some(key) = key else {
            return Ok(None);
        };

        let mut resolver = self.resolver.lock().await;
        resolver
            .load_if_absent(&self.pool, collection_type, alias)
            .await?;

        let id = resolver.resolve(collection_type, key, alias).map(|r| r.id);
        if id.is_none() {
            log::debug!("Unresolved {} reference: {}", collection_type, key);
        }
        Ok(id)
    }
}

/// Receives progress ticks from a running adapter.
#[async_trait]
pub trait ProgressReporter: Send {
    /// Total announced when the run started.
    fn total(&self) -> u64;

    /// Record `processed` of `total` records done.
    async fn report(&mut self, processed: u64, total: u64) -> Result<(), AppError>;
}

/// A synchronizable collection.
#[async_trait]
pub trait CollectionSyncAdapter: Send + Sync {
    /// The collection this adapter fills.
    fn collection_type(&self) -> CollectionType;

    /// Estimated number of records a run with this `since` will process.
    /// Must not write anything.
    async fn count(&self, ctx: &SyncContext, since: Option<i64>) -> Result<u64, AppError>;

    /// Ingest every record changed since `since` (everything when `None`).
    ///
    /// Reports progress as it goes and always ends with a `(n, n)` tick,
    /// even when nothing was ingested.
    async fn run(
        &self,
        ctx: &SyncContext,
        since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError>;
}

/// Running tally on top of a [`ProgressReporter`].
///
/// `advance` reports after each unit of work; `finish` sends the closing
/// `(n, n)` tick unless the last report already was one.
pub struct ProgressTally<'a> {
    reporter: &'a mut dyn ProgressReporter,
    processed: u64,
    total: u64,
    last_reported: Option<(u64, u64)>,
}

impl<'a> ProgressTally<'a> {
    pub fn new(reporter: &'a mut dyn ProgressReporter) -> Self {
        let total = reporter.total();
        Self {
            reporter,
            processed: 0,
            total,
            last_reported: None,
        }
    }

    /// Count `n` more records as done and report.
    pub async fn advance(&mut self, n: u64) -> Result<(), AppError> {
        self.processed += n;
        self.total = self.total.max(self.processed);
        self.send(self.processed, self.total).await
    }

    /// Report the closing tick. Returns the number of records processed.
    pub async fn finish(mut self) -> Result<u64, AppError> {
        let done = (self.processed, self.processed);
        if self.last_reported != Some(done) {
            self.send(done.0, done.1).await?;
        }
        Ok(self.processed)
    }

    async fn send(&mut self, processed: u64, total: u64) -> Result<(), AppError> {
        self.reporter.report(processed, total).await?;
        self.last_reported = Some((processed, total));
        Ok(())
    }
}
