//! Drives collections through their cache lifecycle.
//!
//! A refresh moves a `CacheState` from `missing`/`built`/`updated` to
//! `building` or `updating`, runs the collection's adapter while persisting
//! every progress tick, and lands on `built` or `updated`. A failed run is
//! left where it stopped: the status stays `building`/`updating` with no
//! completion time, and the next refresh starts a fresh attempt.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::cache_state::{self, CacheState, Operation, SyncMode};
use crate::models::CollectionType;
use crate::services::adapter::{ProgressReporter, SyncContext, SyncSettings};
use crate::services::collections::adapter_for;
use crate::services::notifications::{CacheStateEvent, NotificationSink, SyncPhase};
use crate::services::remote::RemoteSource;
use crate::timestamps::now;

/// Persists progress ticks into the state row and publishes them.
struct StateProgress<'a> {
    pool: &'a DbPool,
    sink: &'a dyn NotificationSink,
    state: &'a mut CacheState,
    collection_type: CollectionType,
    operation: Operation,
}

#[async_trait]
impl ProgressReporter for StateProgress<'_> {
    fn total(&self) -> u64 {
        self.state.progress(self.operation).1.max(0) as u64
    }

    async fn report(&mut self, processed: u64, total: u64) -> Result<(), AppError> {
        self.state
            .record_progress(self.operation, processed as i64, total as i64);
        cache_state::save_cache_state(self.pool, &*self.state).await?;
        self.sink.notify(CacheStateEvent::new(
            self.collection_type,
            self.operation,
            SyncPhase::Progress,
            &*self.state,
        ));
        Ok(())
    }
}

/// Entry point for refreshing mirrored collections.
pub struct SyncOrchestrator {
    pool: DbPool,
    remote: Arc<dyn RemoteSource>,
    settings: SyncSettings,
    sink: Arc<dyn NotificationSink>,

    /// Serializes refreshes of the same collection type.
    locks: HashMap<CollectionType, Arc<Mutex<()>>>,
}

impl SyncOrchestrator {
    pub fn new(
        pool: DbPool,
        remote: Arc<dyn RemoteSource>,
        settings: SyncSettings,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let locks = CollectionType::SYNC_ORDER
            .iter()
            .map(|t| (*t, Arc::new(Mutex::new(()))))
            .collect();

        Self {
            pool,
            remote,
            settings,
            sink,
            locks,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// A fresh context with an empty resolver.
    pub fn context(&self) -> SyncContext {
        SyncContext::new(self.pool.clone(), self.remote.clone(), self.settings.clone())
    }

    /// Current state of a collection, created as `missing` on first request.
    pub async fn state(&self, collection_type: CollectionType) -> Result<CacheState, AppError> {
        cache_state::get_or_create_cache_state(&self.pool, collection_type).await
    }

    /// States of every collection, in sync order.
    pub async fn states(&self) -> Result<Vec<CacheState>, AppError> {
        let mut states = Vec::with_capacity(CollectionType::SYNC_ORDER.len());
        for collection_type in CollectionType::SYNC_ORDER {
            states.push(self.state(collection_type).await?);
        }
        Ok(states)
    }

    /// Refresh one collection in its own context.
    pub async fn refresh(
        &self,
        collection_type: CollectionType,
        mode: SyncMode,
    ) -> Result<CacheState, AppError> {
        let ctx = self.context();
        self.refresh_in(&ctx, collection_type, mode).await
    }

    /// Refresh one collection inside an existing context, sharing its
    /// resolver maps.
    pub async fn refresh_in(
        &self,
        ctx: &SyncContext,
        collection_type: CollectionType,
        mode: SyncMode,
    ) -> Result<CacheState, AppError> {
        let lock = self.lock_for(collection_type)?;
        let _guard = lock.lock().await;
        self.run_locked(ctx, collection_type, mode, false).await
    }

    /// Forget incremental history, then build from scratch.
    pub async fn rebuild(&self, collection_type: CollectionType) -> Result<CacheState, AppError> {
        let lock = self.lock_for(collection_type)?;
        let _guard = lock.lock().await;
        let ctx = self.context();
        self.run_locked(&ctx, collection_type, SyncMode::Full, true)
            .await
    }

    /// Incremental refresh from the stored watermark. A collection that was
    /// never completed has no watermark and gets a full build instead.
    pub async fn recache(&self, collection_type: CollectionType) -> Result<CacheState, AppError> {
        self.refresh(collection_type, SyncMode::Incremental).await
    }

    /// Refresh every collection in dependency order, sharing one context.
    /// Stops at the first failure.
    pub async fn refresh_all(&self, mode: SyncMode) -> Result<Vec<CacheState>, AppError> {
        let ctx = self.context();
        let mut states = Vec::with_capacity(CollectionType::SYNC_ORDER.len());
        for collection_type in CollectionType::SYNC_ORDER {
            states.push(self.refresh_in(&ctx, collection_type, mode).await?);
        }
        Ok(states)
    }

    fn lock_for(&self, collection_type: CollectionType) -> Result<Arc<Mutex<()>>, AppError> {
        self.locks
            .get(&collection_type)
            .cloned()
            .ok_or_else(|| AppError::internal(format!("No lock for {}", collection_type)))
    }

    async fn run_locked(
        &self,
        ctx: &SyncContext,
        collection_type: CollectionType,
        mode: SyncMode,
        reset_update: bool,
    ) -> Result<CacheState, AppError> {
        let adapter = adapter_for(collection_type);
        let mut state = cache_state::get_or_create_cache_state(&self.pool, collection_type).await?;

        if reset_update {
            state.reset_update();
            cache_state::save_cache_state(&self.pool, &state).await?;
        }

        let since = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental => state.watermark(),
        };
        let operation = if since.is_some() {
            Operation::Update
        } else {
            Operation::Build
        };

        let started_at = now();
        let total = adapter.count(ctx, since).await.map_err(|e| {
            log::warn!("[{}] Counting records failed: {}", collection_type, e);
            e
        })?;

        log::info!(
            "[{}] Starting {} of {} record(s){}",
            collection_type,
            operation,
            total,
            since
                .map(|s| format!(" changed since {}", s))
                .unwrap_or_default()
        );

        state.begin(operation, started_at, total as i64);
        cache_state::save_cache_state(&self.pool, &state).await?;
        self.publish(collection_type, operation, SyncPhase::Started, &state, None);

        let result = {
            let mut progress = StateProgress {
                pool: &self.pool,
                sink: self.sink.as_ref(),
                state: &mut state,
                collection_type,
                operation,
            };
            adapter.run(ctx, since, &mut progress).await
        };

        if let Err(e) = result {
            log::warn!("[{}] {} failed: {}", collection_type, operation, e);
            self.publish(
                collection_type,
                operation,
                SyncPhase::Failed,
                &state,
                Some(e.to_string()),
            );
            return Err(e);
        }

        state.complete(operation, now());
        cache_state::save_cache_state(&self.pool, &state).await?;
        self.publish(collection_type, operation, SyncPhase::Completed, &state, None);

        Ok(state)
    }

    fn publish(
        &self,
        collection_type: CollectionType,
        operation: Operation,
        phase: SyncPhase,
        state: &CacheState,
        error: Option<String>,
    ) {
        let mut event = CacheStateEvent::new(collection_type, operation, phase, state);
        event.error = error;
        self.sink.notify(event);
    }
}
