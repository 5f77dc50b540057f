//! Resumable per-parent ingestion of append-mostly child collections.
//!
//! Each issue row carries an offset (`*_count`) and a high-water mark
//! (`*_synced_at`) per child collection. A parent is processed inside one
//! transaction: pages are fetched from the stored offset up to the remote
//! total, then both columns are advanced and committed together. A failure
//! rolls the whole parent back, so the next run resumes from the old offset.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, SqliteConnection};

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{ProgressReporter, ProgressTally, SyncContext};
use crate::services::remote::Endpoint;
use crate::timestamps::now;

/// The parent columns a child collection ingests against.
#[derive(Debug, Clone, FromRow)]
pub struct ParentRow {
    pub id: i64,
    pub jira_key: String,
    pub updated_at: i64,
    pub child_count: Option<i64>,
    pub child_synced_at: Option<i64>,
}

/// A child collection paged per issue.
#[async_trait]
pub trait ChildCollection: Send + Sync {
    fn collection_type(&self) -> CollectionType;

    /// Offset column on `issues`.
    fn count_column(&self) -> &'static str;

    /// High-water-mark column on `issues`.
    fn synced_at_column(&self) -> &'static str;

    /// Remote endpoint for one parent's children.
    fn endpoint(&self, parent_key: &str) -> Endpoint;

    /// Upsert one page of raw child records.
    async fn store_page(
        &self,
        conn: &mut SqliteConnection,
        ctx: &SyncContext,
        parent: &ParentRow,
        records: Vec<Value>,
    ) -> Result<(), AppError>;
}

/// Drives a [`ChildCollection`] over every parent that needs it.
pub struct ResumableChildIngestor<'a, C> {
    ctx: &'a SyncContext,
    child: &'a C,
}

impl<'a, C: ChildCollection> ResumableChildIngestor<'a, C> {
    pub fn new(ctx: &'a SyncContext, child: &'a C) -> Self {
        Self { ctx, child }
    }

    /// Parents to process. Incremental runs skip parents whose children
    /// were synced after the parent last changed; full runs take every
    /// parent, relying on the stored offsets to skip ingested pages.
    pub async fn select_parents(&self, since: Option<i64>) -> Result<Vec<ParentRow>, AppError> {
        let filter = if since.is_some() {
            format!(
                "WHERE {synced} IS NULL OR {synced} < updated_at",
                synced = self.child.synced_at_column()
            )
        } else {
            String::new()
        };

        let query = format!(
            "SELECT id, jira_key, updated_at, {} AS child_count, {} AS child_synced_at
             FROM issues {} ORDER BY id",
            self.child.count_column(),
            self.child.synced_at_column(),
            filter
        );

        let parents = sqlx::query_as::<_, ParentRow>(&query)
            .fetch_all(&self.ctx.pool)
            .await?;
        Ok(parents)
    }

    /// Number of parents a run would process.
    pub async fn count(&self, since: Option<i64>) -> Result<u64, AppError> {
        Ok(self.select_parents(since).await?.len() as u64)
    }

    /// Ingest every selected parent, one progress tick per parent.
    pub async fn run(
        &self,
        since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let parents = self.select_parents(since).await?;
        let mut tally = ProgressTally::new(progress);

        for parent in &parents {
            self.ingest_parent(parent).await.map_err(|e| {
                let collection_type = self.child.collection_type();
                log::warn!("[{}] Rolled back {}: {}", collection_type, parent.jira_key, e);
                if e.is_authentication() {
                    e
                } else {
                    AppError::sync_for_collection(
                        format!("{} rolled back: {}", parent.jira_key, e),
                        collection_type.as_str(),
                    )
                }
            })?;
            tally.advance(1).await?;
        }

        tally.finish().await?;
        Ok(())
    }

    /// Fetch and store one parent's outstanding pages, then advance its
    /// offset and high-water mark. All or nothing.
    pub async fn ingest_parent(&self, parent: &ParentRow) -> Result<u64, AppError> {
        let endpoint = self.child.endpoint(&parent.jira_key);
        let page_size = self.ctx.settings.child_page_size.max(1);
        let total = self.ctx.child_pages().count(&endpoint).await?;

        let mut tx = self.ctx.pool.begin().await?;
        let mut offset = parent.child_count.unwrap_or(0).max(0) as u64;
        let mut fetched = 0u64;

        while offset < total {
            let page = self.ctx.remote.fetch_page(&endpoint, offset, page_size).await?;
            fetched += page.records.len() as u64;
            self.child
                .store_page(&mut *tx, self.ctx, parent, page.records)
                .await?;
            // Advancing by the requested size tolerates pages that shrink
            offset += page_size;
        }

        let query = format!(
            "UPDATE issues SET {} = ?, {} = ? WHERE id = ?",
            self.child.count_column(),
            self.child.synced_at_column()
        );
        // One second ahead so a parent updated in the same second as this
        // sync is not picked up again
        sqlx::query(&query)
            .bind(total as i64)
            .bind(now() + 1)
            .bind(parent.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(fetched)
    }
}
