//! Flat reference data: statuses, priorities, issue types and resolutions.
//!
//! All four share one shape (`id`, `name`, `description`) and one adapter,
//! parameterized by collection type.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::jira_types::{from_record, ApiNamedItem};
use crate::services::remote::Endpoint;
use crate::timestamps::now;

pub struct ReferenceAdapter {
    collection_type: CollectionType,
    endpoint: Endpoint,
}

impl ReferenceAdapter {
    pub fn new(collection_type: CollectionType, endpoint: Endpoint) -> Self {
        Self {
            collection_type,
            endpoint,
        }
    }
}

#[async_trait]
impl CollectionSyncAdapter for ReferenceAdapter {
    fn collection_type(&self) -> CollectionType {
        self.collection_type
    }

    async fn count(&self, ctx: &SyncContext, _since: Option<i64>) -> Result<u64, AppError> {
        ctx.pages().count(&self.endpoint).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        _since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let mut tally = ProgressTally::new(progress);
        let mut pager = ctx.pages().pages(self.endpoint.clone());

        // Table names come from the closed CollectionType set
        let upsert = format!(
            r#"
            INSERT INTO {} (jira_id, name, description, synced_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(jira_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                synced_at = excluded.synced_at
            "#,
            self.collection_type.table()
        );

        while let Some(page) = pager.next_page().await? {
            let count = page.len() as u64;
            let mut tx = ctx.pool.begin().await?;
            for record in page {
                let item: ApiNamedItem = from_record(record, self.collection_type.as_str())?;
                sqlx::query(&upsert)
                    .bind(&item.id)
                    .bind(&item.name)
                    .bind(&item.description)
                    .bind(now())
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            tally.advance(count).await?;
        }

        tally.finish().await?;
        Ok(())
    }
}
