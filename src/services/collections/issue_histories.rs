//! Issue changelogs, ingested resumably per issue.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, SyncContext};
use crate::services::jira_types::{from_record, ApiHistory, ApiUser};
use crate::services::remote::Endpoint;
use crate::services::resumable::{ChildCollection, ParentRow, ResumableChildIngestor};
use crate::timestamps::parse_jira_timestamp;

/// One row per changed field: a changelog entry touching three fields
/// becomes three rows sharing `jira_id`.
pub struct IssueHistoriesAdapter;

#[async_trait]
impl ChildCollection for IssueHistoriesAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::IssueHistories
    }

    fn count_column(&self) -> &'static str {
        "history_count"
    }

    fn synced_at_column(&self) -> &'static str {
        "history_synced_at"
    }

    fn endpoint(&self, parent_key: &str) -> Endpoint {
        Endpoint::IssueChangelog {
            issue_key: parent_key.to_string(),
        }
    }

    async fn store_page(
        &self,
        conn: &mut SqliteConnection,
        ctx: &SyncContext,
        parent: &ParentRow,
        records: Vec<Value>,
    ) -> Result<(), AppError> {
        for record in records {
            let history: ApiHistory = from_record(record, "changelog")?;
            let author_key = history.author.as_ref().and_then(ApiUser::external_key);
            let author_id = ctx.resolve_id(CollectionType::Users, author_key, None).await?;
            let created_at = parse_jira_timestamp(&history.created).unwrap_or(0);

            for (index, item) in history.items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO issue_histories (
                        jira_id, item_index, issue_id, author_id, created_at, field,
                        field_type, from_value, from_string, to_value, to_string
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(jira_id, item_index) DO UPDATE SET
                        issue_id = excluded.issue_id,
                        author_id = excluded.author_id,
                        created_at = excluded.created_at,
                        field = excluded.field,
                        field_type = excluded.field_type,
                        from_value = excluded.from_value,
                        from_string = excluded.from_string,
                        to_value = excluded.to_value,
                        to_string = excluded.to_string
                    "#,
                )
                .bind(&history.id)
                .bind(index as i64)
                .bind(parent.id)
                .bind(author_id)
                .bind(created_at)
                .bind(&item.field)
                .bind(&item.field_type)
                .bind(&item.from)
                .bind(&item.from_string)
                .bind(&item.to)
                .bind(&item.to_string)
                .execute(&mut *conn)
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CollectionSyncAdapter for IssueHistoriesAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::IssueHistories
    }

    async fn count(&self, ctx: &SyncContext, since: Option<i64>) -> Result<u64, AppError> {
        ResumableChildIngestor::new(ctx, self).count(since).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        ResumableChildIngestor::new(ctx, self).run(since, progress).await
    }
}
