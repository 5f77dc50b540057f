//! Worklogs, ingested resumably per issue.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, SyncContext};
use crate::services::jira_types::{from_record, ApiUser, ApiWorklog};
use crate::services::remote::Endpoint;
use crate::services::resumable::{ChildCollection, ParentRow, ResumableChildIngestor};
use crate::timestamps::parse_jira_timestamp;

pub struct WorklogsAdapter;

#[async_trait]
impl ChildCollection for WorklogsAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Worklogs
    }

    fn count_column(&self) -> &'static str {
        "worklog_count"
    }

    fn synced_at_column(&self) -> &'static str {
        "worklog_synced_at"
    }

    fn endpoint(&self, parent_key: &str) -> Endpoint {
        Endpoint::IssueWorklog {
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
            let worklog: ApiWorklog = from_record(record, "worklog")?;
            let author_key = worklog.author.as_ref().and_then(ApiUser::external_key);
            let author_id = ctx.resolve_id(CollectionType::Users, author_key, None).await?;
            let started_at = parse_jira_timestamp(&worklog.started).unwrap_or(0);
            let updated_at = worklog.updated.as_deref().and_then(parse_jira_timestamp);

            sqlx::query(
                r#"
                INSERT INTO worklogs (
                    jira_id, issue_id, author_id, started_at, time_spent_secs, comment, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(jira_id) DO UPDATE SET
                    issue_id = excluded.issue_id,
                    author_id = excluded.author_id,
                    started_at = excluded.started_at,
                    time_spent_secs = excluded.time_spent_secs,
                    comment = excluded.comment,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&worklog.id)
            .bind(parent.id)
            .bind(author_id)
            .bind(started_at)
            .bind(worklog.time_spent_seconds)
            .bind(worklog.comment_text())
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CollectionSyncAdapter for WorklogsAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Worklogs
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
