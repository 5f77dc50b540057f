//! Projects, with their lead resolved against users.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::jira_types::{from_record, ApiProject};
use crate::services::remote::Endpoint;
use crate::timestamps::now;

pub struct ProjectsAdapter;

#[async_trait]
impl CollectionSyncAdapter for ProjectsAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Projects
    }

    async fn count(&self, ctx: &SyncContext, _since: Option<i64>) -> Result<u64, AppError> {
        ctx.pages().count(&Endpoint::Projects).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        _since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let mut tally = ProgressTally::new(progress);
        let mut pager = ctx.pages().pages(Endpoint::Projects);

        while let Some(page) = pager.next_page().await? {
            let count = page.len() as u64;
            let mut tx = ctx.pool.begin().await?;
            for record in page {
                let project: ApiProject = from_record(record, "project")?;
                let lead_key = project.lead.as_ref().and_then(|u| u.external_key());
                let lead_id = ctx.resolve_id(CollectionType::Users, lead_key, None).await?;

                sqlx::query(
                    r#"
                    INSERT INTO projects (jira_key, jira_id, name, project_type, lead_id, synced_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(jira_key) DO UPDATE SET
                        jira_id = excluded.jira_id,
                        name = excluded.name,
                        project_type = excluded.project_type,
                        lead_id = excluded.lead_id,
                        synced_at = excluded.synced_at
                    "#,
                )
                .bind(&project.key)
                .bind(&project.id)
                .bind(&project.name)
                .bind(&project.project_type_key)
                .bind(lead_id)
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
