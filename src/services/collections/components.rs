//! Components, paged per locally stored project.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::jira_types::{from_record, ApiComponent};
use crate::services::remote::Endpoint;
use crate::timestamps::now;

pub struct ComponentsAdapter;

fn components_of(project_key: &str) -> Endpoint {
    Endpoint::ProjectComponents {
        project_key: project_key.to_string(),
    }
}

async fn project_keys(ctx: &SyncContext) -> Result<Vec<String>, AppError> {
    let keys = sqlx::query_scalar::<_, String>("SELECT jira_key FROM projects ORDER BY jira_key")
        .fetch_all(&ctx.pool)
        .await?;
    Ok(keys)
}

#[async_trait]
impl CollectionSyncAdapter for ComponentsAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Components
    }

    async fn count(&self, ctx: &SyncContext, _since: Option<i64>) -> Result<u64, AppError> {
        let parents = project_keys(ctx).await?;
        ctx.pages().count_per_parent(&parents, components_of).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        _since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let mut tally = ProgressTally::new(progress);
        let parents = project_keys(ctx).await?;
        let mut pager = ctx.pages().pages_per_parent(parents, components_of);

        while let Some(page) = pager.next_page().await? {
            let count = page.len() as u64;
            let mut tx = ctx.pool.begin().await?;
            for record in page {
                let component: ApiComponent = from_record(record, "component")?;
                let project_id = ctx
                    .resolve_id(CollectionType::Projects, component.project_key(), None)
                    .await?;
                let lead_key = component.lead.as_ref().and_then(|u| u.external_key());
                let lead_id = ctx.resolve_id(CollectionType::Users, lead_key, None).await?;

                sqlx::query(
                    r#"
                    INSERT INTO components (jira_id, project_id, name, description, lead_id, synced_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(jira_id) DO UPDATE SET
                        project_id = excluded.project_id,
                        name = excluded.name,
                        description = excluded.description,
                        lead_id = excluded.lead_id,
                        synced_at = excluded.synced_at
                    "#,
                )
                .bind(&component.id)
                .bind(project_id)
                .bind(&component.name)
                .bind(&component.description)
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
