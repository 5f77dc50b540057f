//! Users: flat upsert keyed by account id (Cloud) or user key (Server).

use async_trait::async_trait;
use futures::TryStreamExt;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::jira_types::{from_record, ApiUser};
use crate::services::remote::Endpoint;
use crate::timestamps::now;

/// Jira's user listing has no change filter and no total, so every run
/// walks it twice: once in `count` and again in `run`.
pub struct UsersAdapter;

#[async_trait]
impl CollectionSyncAdapter for UsersAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Users
    }

    async fn count(&self, ctx: &SyncContext, _since: Option<i64>) -> Result<u64, AppError> {
        ctx.pages().count(&Endpoint::Users).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        _since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let mut tally = ProgressTally::new(progress);
        let mut pages = Box::pin(ctx.pages().pages(Endpoint::Users).into_stream());

        while let Some(page) = pages.try_next().await? {
            let count = page.len() as u64;
            let mut tx = ctx.pool.begin().await?;
            for record in page {
                let user: ApiUser = from_record(record, "user")?;
                let Some(key) = user.external_key() else {
                    log::debug!("Skipping user without an identifier: {}", user.display_name);
                    continue;
                };

                sqlx::query(
                    r#"
                    INSERT INTO users (jira_key, name, email, display_name, active, time_zone, synced_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(jira_key) DO UPDATE SET
                        name = excluded.name,
                        email = excluded.email,
                        display_name = excluded.display_name,
                        active = excluded.active,
                        time_zone = excluded.time_zone,
                        synced_at = excluded.synced_at
                    "#,
                )
                .bind(key)
                .bind(&user.name)
                .bind(&user.email_address)
                .bind(&user.display_name)
                .bind(user.active)
                .bind(&user.time_zone)
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
