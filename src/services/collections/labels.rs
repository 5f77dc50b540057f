//! Labels: derived from `issues.labels`, always rebuilt in full.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::derived::LabelRebuilder;

pub struct LabelsAdapter;

#[async_trait]
impl CollectionSyncAdapter for LabelsAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Labels
    }

    async fn count(&self, ctx: &SyncContext, _since: Option<i64>) -> Result<u64, AppError> {
        let labels = LabelRebuilder::new(&ctx.pool).distinct_labels().await?;
        Ok(labels.len() as u64)
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        _since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let stored = LabelRebuilder::new(&ctx.pool).rebuild().await?;
        let mut tally = ProgressTally::new(progress);
        tally.advance(stored).await?;
        tally.finish().await?;
        Ok(())
    }
}
