//! Tables recomputed from a denormalized column of another table.
//!
//! Labels only exist as a JSON array on each issue. The `labels`
//! vocabulary and the `issue_labels` join are rebuilt from scratch on every
//! run inside a single transaction.

use std::collections::BTreeSet;

use crate::db::pool::DbPool;
use crate::error::AppError;

/// Rebuilds `labels` and `issue_labels` from `issues.labels`.
pub struct LabelRebuilder<'a> {
    pool: &'a DbPool,
}

impl<'a> LabelRebuilder<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Distinct labels across every issue, sorted.
    pub async fn distinct_labels(&self) -> Result<BTreeSet<String>, AppError> {
        let rows = sqlx::query_scalar::<_, String>("SELECT labels FROM issues")
            .fetch_all(self.pool)
            .await?;

        let mut labels = BTreeSet::new();
        for raw in rows {
            let parsed: Vec<String> = serde_json::from_str(&raw)?;
            labels.extend(parsed.into_iter().filter(|l| !l.is_empty()));
        }
        Ok(labels)
    }

    /// Replace the label vocabulary and join table. Returns the number of
    /// distinct labels stored.
    pub async fn rebuild(&self) -> Result<u64, AppError> {
        let labels = self.distinct_labels().await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM issue_labels").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM labels").execute(&mut *tx).await?;

        for label in &labels {
            sqlx::query("INSERT INTO labels (name) VALUES (?)")
                .bind(label)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO issue_labels (issue_id, label_id)
            SELECT issues.id, labels.id
            FROM issues, json_each(issues.labels) AS issue_label
            JOIN labels ON labels.name = issue_label.value
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        log::debug!("Rebuilt {} label(s)", labels.len());
        Ok(labels.len() as u64)
    }
}
