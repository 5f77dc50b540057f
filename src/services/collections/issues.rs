//! Issues: the central collection. Every reference is resolved against the
//! collections synced before it; the child offsets are left untouched.

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::error::AppError;
use crate::models::CollectionType;
use crate::services::adapter::{CollectionSyncAdapter, ProgressReporter, ProgressTally, SyncContext};
use crate::services::jira_types::{from_record, ApiIssue, ApiRef, ApiUser};
use crate::services::remote::Endpoint;
use crate::timestamps::{jql_since, now, parse_jira_date, parse_jira_timestamp};

pub struct IssuesAdapter;

/// Search query for a run: the configured base JQL, narrowed to issues
/// updated since the watermark as seen from `now`.
pub fn search_jql(base: Option<&str>, since: Option<i64>, now: i64) -> String {
    let mut clauses = Vec::new();
    if let Some(base) = base.map(str::trim).filter(|b| !b.is_empty()) {
        clauses.push(format!("({})", base));
    }
    if let Some(since) = since {
        clauses.push(format!("updated >= {}", jql_since(since, now)));
    }

    let mut jql = clauses.join(" AND ");
    if !jql.is_empty() {
        jql.push(' ');
    }
    jql.push_str("ORDER BY updated ASC");
    jql
}

fn search(ctx: &SyncContext, since: Option<i64>) -> Endpoint {
    Endpoint::Search {
        jql: search_jql(ctx.settings.jql.as_deref(), since, now()),
    }
}

/// Resolved foreign keys of one issue.
struct IssueRefs {
    project_id: Option<i64>,
    status_id: Option<i64>,
    priority_id: Option<i64>,
    issue_type_id: Option<i64>,
    resolution_id: Option<i64>,
    assignee_id: Option<i64>,
    reporter_id: Option<i64>,
    creator_id: Option<i64>,
    component_ids: Vec<i64>,
}

async fn resolve_ref(
    ctx: &SyncContext,
    collection_type: CollectionType,
    reference: Option<&ApiRef>,
) -> Result<Option<i64>, AppError> {
    let id = reference.and_then(|r| r.id.as_deref());
    ctx.resolve_id(collection_type, id, None).await
}

async fn resolve_user(ctx: &SyncContext, user: Option<&ApiUser>) -> Result<Option<i64>, AppError> {
    let key = user.and_then(ApiUser::external_key);
    ctx.resolve_id(CollectionType::Users, key, None).await
}

async fn resolve_refs(ctx: &SyncContext, issue: &ApiIssue) -> Result<IssueRefs, AppError> {
    let fields = &issue.fields;

    // Projects are keyed by their key; fall back to the numeric id
    let project = fields.project.as_ref();
    let project_id = match ctx
        .resolve_id(CollectionType::Projects, project.and_then(|p| p.key.as_deref()), None)
        .await?
    {
        Some(id) => Some(id),
        None => {
            ctx.resolve_id(
                CollectionType::Projects,
                project.and_then(|p| p.id.as_deref()),
                Some("jira_id"),
            )
            .await?
        }
    };

    let mut component_ids = Vec::new();
    for component in &fields.components {
        if let Some(id) = resolve_ref(ctx, CollectionType::Components, Some(component)).await? {
            component_ids.push(id);
        }
    }

    Ok(IssueRefs {
        project_id,
        status_id: resolve_ref(ctx, CollectionType::Statuses, fields.status.as_ref()).await?,
        priority_id: resolve_ref(ctx, CollectionType::Priorities, fields.priority.as_ref()).await?,
        issue_type_id: resolve_ref(ctx, CollectionType::IssueTypes, fields.issue_type.as_ref())
            .await?,
        resolution_id: resolve_ref(ctx, CollectionType::Resolutions, fields.resolution.as_ref())
            .await?,
        assignee_id: resolve_user(ctx, fields.assignee.as_ref()).await?,
        reporter_id: resolve_user(ctx, fields.reporter.as_ref()).await?,
        creator_id: resolve_user(ctx, fields.creator.as_ref()).await?,
        component_ids,
    })
}

/// Upsert one issue and replace its component links. Returns the local id.
async fn upsert_issue(
    conn: &mut SqliteConnection,
    issue: &ApiIssue,
    refs: &IssueRefs,
) -> Result<i64, AppError> {
    let fields = &issue.fields;
    let created_at = parse_jira_timestamp(&fields.created).unwrap_or(0);
    let updated_at = parse_jira_timestamp(&fields.updated).unwrap_or(created_at);
    let resolved_at = fields.resolution_date.as_deref().and_then(parse_jira_timestamp);
    let due_date = fields
        .due_date
        .as_deref()
        .filter(|d| parse_jira_date(d).is_some());
    let labels_json = serde_json::to_string(&fields.labels)?;
    let parent_key = fields.parent.as_ref().and_then(|p| p.key.as_deref());

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO issues (
            jira_key, jira_id, project_id, status_id, priority_id, issue_type_id,
            resolution_id, assignee_id, reporter_id, creator_id, parent_key, summary,
            labels, created_at, updated_at, resolved_at, due_date,
            original_estimate_secs, time_spent_secs, synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(jira_key) DO UPDATE SET
            jira_id = excluded.jira_id,
            project_id = excluded.project_id,
            status_id = excluded.status_id,
            priority_id = excluded.priority_id,
            issue_type_id = excluded.issue_type_id,
            resolution_id = excluded.resolution_id,
            assignee_id = excluded.assignee_id,
            reporter_id = excluded.reporter_id,
            creator_id = excluded.creator_id,
            parent_key = excluded.parent_key,
            summary = excluded.summary,
            labels = excluded.labels,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            resolved_at = excluded.resolved_at,
            due_date = excluded.due_date,
            original_estimate_secs = excluded.original_estimate_secs,
            time_spent_secs = excluded.time_spent_secs,
            synced_at = excluded.synced_at
        RETURNING id
        "#,
    )
    .bind(&issue.key)
    .bind(&issue.id)
    .bind(refs.project_id)
    .bind(refs.status_id)
    .bind(refs.priority_id)
    .bind(refs.issue_type_id)
    .bind(refs.resolution_id)
    .bind(refs.assignee_id)
    .bind(refs.reporter_id)
    .bind(refs.creator_id)
    .bind(parent_key)
    .bind(&fields.summary)
    .bind(&labels_json)
    .bind(created_at)
    .bind(updated_at)
    .bind(resolved_at)
    .bind(due_date)
    .bind(fields.original_estimate)
    .bind(fields.time_spent)
    .bind(now())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM issue_components WHERE issue_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for component_id in refs.component_ids.iter().copied() {
        sqlx::query(
            "INSERT OR IGNORE INTO issue_components (issue_id, component_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(component_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

#[async_trait]
impl CollectionSyncAdapter for IssuesAdapter {
    fn collection_type(&self) -> CollectionType {
        CollectionType::Issues
    }

    async fn count(&self, ctx: &SyncContext, since: Option<i64>) -> Result<u64, AppError> {
        ctx.pages().count(&search(ctx, since)).await
    }

    async fn run(
        &self,
        ctx: &SyncContext,
        since: Option<i64>,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), AppError> {
        let mut tally = ProgressTally::new(progress);
        let mut pager = ctx.pages().pages(search(ctx, since));

        while let Some(page) = pager.next_page().await? {
            let count = page.len() as u64;

            // Resolve before opening the write transaction
            let mut resolved = Vec::with_capacity(page.len());
            for record in page {
                let issue: ApiIssue = from_record(record, "issue")?;
                let refs = resolve_refs(ctx, &issue).await?;
                resolved.push((issue, refs));
            }

            let mut tx = ctx.pool.begin().await?;
            for (issue, refs) in &resolved {
                upsert_issue(&mut *tx, issue, refs).await?;
            }
            tx.commit().await?;
            tally.advance(count).await?;
        }

        tally.finish().await?;
        Ok(())
    }
}
