//! Resumable child ingestion tests.
//!
//! Changelogs and worklogs are paged per issue. These tests verify that:
//! 1. Ingestion resumes from the stored offset instead of refetching
//! 2. An up-to-date issue is not fetched again
//! 3. A failure mid-issue rolls that issue back completely
//! 4. Pages delivered twice are stored once

mod common;

use common::*;
use jira_mirror::models::cache_state::{get_cache_state, CacheStatus, Operation, SyncMode};
use jira_mirror::models::CollectionType;
use jira_mirror::services::notifications::SyncPhase;
use jira_mirror::timestamps::now;
use serde_json::json;

async fn history_state(pool: &jira_mirror::db::pool::DbPool, key: &str) -> (Option<i64>, Option<i64>) {
    sqlx::query_as("SELECT history_count, history_synced_at FROM issues WHERE jira_key = ?")
        .bind(key)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn history_rows(pool: &jira_mirror::db::pool::DbPool, issue_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM issue_histories WHERE issue_id = ?")
        .bind(issue_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_resumes_from_stored_offset() {
    let (_dir, pool) = setup_db().await;
    let issue_id = insert_issue(&pool, "ABC-1", "[]", now() - 3600, Some(80)).await;

    let remote = FakeRemote::new();
    remote.set(changelog("ABC-1"), histories(100));
    let (orchestrator, mut rx) = orchestrator(&pool, &remote);

    let state = orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await
        .unwrap();

    assert_eq!(state.status_enum(), CacheStatus::Built);
    assert_eq!(remote.page_offsets_for(&changelog("ABC-1")), vec![80, 90]);
    assert_eq!(history_rows(&pool, issue_id).await, 20);

    let (count, synced_at) = history_state(&pool, "ABC-1").await;
    assert_eq!(count, Some(100));
    assert!(synced_at.unwrap() > now() - 60);

    // One tick per parent
    let progress: Vec<(i64, i64)> = drain(&mut rx)
        .iter()
        .filter(|e| e.phase == SyncPhase::Progress)
        .map(|e| e.progress())
        .collect();
    assert_eq!(progress, vec![(1, 1)]);

    // Nothing changed since: the incremental run skips the issue entirely
    remote.reset_requests();
    let state = orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(state.status_enum(), CacheStatus::Updated);
    assert_eq!(state.progress(Operation::Update), (0, 0));
    assert!(remote.page_requests().is_empty());
    assert_eq!(history_state(&pool, "ABC-1").await.0, Some(100));
}

#[tokio::test]
async fn test_issue_updated_after_sync_is_picked_up_again() {
    let (_dir, pool) = setup_db().await;
    insert_issue(&pool, "ABC-1", "[]", now() - 3600, None).await;

    let remote = FakeRemote::new();
    remote.set(changelog("ABC-1"), histories(5));
    let (orchestrator, _rx) = orchestrator(&pool, &remote);

    orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await
        .unwrap();

    // The issue moves on remotely: two more entries and a newer updated_at
    remote.set(changelog("ABC-1"), histories(7));
    sqlx::query("UPDATE issues SET updated_at = ? WHERE jira_key = 'ABC-1'")
        .bind(now() + 3600)
        .execute(&pool)
        .await
        .unwrap();
    remote.reset_requests();

    orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Incremental)
        .await
        .unwrap();

    assert_eq!(remote.page_offsets_for(&changelog("ABC-1")), vec![5]);
    assert_eq!(history_state(&pool, "ABC-1").await.0, Some(7));
}

#[tokio::test]
async fn test_redelivered_pages_do_not_duplicate_rows() {
    let (_dir, pool) = setup_db().await;
    let issue_id = insert_issue(&pool, "ABC-1", "[]", now() - 3600, None).await;

    let remote = FakeRemote::new();
    remote.set(changelog("ABC-1"), histories(15));
    let (orchestrator, _rx) = orchestrator(&pool, &remote);

    orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await
        .unwrap();
    assert_eq!(history_rows(&pool, issue_id).await, 15);

    // Lose the offset so every page is fetched and stored again
    sqlx::query("UPDATE issues SET history_count = NULL WHERE id = ?")
        .bind(issue_id)
        .execute(&pool)
        .await
        .unwrap();
    remote.reset_requests();

    orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await
        .unwrap();

    assert_eq!(remote.page_offsets_for(&changelog("ABC-1")), vec![0, 10]);
    assert_eq!(history_rows(&pool, issue_id).await, 15);
    assert_eq!(history_state(&pool, "ABC-1").await.0, Some(15));
}

#[tokio::test]
async fn test_failure_rolls_back_only_the_failing_issue() {
    let (_dir, pool) = setup_db().await;
    let first = insert_issue(&pool, "ABC-1", "[]", now() - 3600, None).await;
    let second = insert_issue(&pool, "ABC-2", "[]", now() - 3600, None).await;

    let remote = FakeRemote::new();
    remote.set(changelog("ABC-1"), histories(30));
    remote.set(changelog("ABC-2"), histories(25));
    remote.fail_from(changelog("ABC-2"), CHILD_PAGE_SIZE);
    let (orchestrator, _rx) = orchestrator(&pool, &remote);

    let result = orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await;
    assert!(result.is_err());

    // First issue committed, second rolled back including its first page
    assert_eq!(history_state(&pool, "ABC-1").await.0, Some(30));
    assert_eq!(history_rows(&pool, first).await, 30);
    assert_eq!(history_state(&pool, "ABC-2").await, (None, None));
    assert_eq!(history_rows(&pool, second).await, 0);

    let stuck = get_cache_state(&pool, CollectionType::IssueHistories)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stuck.status_enum(), CacheStatus::Building);
    assert_eq!(stuck.progress(Operation::Build), (1, 2));

    // Retry: the first issue's offset already equals its total
    remote.clear_failures();
    remote.reset_requests();
    let state = orchestrator
        .refresh(CollectionType::IssueHistories, SyncMode::Full)
        .await
        .unwrap();

    assert_eq!(state.status_enum(), CacheStatus::Built);
    assert!(remote.page_offsets_for(&changelog("ABC-1")).is_empty());
    assert_eq!(remote.page_offsets_for(&changelog("ABC-2")), vec![0, 10, 20]);
    assert_eq!(history_rows(&pool, second).await, 25);
}

#[tokio::test]
async fn test_worklogs_resolve_author_and_flatten_comment() {
    let (_dir, pool) = setup_db().await;
    sqlx::query("INSERT INTO users (jira_key, display_name, synced_at) VALUES ('acc-1', 'Alice', 0)")
        .execute(&pool)
        .await
        .unwrap();
    let issue_id = insert_issue(&pool, "ABC-1", "[]", now() - 3600, None).await;

    let remote = FakeRemote::new();
    remote.set(
        worklog("ABC-1"),
        vec![json!({
            "id": "9001",
            "author": {"accountId": "acc-1"},
            "started": "2024-01-15T09:00:00.000+0000",
            "timeSpentSeconds": 1800,
            "comment": {
                "type": "doc",
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": "review"}]}]
            }
        })],
    );
    let (orchestrator, _rx) = orchestrator(&pool, &remote);

    orchestrator
        .refresh(CollectionType::Worklogs, SyncMode::Full)
        .await
        .unwrap();

    let (stored_issue, author_id, spent, comment): (i64, Option<i64>, i64, Option<String>) =
        sqlx::query_as(
            "SELECT issue_id, author_id, time_spent_secs, comment FROM worklogs WHERE jira_id = '9001'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(stored_issue, issue_id);
    assert!(author_id.is_some());
    assert_eq!(spent, 1800);
    assert_eq!(comment.as_deref(), Some("review\n"));

    let worklog_count: Option<i64> =
        sqlx::query_scalar("SELECT worklog_count FROM issues WHERE id = ?")
            .bind(issue_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(worklog_count, Some(1));
}
