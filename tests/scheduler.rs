//! Background scheduler and refresh serialization tests.
//!
//! These tests verify that:
//! 1. The loop syncs on start and on `TriggerSync`
//! 2. `Rebuild` forgets the update side of one collection
//! 3. `Stop` ends the task and the handle fails afterwards
//! 4. Two refreshes of one collection never interleave

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use jira_mirror::models::cache_state::{CacheState, CacheStatus, SyncMode};
use jira_mirror::models::CollectionType;
use jira_mirror::services::notifications::SyncPhase;
use jira_mirror::services::scheduler::start_background;
use jira_mirror::services::{Endpoint, SyncOrchestrator};

const LONG_INTERVAL_SECS: u64 = 3600;

/// Poll until `collection_type` reaches `status`.
async fn wait_for_status(
    orchestrator: &SyncOrchestrator,
    collection_type: CollectionType,
    status: CacheStatus,
) -> CacheState {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let state = orchestrator.state(collection_type).await.unwrap();
            if state.status_enum() == status {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {:?}", collection_type, status))
}

#[tokio::test]
async fn test_trigger_and_rebuild_through_scheduler() {
    let (_dir, pool) = setup_db().await;
    let remote = FakeRemote::new();
    remote.set(Endpoint::Users, vec![user_json("acc-1", "Alice")]);
    remote.set(Endpoint::Projects, vec![project_json("100", "ABC", Some("acc-1"))]);
    let (orchestrator, _rx) = orchestrator(&pool, &remote);
    let orchestrator = Arc::new(orchestrator);

    let (handle, task) = start_background(orchestrator.clone(), LONG_INTERVAL_SECS);

    // The first tick fires immediately and builds everything
    wait_for_status(&orchestrator, CollectionType::Labels, CacheStatus::Built).await;
    let projects = orchestrator.state(CollectionType::Projects).await.unwrap();
    assert_eq!(projects.status_enum(), CacheStatus::Built);

    // A manual trigger runs incrementally from the new watermarks
    handle.trigger_sync().await.unwrap();
    wait_for_status(&orchestrator, CollectionType::Labels, CacheStatus::Updated).await;
    let projects = orchestrator.state(CollectionType::Projects).await.unwrap();
    assert_eq!(projects.status_enum(), CacheStatus::Updated);
    assert!(projects.update_completed_at.is_some());

    handle.rebuild(CollectionType::Projects).await.unwrap();
    let projects = wait_for_status(&orchestrator, CollectionType::Projects, CacheStatus::Built).await;
    assert!(projects.update_started_at.is_none());
    assert!(projects.update_completed_at.is_none());
    assert!(projects.build_completed_at.is_some());

    // Other collections keep their update side
    let users = orchestrator.state(CollectionType::Users).await.unwrap();
    assert_eq!(users.status_enum(), CacheStatus::Updated);

    handle.stop().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_handle_fails_after_stop() {
    let (_dir, pool) = setup_db().await;
    let remote = FakeRemote::new();
    let (orchestrator, _rx) = orchestrator(&pool, &remote);

    let (handle, task) = start_background(Arc::new(orchestrator), LONG_INTERVAL_SECS);
    let other = handle.clone();

    handle.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert!(other.trigger_sync().await.is_err());
    assert!(other.rebuild(CollectionType::Users).await.is_err());
}

#[tokio::test]
async fn test_same_collection_refreshes_do_not_interleave() {
    let (_dir, pool) = setup_db().await;
    let remote = FakeRemote::new();
    remote.set(
        Endpoint::Projects,
        vec![project_json("100", "ABC", None), project_json("200", "XYZ", None)],
    );
    let (orchestrator, mut rx) = orchestrator(&pool, &remote);

    let (first, second) = tokio::join!(
        orchestrator.refresh(CollectionType::Projects, SyncMode::Full),
        orchestrator.refresh(CollectionType::Projects, SyncMode::Full),
    );
    assert_eq!(first.unwrap().status_enum(), CacheStatus::Built);
    assert_eq!(second.unwrap().status_enum(), CacheStatus::Built);

    let phases: Vec<SyncPhase> = drain(&mut rx).iter().map(|e| e.phase).collect();
    assert_eq!(
        phases,
        vec![
            SyncPhase::Started,
            SyncPhase::Progress,
            SyncPhase::Completed,
            SyncPhase::Started,
            SyncPhase::Progress,
            SyncPhase::Completed,
        ]
    );
}
