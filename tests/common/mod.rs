//! Shared fixtures for the integration tests: a temp database, an
//! in-memory remote and an orchestrator wired to a channel sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc::UnboundedReceiver;

use jira_mirror::db;
use jira_mirror::db::pool::DbPool;
use jira_mirror::error::AppError;
use jira_mirror::services::{
    CacheStateEvent, ChannelSink, Endpoint, RemotePage, RemoteSource, SyncOrchestrator,
    SyncSettings,
};

pub const PAGE_SIZE: u64 = 50;
pub const CHILD_PAGE_SIZE: u64 = 10;

/// In-memory Jira. Every search query is served from one issue list.
#[derive(Default)]
pub struct FakeRemote {
    data: Mutex<HashMap<Endpoint, Vec<Value>>>,
    failures: Mutex<HashMap<Endpoint, u64>>,
    page_requests: Mutex<Vec<(Endpoint, u64)>>,
}

fn normalize(endpoint: &Endpoint) -> Endpoint {
    match endpoint {
        Endpoint::Search { .. } => Endpoint::Search { jql: String::new() },
        other => other.clone(),
    }
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, endpoint: Endpoint, records: Vec<Value>) {
        self.data.lock().unwrap().insert(normalize(&endpoint), records);
    }

    /// Fail every page request for `endpoint` starting at or after `start_at`.
    pub fn fail_from(&self, endpoint: Endpoint, start_at: u64) {
        self.failures.lock().unwrap().insert(normalize(&endpoint), start_at);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// `(endpoint, start_at)` of every page fetched, excluding total lookups.
    pub fn page_requests(&self) -> Vec<(Endpoint, u64)> {
        self.page_requests.lock().unwrap().clone()
    }

    pub fn page_offsets_for(&self, endpoint: &Endpoint) -> Vec<u64> {
        self.page_requests()
            .into_iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, start_at)| start_at)
            .collect()
    }

    pub fn reset_requests(&self) {
        self.page_requests.lock().unwrap().clear();
    }

    fn records(&self, endpoint: &Endpoint) -> Vec<Value> {
        self.data
            .lock()
            .unwrap()
            .get(&normalize(endpoint))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        start_at: u64,
        max_results: u64,
    ) -> Result<RemotePage, AppError> {
        if let Some(fail_at) = self.failures.lock().unwrap().get(&normalize(endpoint)) {
            if start_at >= *fail_at {
                return Err(AppError::network(format!(
                    "connection reset fetching {}",
                    endpoint.describe()
                )));
            }
        }

        self.page_requests
            .lock()
            .unwrap()
            .push((endpoint.clone(), start_at));

        let all = self.records(endpoint);
        let records = all
            .iter()
            .skip(start_at as usize)
            .take(max_results as usize)
            .cloned()
            .collect();

        Ok(RemotePage {
            records,
            total: endpoint.reports_total().then_some(all.len() as u64),
        })
    }

    async fn fetch_total(&self, endpoint: &Endpoint) -> Result<Option<u64>, AppError> {
        Ok(endpoint.reports_total().then_some(self.records(endpoint).len() as u64))
    }
}

pub async fn setup_db() -> (TempDir, DbPool) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("mirror.db")).await.unwrap();
    (dir, pool)
}

pub fn orchestrator(
    pool: &DbPool,
    remote: &Arc<FakeRemote>,
) -> (SyncOrchestrator, UnboundedReceiver<CacheStateEvent>) {
    let (sink, rx) = ChannelSink::new();
    let remote: Arc<dyn RemoteSource> = remote.clone();
    let settings = SyncSettings {
        page_size: PAGE_SIZE,
        child_page_size: CHILD_PAGE_SIZE,
        jql: None,
    };
    (
        SyncOrchestrator::new(pool.clone(), remote, settings, Arc::new(sink)),
        rx,
    )
}

/// Every event published so far.
pub fn drain(rx: &mut UnboundedReceiver<CacheStateEvent>) -> Vec<CacheStateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn changelog(issue_key: &str) -> Endpoint {
    Endpoint::IssueChangelog {
        issue_key: issue_key.to_string(),
    }
}

pub fn worklog(issue_key: &str) -> Endpoint {
    Endpoint::IssueWorklog {
        issue_key: issue_key.to_string(),
    }
}

pub fn user_json(account_id: &str, name: &str) -> Value {
    json!({
        "accountId": account_id,
        "displayName": name,
        "emailAddress": format!("{}@example.com", name.to_lowercase()),
        "active": true
    })
}

pub fn project_json(id: &str, key: &str, lead: Option<&str>) -> Value {
    let mut project = json!({"id": id, "key": key, "name": format!("Project {}", key)});
    if let Some(lead) = lead {
        project["lead"] = json!({"accountId": lead, "displayName": lead});
    }
    project
}

pub fn issue_json(id: &str, key: &str, project_key: &str, labels: &[&str]) -> Value {
    json!({
        "id": id,
        "key": key,
        "fields": {
            "summary": format!("Summary of {}", key),
            "project": {"id": "100", "key": project_key},
            "status": {"id": "1", "name": "Open"},
            "assignee": {"accountId": "acc-1", "displayName": "Alice"},
            "labels": labels,
            "components": [{"id": "500", "name": "Backend"}],
            "created": "2024-01-15T10:30:00.000+0000",
            "updated": "2024-01-16T10:30:00.000+0000"
        }
    })
}

pub fn history_json(id: u64) -> Value {
    json!({
        "id": id.to_string(),
        "author": {"accountId": "acc-1", "displayName": "Alice"},
        "created": "2024-01-16T10:30:00.000+0000",
        "items": [{"field": "status", "fieldtype": "jira", "fromString": "Open", "toString": "Done"}]
    })
}

pub fn histories(n: u64) -> Vec<Value> {
    (1..=n).map(history_json).collect()
}

/// Insert an issue row directly, bypassing the issues adapter.
pub async fn insert_issue(
    pool: &DbPool,
    key: &str,
    labels: &str,
    updated_at: i64,
    history_count: Option<i64>,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO issues (jira_key, jira_id, summary, labels, created_at, updated_at, history_count, synced_at)
         VALUES (?, ?, 'seeded', ?, 0, ?, ?, 0) RETURNING id",
    )
    .bind(key)
    .bind(key)
    .bind(labels)
    .bind(updated_at)
    .bind(history_count)
    .fetch_one(pool)
    .await
    .unwrap()
}
