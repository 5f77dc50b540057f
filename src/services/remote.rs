//! Boundary to the remote issue tracker.
//!
//! Adapters never talk HTTP directly: they ask a [`RemoteSource`] for one
//! page of raw records of an [`Endpoint`]. The Jira client implements it for
//! real runs; tests plug in an in-memory source.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

/// A remote collection, optionally scoped to a parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Users,
    Projects,
    ProjectComponents { project_key: String },
    Statuses,
    Priorities,
    IssueTypes,
    Resolutions,
    Search { jql: String },
    IssueChangelog { issue_key: String },
    IssueWorklog { issue_key: String },
}

impl Endpoint {
    /// Short name for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Users => "users".to_string(),
            Self::Projects => "projects".to_string(),
            Self::ProjectComponents { project_key } => format!("components of {}", project_key),
            Self::Statuses => "statuses".to_string(),
            Self::Priorities => "priorities".to_string(),
            Self::IssueTypes => "issue types".to_string(),
            Self::Resolutions => "resolutions".to_string(),
            Self::Search { jql } => format!("issues matching `{}`", jql),
            Self::IssueChangelog { issue_key } => format!("changelog of {}", issue_key),
            Self::IssueWorklog { issue_key } => format!("worklogs of {}", issue_key),
        }
    }

    /// Whether responses carry a total. The user listing never does, so
    /// counting it means walking every page.
    pub fn reports_total(&self) -> bool {
        !matches!(self, Self::Users)
    }
}

/// One page of raw records.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    /// Raw records, in remote order.
    pub records: Vec<Value>,

    /// Total number of records in the collection, when the endpoint
    /// reports one.
    pub total: Option<u64>,
}

/// A paginated remote collection provider.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch up to `max_results` records starting at `start_at`.
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        start_at: u64,
        max_results: u64,
    ) -> Result<RemotePage, AppError>;

    /// Total record count reported for an endpoint, if it reports one.
    async fn fetch_total(&self, endpoint: &Endpoint) -> Result<Option<u64>, AppError> {
        Ok(self.fetch_page(endpoint, 0, 1).await?.total)
    }
}
