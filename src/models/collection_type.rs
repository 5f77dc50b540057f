//! Synchronized collection types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

/// A category of mirrored data. Each type owns one `cache_states` row and
/// one sync adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Users,
    Projects,
    Components,
    Statuses,
    Priorities,
    IssueTypes,
    Resolutions,
    Issues,
    IssueHistories,
    Worklogs,
    Labels,
}

impl CollectionType {
    /// Every collection type, referenced types before the types that
    /// reference them.
    pub const SYNC_ORDER: [CollectionType; 11] = [
        Self::Users,
        Self::Projects,
        Self::Components,
        Self::Statuses,
        Self::Priorities,
        Self::IssueTypes,
        Self::Resolutions,
        Self::Issues,
        Self::IssueHistories,
        Self::Worklogs,
        Self::Labels,
    ];

    /// Stable identifier used in `cache_states.collection_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::Components => "components",
            Self::Statuses => "statuses",
            Self::Priorities => "priorities",
            Self::IssueTypes => "issue_types",
            Self::Resolutions => "resolutions",
            Self::Issues => "issues",
            Self::IssueHistories => "issue_histories",
            Self::Worklogs => "worklogs",
            Self::Labels => "labels",
        }
    }

    /// Local table holding this collection's rows.
    pub fn table(&self) -> &'static str {
        // Table names match the identifiers one to one
        self.as_str()
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::SYNC_ORDER
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                AppError::invalid_input_field(
                    format!("Unknown collection type: {}", s),
                    "collection_type",
                )
            })
    }
}
