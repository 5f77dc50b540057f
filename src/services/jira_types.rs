//! Serde-deserializable shapes of Jira records.
//!
//! Raw pages arrive as `serde_json::Value`; adapters project each record
//! into one of these before mapping it onto local columns.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;

/// Key under which parent-scoped pagers attach the parent's key.
pub const PARENT_KEY_FIELD: &str = "__parent";

/// Project a raw record into a typed shape.
pub fn from_record<T: DeserializeOwned>(record: Value, what: &str) -> Result<T, AppError> {
    serde_json::from_value(record)
        .map_err(|e| AppError::internal(format!("Malformed {} record: {}", what, e)))
}

// ============================================================================
// Users
// ============================================================================

/// A user reference or full user record.
///
/// Cloud identifies users by `accountId`; Server/Data Center by `key` and
/// `name`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
    pub account_id: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub time_zone: Option<String>,
}

impl ApiUser {
    /// Stable external identifier.
    pub fn external_key(&self) -> Option<&str> {
        self.account_id
            .as_deref()
            .or(self.key.as_deref())
            .or(self.name.as_deref())
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Projects and components
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub project_type_key: Option<String>,
    pub lead: Option<ApiUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiComponent {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<ApiUser>,
    /// Present on most Jira versions; the pager's parent tag is the fallback.
    pub project: Option<String>,
    #[serde(rename = "__parent")]
    pub parent_project: Option<String>,
}

impl ApiComponent {
    pub fn project_key(&self) -> Option<&str> {
        self.project.as_deref().or(self.parent_project.as_deref())
    }
}

// ============================================================================
// Flat reference data: statuses, priorities, issue types, resolutions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiNamedItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// `{ "id": ... }` / `{ "key": ... }` reference embedded in an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRef {
    pub id: Option<String>,
    pub key: Option<String>,
}

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssue {
    pub id: String,
    pub key: String,
    pub fields: ApiIssueFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssueFields {
    #[serde(default)]
    pub summary: String,
    pub project: Option<ApiRef>,
    pub status: Option<ApiRef>,
    pub priority: Option<ApiRef>,
    #[serde(rename = "issuetype")]
    pub issue_type: Option<ApiRef>,
    pub resolution: Option<ApiRef>,
    pub assignee: Option<ApiUser>,
    pub reporter: Option<ApiUser>,
    pub creator: Option<ApiUser>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<ApiRef>,
    pub created: String,
    pub updated: String,
    #[serde(rename = "resolutiondate")]
    pub resolution_date: Option<String>,
    #[serde(rename = "duedate")]
    pub due_date: Option<String>,
    #[serde(rename = "timeoriginalestimate")]
    pub original_estimate: Option<i64>,
    #[serde(rename = "timespent")]
    pub time_spent: Option<i64>,
    pub parent: Option<ApiRef>,
}

// ============================================================================
// Child collections
// ============================================================================

/// One changelog entry; each item is one changed field.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiHistory {
    pub id: String,
    pub author: Option<ApiUser>,
    pub created: String,
    #[serde(default)]
    pub items: Vec<ApiHistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHistoryItem {
    pub field: String,
    #[serde(rename = "fieldtype")]
    pub field_type: Option<String>,
    pub from: Option<String>,
    pub from_string: Option<String>,
    pub to: Option<String>,
    pub to_string: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWorklog {
    pub id: String,
    pub author: Option<ApiUser>,
    pub started: String,
    #[serde(default)]
    pub time_spent_seconds: i64,
    pub comment: Option<Value>,
    pub updated: Option<String>,
}

impl ApiWorklog {
    /// Plain-text comment. Cloud may send an ADF document; only its text
    /// nodes are kept.
    pub fn comment_text(&self) -> Option<String> {
        match self.comment.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            adf => {
                let mut text = String::new();
                collect_adf_text(adf, &mut text);
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

fn collect_adf_text(node: &Value, output: &mut String) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        output.push_str(text);
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_adf_text(child, output);
        }
        if node.get("type").and_then(Value::as_str) == Some("paragraph") {
            output.push('\n');
        }
    }
}
