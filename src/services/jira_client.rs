//! Jira REST API v2 client.
//!
//! Provides the HTTP transport behind [`RemoteSource`]: authentication,
//! offset pagination parameters and error mapping.

use crate::error::AppError;
use crate::services::remote::{Endpoint, RemotePage, RemoteSource};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

/// Issue fields requested from the search endpoint.
pub const ISSUE_FIELDS: &str = "summary,project,status,priority,issuetype,resolution,\
assignee,reporter,creator,labels,components,created,updated,resolutiondate,duedate,\
timeoriginalestimate,timespent,parent";

/// Jira API client configuration.
#[derive(Debug, Clone)]
pub struct JiraClientConfig {
    /// Base URL of the Jira site (e.g., `https://example.atlassian.net`).
    pub base_url: String,

    /// Account email for Cloud basic auth. `None` sends the token as a
    /// bearer personal access token (Server/Data Center).
    pub email: Option<String>,

    /// API token or personal access token.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for JiraClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: None,
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Jira API client.
#[derive(Debug, Clone)]
pub struct JiraClient {
    client: Client,
    config: JiraClientConfig,
}

impl JiraClient {
    /// Create a new Jira client.
    pub fn new(config: JiraClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the full URL for a REST path.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/rest/api/2{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    /// Attach credentials to a request.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.email {
            Some(email) => request.basic_auth(email, Some(&self.config.token)),
            None => request.bearer_auth(&self.config.token),
        }
    }

    /// Handle API response errors.
    async fn handle_response(&self, response: Response, endpoint: &str) -> Result<Value, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::authentication(
                "Jira rejected the configured credentials",
            ));
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let body_message = extract_error_message(&body);

        let message = match (status, body_message) {
            (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg,
            (StatusCode::NOT_FOUND, None) => "Resource not found".to_string(),
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        Err(AppError::jira_api_full(message, status_code, endpoint))
    }

    /// GET a REST path with query parameters.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, AppError> {
        let url = self.api_url(path);
        let request = self.authorize(self.client.get(&url)).query(query);
        log::debug!("GET {} {:?}", path, query);

        let response = request.send().await?;
        self.handle_response(response, path).await
    }
}

#[async_trait]
impl RemoteSource for JiraClient {
    async fn fetch_page(
        &self,
        endpoint: &Endpoint,
        start_at: u64,
        max_results: u64,
    ) -> Result<RemotePage, AppError> {
        let paging = vec![
            ("startAt", start_at.to_string()),
            ("maxResults", max_results.to_string()),
        ];

        match endpoint {
            Endpoint::Users => {
                let body = self.get_json("/users/search", &paging).await?;
                Ok(RemotePage {
                    records: into_array(body, "users")?,
                    total: None,
                })
            }
            Endpoint::Search { jql } => {
                let mut query = paging;
                query.push(("jql", jql.clone()));
                query.push(("fields", ISSUE_FIELDS.to_string()));
                let body = self.get_json("/search", &query).await?;
                wrapped_page(body, "issues")
            }
            Endpoint::IssueChangelog { issue_key } => {
                let path = format!("/issue/{}/changelog", urlencoding::encode(issue_key));
                let body = self.get_json(&path, &paging).await?;
                wrapped_page(body, "values")
            }
            Endpoint::IssueWorklog { issue_key } => {
                let path = format!("/issue/{}/worklog", urlencoding::encode(issue_key));
                let body = self.get_json(&path, &paging).await?;
                wrapped_page(body, "worklogs")
            }
            unpaginated => {
                // These endpoints return everything in one response
                if start_at > 0 {
                    return Ok(RemotePage {
                        records: Vec::new(),
                        total: None,
                    });
                }
                let (path, query) = match unpaginated {
                    Endpoint::Projects => ("/project".to_string(), vec![("expand", "lead".to_string())]),
                    Endpoint::ProjectComponents { project_key } => (
                        format!("/project/{}/components", urlencoding::encode(project_key)),
                        Vec::new(),
                    ),
                    Endpoint::Statuses => ("/status".to_string(), Vec::new()),
                    Endpoint::Priorities => ("/priority".to_string(), Vec::new()),
                    Endpoint::IssueTypes => ("/issuetype".to_string(), Vec::new()),
                    Endpoint::Resolutions => ("/resolution".to_string(), Vec::new()),
                    other => {
                        return Err(AppError::internal(format!(
                            "No request mapping for {}",
                            other.describe()
                        )))
                    }
                };
                let body = self.get_json(&path, &query).await?;
                let records = into_array(body, &path)?;
                let total = records.len() as u64;
                Ok(RemotePage {
                    records,
                    total: Some(total),
                })
            }
        }
    }

    async fn fetch_total(&self, endpoint: &Endpoint) -> Result<Option<u64>, AppError> {
        if !endpoint.reports_total() {
            return Ok(None);
        }
        Ok(self.fetch_page(endpoint, 0, 1).await?.total)
    }
}

/// Unwrap a bare JSON array response.
fn into_array(body: Value, what: &str) -> Result<Vec<Value>, AppError> {
    match body {
        Value::Array(records) => Ok(records),
        other => Err(AppError::jira_api(format!(
            "Expected a list of {}, got {}",
            what,
            json_kind(&other)
        ))),
    }
}

/// Unwrap a `{ "total": n, "<field>": [...] }` response.
fn wrapped_page(mut body: Value, field: &str) -> Result<RemotePage, AppError> {
    let total = body.get("total").and_then(Value::as_u64);
    let records = match body.get_mut(field).map(Value::take) {
        Some(Value::Array(records)) => records,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(AppError::jira_api(format!(
                "Expected `{}` to be a list, got {}",
                field,
                json_kind(&other)
            )))
        }
    };

    Ok(RemotePage { records, total })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Jira reports errors as `{"errorMessages": [...], "errors": {field: msg}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let mut messages: Vec<String> = value
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    if let Some(errors) = value.get("errors").and_then(Value::as_object) {
        for (field, msg) in errors {
            if let Some(msg) = msg.as_str() {
                messages.push(format!("{}: {}", field, msg));
            }
        }
    }

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}
