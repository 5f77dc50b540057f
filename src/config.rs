//! YAML configuration.
//!
//! Search order:
//! 1. Explicit path if provided
//! 2. `./jira-mirror.yaml`
//! 3. `$XDG_CONFIG_HOME/jira-mirror/config.yaml`
//!
//! The API token never lives in the file; it is read from
//! `JIRA_MIRROR_TOKEN`, falling back to `JIRA_API_TOKEN`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::services::adapter::{SyncSettings, DEFAULT_CHILD_PAGE_SIZE, DEFAULT_PAGE_SIZE};
use crate::services::jira_client::JiraClientConfig;
use crate::services::scheduler::DEFAULT_SYNC_INTERVAL_SECS;

const APP_DIR: &str = "jira-mirror";
const LOCAL_CONFIG: &str = "jira-mirror.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub jira: JiraConfig,

    /// SQLite file; defaults to the platform data directory.
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
    pub url: String,

    /// Cloud account email. Without one the token is sent as a bearer
    /// personal access token.
    pub email: Option<String>,

    /// Base JQL limiting which issues are mirrored.
    pub jql: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u64,
    pub child_page_size: u64,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            child_page_size: DEFAULT_CHILD_PAGE_SIZE,
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from the first file found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, AppError> {
        let path = match explicit_path {
            Some(p) if p.exists() => p.to_path_buf(),
            Some(p) => {
                return Err(AppError::config(format!(
                    "Config file not found: {}",
                    p.display()
                )))
            }
            None => Self::find_config_file().ok_or_else(|| {
                AppError::config(format!(
                    "No configuration file found. Create ./{} or ~/.config/{}/config.yaml",
                    LOCAL_CONFIG, APP_DIR
                ))
            })?,
        };

        Self::load_from_path(&path)
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }

        let xdg_path = dirs::config_dir()?.join(APP_DIR).join("config.yaml");
        xdg_path.exists().then_some(xdg_path)
    }

    fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::parse(&contents)
            .map_err(|e| AppError::config(format!("{} ({})", e, path.display())))
    }

    /// Parse configuration from YAML text.
    pub fn parse(contents: &str) -> Result<Self, AppError> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| AppError::config(format!("Failed to parse config: {}", e)))?;

        if config.jira.url.trim().is_empty() {
            return Err(AppError::config("jira.url must not be empty"));
        }
        Ok(config)
    }

    /// Database file path, defaulting to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf, AppError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("mirror.db"))
            .ok_or_else(|| AppError::config("No data directory; set database_path"))
    }

    /// Get the Jira API token from environment variables.
    pub fn api_token() -> Result<String, AppError> {
        std::env::var("JIRA_MIRROR_TOKEN")
            .or_else(|_| std::env::var("JIRA_API_TOKEN"))
            .map_err(|_| {
                AppError::config(
                    "Jira API token not found. Set JIRA_MIRROR_TOKEN or JIRA_API_TOKEN.",
                )
            })
    }

    pub fn client_config(&self, token: String) -> JiraClientConfig {
        JiraClientConfig {
            base_url: self.jira.url.clone(),
            email: self.jira.email.clone(),
            token,
            timeout_secs: self.sync.timeout_secs,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            page_size: self.sync.page_size,
            child_page_size: self.sync.child_page_size,
            jql: self.jira.jql.clone(),
        }
    }
}
