use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR_NAME: &str = "blogdesk";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Blog API root, e.g. `http://localhost:8080/api`
    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Period of the new-post autosave timer
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,

    /// Length of the summary derived from post content
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,

    /// SQLite file that holds the new-post draft
    #[serde(default = "default_draft_db_path")]
    pub draft_db_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            autosave_interval_secs: default_autosave_interval(),
            summary_chars: default_summary_chars(),
            draft_db_path: default_draft_db_path(),
        }
    }
}

impl ClientConfig {
    /// Reads the config file from the user config directory when it exists,
    /// then applies `BLOGDESK_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());

        if let Some(url) = non_empty("BLOGDESK_API_URL") {
            self.api_base_url = url;
        }
        if let Some(token) = non_empty("BLOGDESK_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(path) = non_empty("BLOGDESK_DRAFT_DB") {
            self.draft_db_path = PathBuf::from(path);
        }
        if let Some(secs) = non_empty("BLOGDESK_AUTOSAVE_SECS").and_then(|raw| raw.parse().ok()) {
            self.autosave_interval_secs = secs;
        }
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.toml"))
}

fn default_api_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_autosave_interval() -> u64 {
    30
}

fn default_summary_chars() -> usize {
    200
}

fn default_draft_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("drafts.db")
}
