use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Directory that marks a drafts workspace, like `.git`.
pub const WORKSPACE_DIR: &str = ".konnekt";
pub const DRAFTS_DB: &str = "drafts.db";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    /// Session token of the signed-in citizen, if any.
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(
        url: Option<String>,
        api_key: Option<String>,
        access_token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let url = url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingUrl)?;

        Ok(Self {
            url,
            api_key: api_key.unwrap_or_default(),
            access_token: access_token.filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }
}

/// Walk up from `start` looking for a drafts workspace. The search never
/// goes above `ceiling` when one is given.
pub fn find_workspace_within(start: &Path, ceiling: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(WORKSPACE_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if ceiling == Some(current.as_path()) || !current.pop() {
            return Err(ConfigError::NotAWorkspace(start.to_path_buf()));
        }
    }
}

pub fn find_workspace_from(start: &Path) -> Result<PathBuf, ConfigError> {
    find_workspace_within(start, None)
}

pub fn find_workspace() -> Result<PathBuf, ConfigError> {
    find_workspace_from(&env::current_dir()?)
}

pub fn drafts_db_path(workspace: &Path) -> PathBuf {
    workspace.join(DRAFTS_DB)
}
