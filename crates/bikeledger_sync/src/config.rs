//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default GitHub REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Where the remote files live: a repository, a branch and a folder in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to read and write.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Folder inside the repository; empty for the root.
    #[serde(default)]
    pub base_path: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RemoteLocation {
    /// Creates a location on branch `main` at the repository root.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: default_branch(),
            base_path: String::new(),
        }
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the folder.
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Whether owner and repository are filled in.
    pub fn is_complete(&self) -> bool {
        !self.owner.trim().is_empty() && !self.repo.trim().is_empty()
    }

    /// Repository path of `file`: the base path without surrounding slashes,
    /// joined with the file name.
    pub fn file_path(&self, file: &str) -> String {
        let base = self.base_path.trim_matches('/');
        if base.is_empty() {
            file.to_string()
        } else {
            format!("{base}/{file}")
        }
    }
}

/// An access token. Wiped from memory on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads a token from an environment variable; blank counts as unset.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(|token| Self(token.trim().to_string()))
    }

    /// The raw token, for the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Retry behaviour after a failed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Fixed delay before the retry.
    pub delay: Duration,
    /// Automatic retries in a row before giving up and raising the banner.
    pub max_consecutive_retries: u32,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(delay: Duration, max_consecutive_retries: u32) -> Self {
        Self {
            delay,
            max_consecutive_retries,
        }
    }

    /// Never retry automatically.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Sets the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the retry cap.
    pub fn with_max_consecutive_retries(mut self, max: u32) -> Self {
        self.max_consecutive_retries = max;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 3)
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote location, if known up front.
    pub location: Option<RemoteLocation>,
    /// REST API base URL.
    pub api_base: String,
    /// Quiet period after the last data change before an automatic sync.
    pub debounce: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// HTTP request timeout.
    pub http_timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
    /// Commit message for pushes.
    pub commit_message: String,
    /// Capacity of the trigger queue.
    pub trigger_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            location: None,
            api_base: DEFAULT_API_BASE.to_string(),
            debounce: Duration::from_secs(5),
            retry: RetryConfig::default(),
            http_timeout: Duration::from_secs(30),
            user_agent: format!("bikeledger/{}", env!("CARGO_PKG_VERSION")),
            commit_message: "Sync from BikeLedger".to_string(),
            trigger_capacity: 64,
        }
    }

    /// Sets the remote location.
    pub fn with_location(mut self, location: RemoteLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the `User-Agent`.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the commit message.
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
