//! Remote file store abstraction and an in-memory implementation.

use crate::config::Credential;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque remote revision id of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// UTF-8 content.
    pub content: String,
    /// Revision the content belongs to.
    pub token: VersionToken,
}

/// A versioned remote file store.
///
/// Implementations are shared between concurrently running file pipelines.
pub trait RemoteStore: Send + Sync {
    /// Whether a location and a credential are known.
    fn is_configured(&self) -> bool;

    /// Replaces the credential used for later requests.
    fn set_credential(&self, credential: Option<Credential>);

    /// Fetches `name`. `Ok(None)` means the file was never written.
    fn fetch_file(
        &self,
        name: &str,
    ) -> impl Future<Output = SyncResult<Option<RemoteFile>>> + Send;

    /// Writes `name`, expecting the remote revision to be `expected`
    /// (`None` when creating). Returns the new token, or
    /// [`SyncError::Conflict`] when `expected` is stale.
    fn push_file(
        &self,
        name: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> impl Future<Output = SyncResult<VersionToken>> + Send;
}

/// Token a [`MemoryRemote`] gives to `content`: hex SHA-256, 40 characters,
/// shaped like a git blob id.
pub fn content_token(content: &str) -> VersionToken {
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    VersionToken(hex[..40].to_string())
}

/// A failure a [`MemoryRemote`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// HTTP 401.
    Auth,
    /// HTTP 403.
    Permission,
    /// Connection failure.
    Network,
    /// Any other status.
    Server(u16),
}

impl Fault {
    fn to_error(self, file: &str) -> SyncError {
        match self {
            Self::Auth => SyncError::Auth("bad credentials".into()),
            Self::Permission => SyncError::Permission(format!("no write access to {file}")),
            Self::Network => SyncError::Network(format!("connection reset while reading {file}")),
            Self::Server(status) => SyncError::Server {
                status,
                message: "injected".into(),
            },
        }
    }
}

/// An in-memory remote with version tokens, for tests and offline demos.
///
/// Besides the plain store it can simulate another device writing between
/// our fetch and push, forced conflicts and per-file failures.
#[derive(Debug)]
pub struct MemoryRemote {
    configured: AtomicBool,
    files: Mutex<BTreeMap<String, RemoteFile>>,
    fault: Mutex<Option<Fault>>,
    file_faults: Mutex<HashMap<String, Fault>>,
    concurrent_writes: Mutex<HashMap<String, String>>,
    forced_conflicts: Mutex<HashMap<String, u32>>,
    fetches: Mutex<HashMap<String, u32>>,
    push_attempts: Mutex<HashMap<String, u32>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Creates an empty, configured remote.
    pub fn new() -> Self {
        Self {
            configured: AtomicBool::new(true),
            files: Mutex::new(BTreeMap::new()),
            fault: Mutex::new(None),
            file_faults: Mutex::new(HashMap::new()),
            concurrent_writes: Mutex::new(HashMap::new()),
            forced_conflicts: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
            push_attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Writes `content` directly, as another device would. Returns the token.
    pub fn put(&self, name: &str, content: impl Into<String>) -> VersionToken {
        let content = content.into();
        let token = content_token(&content);
        self.files.lock().insert(
            name.to_string(),
            RemoteFile {
                content,
                token: token.clone(),
            },
        );
        token
    }

    /// Current file, bypassing fault injection.
    pub fn file(&self, name: &str) -> Option<RemoteFile> {
        self.files.lock().get(name).cloned()
    }

    /// Current content of `name`.
    pub fn content(&self, name: &str) -> Option<String> {
        self.file(name).map(|f| f.content)
    }

    /// Current token of `name`.
    pub fn token(&self, name: &str) -> Option<VersionToken> {
        self.file(name).map(|f| f.token)
    }

    /// Marks the remote configured or not.
    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::SeqCst);
    }

    /// Makes every request fail with `fault` until cleared with `None`.
    pub fn set_fault(&self, fault: Option<Fault>) {
        *self.fault.lock() = fault;
    }

    /// Makes requests for `name` fail with `fault` until cleared.
    pub fn fail_file(&self, name: &str, fault: Fault) {
        self.file_faults.lock().insert(name.to_string(), fault);
    }

    /// Clears a per-file fault.
    pub fn clear_file_fault(&self, name: &str) {
        self.file_faults.lock().remove(name);
    }

    /// Schedules `content` to be written by "another device" right before the
    /// next push to `name`, so that push sees a stale token.
    pub fn write_before_next_push(&self, name: &str, content: impl Into<String>) {
        self.concurrent_writes
            .lock()
            .insert(name.to_string(), content.into());
    }

    /// Rejects the next `times` pushes to `name` with a conflict.
    pub fn force_conflicts(&self, name: &str, times: u32) {
        self.forced_conflicts.lock().insert(name.to_string(), times);
    }

    /// Number of fetches of `name`.
    pub fn fetch_count(&self, name: &str) -> u32 {
        self.fetches.lock().get(name).copied().unwrap_or(0)
    }

    /// Number of push attempts on `name`, rejected ones included.
    pub fn push_count(&self, name: &str) -> u32 {
        self.push_attempts.lock().get(name).copied().unwrap_or(0)
    }

    /// Push attempts over all files.
    pub fn total_pushes(&self) -> u32 {
        self.push_attempts.lock().values().sum()
    }

    fn check_fault(&self, name: &str) -> SyncResult<()> {
        if let Some(fault) = *self.fault.lock() {
            return Err(fault.to_error(name));
        }
        if let Some(fault) = self.file_faults.lock().get(name).copied() {
            return Err(fault.to_error(name));
        }
        Ok(())
    }

    fn try_push(
        &self,
        name: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> SyncResult<VersionToken> {
        *self.push_attempts.lock().entry(name.to_string()).or_insert(0) += 1;
        self.check_fault(name)?;

        if let Some(other) = self.concurrent_writes.lock().remove(name) {
            self.put(name, other);
        }
        {
            let mut forced = self.forced_conflicts.lock();
            if let Some(left) = forced.get_mut(name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(SyncError::Conflict {
                        file: name.to_string(),
                    });
                }
            }
        }

        let mut files = self.files.lock();
        let current = files.get(name).map(|f| &f.token);
        if current != expected {
            return Err(SyncError::Conflict {
                file: name.to_string(),
            });
        }
        let token = content_token(content);
        files.insert(
            name.to_string(),
            RemoteFile {
                content: content.to_string(),
                token: token.clone(),
            },
        );
        Ok(token)
    }
}

impl RemoteStore for MemoryRemote {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn set_credential(&self, credential: Option<Credential>) {
        self.set_configured(credential.is_some());
    }

    async fn fetch_file(&self, name: &str) -> SyncResult<Option<RemoteFile>> {
        tokio::task::yield_now().await;
        *self.fetches.lock().entry(name.to_string()).or_insert(0) += 1;
        self.check_fault(name)?;
        Ok(self.file(name))
    }

    async fn push_file(
        &self,
        name: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> SyncResult<VersionToken> {
        tokio::task::yield_now().await;
        self.try_push(name, content, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_update() {
        let remote = MemoryRemote::new();
        assert!(remote.fetch_file("parts.json").await.unwrap().is_none());

        let v1 = remote.push_file("parts.json", "[]", None).await.unwrap();
        let fetched = remote.fetch_file("parts.json").await.unwrap().unwrap();
        assert_eq!(fetched.token, v1);
        assert_eq!(fetched.content, "[]");

        let v2 = remote
            .push_file("parts.json", "[{}]", Some(&v1))
            .await
            .unwrap();
        assert_ne!(v1, v2);
        assert_eq!(v2, content_token("[{}]"));
    }

    #[tokio::test]
    async fn stale_token_conflicts() {
        let remote = MemoryRemote::new();
        let v1 = remote.put("parts.json", "[]");
        remote.put("parts.json", "[1]");

        let err = remote
            .push_file("parts.json", "[2]", Some(&v1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict { .. }));

        let err = remote.push_file("parts.json", "[2]", None).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict { .. }));
        assert_eq!(remote.push_count("parts.json"), 2);
    }

    #[tokio::test]
    async fn write_before_next_push_makes_token_stale() {
        let remote = MemoryRemote::new();
        let v1 = remote.put("suppliers.json", "[]");
        remote.write_before_next_push("suppliers.json", "[\"other\"]");

        assert!(remote
            .push_file("suppliers.json", "[\"mine\"]", Some(&v1))
            .await
            .is_err());
        let v2 = remote.token("suppliers.json").unwrap();
        assert!(remote
            .push_file("suppliers.json", "[\"mine\"]", Some(&v2))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn injected_faults() {
        let remote = MemoryRemote::new();
        remote.set_fault(Some(Fault::Auth));
        assert!(remote.fetch_file("data.csv").await.unwrap_err().is_auth());

        remote.set_fault(None);
        remote.fail_file("data.csv", Fault::Network);
        assert!(remote.fetch_file("data.csv").await.unwrap_err().is_retryable());
        assert!(remote.fetch_file("parts.json").await.is_ok());
    }

    #[test]
    fn tokens_are_content_addressed() {
        assert_eq!(content_token("a"), content_token("a"));
        assert_ne!(content_token("a"), content_token("b"));
        assert_eq!(content_token("a").as_str().len(), 40);
    }
}
