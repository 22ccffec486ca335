//! GitHub contents API client.
//!
//! Each entity family is one file in a repository. Reads are
//! `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`; writes are a
//! `PUT` of the base64 content with the blob sha we last saw, which GitHub
//! uses as an optimistic concurrency token.

use crate::config::{Credential, RemoteLocation, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteFile, RemoteStore, VersionToken};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

/// [`RemoteStore`] over the GitHub contents API.
#[derive(Debug)]
pub struct GithubContents {
    http: Client,
    api_base: String,
    commit_message: String,
    location: RwLock<Option<RemoteLocation>>,
    credential: RwLock<Option<Credential>>,
}

impl GithubContents {
    /// Builds a client from `config`. The location comes from
    /// `config.location` and can be changed later.
    pub fn new(config: &SyncConfig, credential: Option<Credential>) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            commit_message: config.commit_message.clone(),
            location: RwLock::new(config.location.clone()),
            credential: RwLock::new(credential),
        })
    }

    /// Points the client at another repository or folder.
    pub fn set_location(&self, location: Option<RemoteLocation>) {
        *self.location.write() = location;
    }

    /// Current location.
    pub fn location(&self) -> Option<RemoteLocation> {
        self.location.read().clone()
    }

    fn target(&self, file: &str) -> SyncResult<(Url, String, Credential)> {
        let location = self
            .location
            .read()
            .clone()
            .filter(RemoteLocation::is_complete)
            .ok_or(SyncError::NotConfigured)?;
        let credential = self
            .credential
            .read()
            .clone()
            .ok_or(SyncError::NotConfigured)?;
        let url = contents_url(&self.api_base, &location, file)?;
        Ok((url, location.branch, credential))
    }

    async fn fetch_raw(&self, url: Url, credential: &Credential, file: &str) -> SyncResult<String> {
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.expose())
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body, file));
        }
        Ok(body)
    }
}

impl RemoteStore for GithubContents {
    fn is_configured(&self) -> bool {
        let located = self
            .location
            .read()
            .as_ref()
            .is_some_and(RemoteLocation::is_complete);
        located && self.credential.read().is_some()
    }

    fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.write() = credential;
    }

    async fn fetch_file(&self, name: &str) -> SyncResult<Option<RemoteFile>> {
        let (mut url, branch, credential) = self.target(name)?;
        url.query_pairs_mut().append_pair("ref", &branch);

        tracing::debug!(file = name, "fetching");
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        let body = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body, name));
        }

        let parsed: ContentsResponse = serde_json::from_str(&body)
            .map_err(|e| SyncError::parse(name, format!("unexpected contents response: {e}")))?;
        let content = if parsed.encoding == "base64" {
            decode_content(&parsed.content).map_err(|message| SyncError::parse(name, message))?
        } else {
            // Files over 1 MB come back without inline content.
            self.fetch_raw(url, &credential, name).await?
        };
        Ok(Some(RemoteFile {
            content,
            token: VersionToken::new(parsed.sha),
        }))
    }

    async fn push_file(
        &self,
        name: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> SyncResult<VersionToken> {
        let (url, branch, credential) = self.target(name)?;
        let mut body = json!({
            "message": self.commit_message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": branch,
        });
        if let Some(token) = expected {
            body["sha"] = Value::String(token.as_str().to_string());
        }

        tracing::debug!(file = name, bytes = content.len(), "pushing");
        let response = self
            .http
            .put(url)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text, name));
        }
        let parsed: PutResponse = serde_json::from_str(&text)
            .map_err(|e| SyncError::parse(name, format!("unexpected push response: {e}")))?;
        Ok(VersionToken::new(parsed.content.sha))
    }
}

/// Contents URL of `file`, every path segment percent-encoded.
pub fn contents_url(api_base: &str, location: &RemoteLocation, file: &str) -> SyncResult<Url> {
    let mut url = Url::parse(api_base).map_err(|_| SyncError::NotConfigured)?;
    let path = location.file_path(file);
    url.path_segments_mut()
        .map_err(|()| SyncError::NotConfigured)?
        .pop_if_empty()
        .extend(["repos", location.owner.as_str(), location.repo.as_str(), "contents"])
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

/// Maps a non-success status to an error. 404 here means the repository is
/// missing or hidden from this credential; a missing file is handled before.
pub fn classify_status(status: u16, body: &str, file: &str) -> SyncError {
    let message = api_message(body);
    match status {
        401 => SyncError::Auth(message),
        403 | 404 => SyncError::Permission(message),
        409 => SyncError::Conflict {
            file: file.to_string(),
        },
        422 if message.to_ascii_lowercase().contains("sha") => SyncError::Conflict {
            file: file.to_string(),
        },
        _ => SyncError::Server { status, message },
    }
}

/// Decodes inline base64 content, which GitHub wraps at 60 columns.
pub fn decode_content(encoded: &str) -> Result<String, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64 content: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("content is not UTF-8: {e}"))
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn transport_error(error: reqwest::Error) -> SyncError {
    SyncError::Network(error.to_string())
}
