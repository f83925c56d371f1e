use crate::wire::{CommitPayload, RemoteCommit, RemoteRepository, RepositoryPayload};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid remote URL '{0}'")]
    InvalidUrl(String),
}

/// Operations the backend exposes. Implemented over HTTP by [`HttpRemote`];
/// tests substitute an in-memory fake.
pub trait RemoteClient {
    fn create_repository(&self, repo: &RepositoryPayload) -> Result<(), RemoteError>;
    fn get_repository(&self, repo_id: &str) -> Result<RemoteRepository, RemoteError>;
    fn push_commit(&self, repo_id: &str, commit: &CommitPayload) -> Result<(), RemoteError>;
    fn list_commits(&self, repo_id: &str) -> Result<Vec<RemoteCommit>, RemoteError>;
}

/// Remote endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <key>` when present.
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    /// Bound on the whole call, reads included.
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Blank URLs fall back to [`DEFAULT_API_URL`]; a trailing slash is dropped.
    pub fn new(base_url: &str) -> Self {
        let trimmed = base_url.trim();
        let url = if trimmed.is_empty() { DEFAULT_API_URL } else { trimmed };
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(15),
        }
    }

    /// Blank keys are ignored.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, call: Duration) -> Self {
        self.connect_timeout = connect;
        self.timeout = call;
        self
    }
}

/// A remote URL split into its API base and an optional repository id.
///
/// `https://host/api/repos/abc` targets repository `abc` on `https://host/api`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub base_url: String,
    pub repo_id: Option<String>,
}

impl RemoteTarget {
    pub fn parse(url: &str) -> Result<Self, RemoteError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RemoteError::InvalidUrl(url.to_string()));
        }
        let (base, repo_id) = match url.find("/repos/") {
            Some(at) => {
                let rest = &url[at + "/repos/".len()..];
                let id = rest.split('/').next().unwrap_or_default();
                (&url[..at], (!id.is_empty()).then(|| id.to_string()))
            }
            None => (url, None),
        };
        let base_url = base.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|_| RemoteError::InvalidUrl(url.to_string()))?;
        Ok(Self { base_url, repo_id })
    }
}

/// Blocking HTTP client for the backend.
pub struct HttpRemote {
    base: Url,
    api_key: Option<String>,
    http: Client,
}

impl HttpRemote {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(&config.base_url)
            .map_err(|_| RemoteError::InvalidUrl(config.base_url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.base_url));
        }
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base,
            api_key: config.api_key,
            http,
        })
    }

    /// `base` joined with percent-encoded path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

impl RemoteClient for HttpRemote {
    fn create_repository(&self, repo: &RepositoryPayload) -> Result<(), RemoteError> {
        let url = self.endpoint(&["repos"])?;
        tracing::debug!(%url, id = %repo.id, "creating remote repository");
        self.send(self.http.post(url).json(repo))?;
        Ok(())
    }

    fn get_repository(&self, repo_id: &str) -> Result<RemoteRepository, RemoteError> {
        let url = self.endpoint(&["repos", repo_id])?;
        Ok(self.send(self.http.get(url))?.json()?)
    }

    fn push_commit(&self, repo_id: &str, commit: &CommitPayload) -> Result<(), RemoteError> {
        let url = self.endpoint(&["repos", repo_id, "commits"])?;
        tracing::debug!(%url, id = %commit.id, "pushing commit");
        self.send(self.http.post(url).json(commit))?;
        Ok(())
    }

    fn list_commits(&self, repo_id: &str) -> Result<Vec<RemoteCommit>, RemoteError> {
        let url = self.endpoint(&["repos", repo_id, "commits"])?;
        Ok(self.send(self.http.get(url))?.json()?)
    }
}
