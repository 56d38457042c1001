//! GitHub client
//!
//! Covers the OAuth authorization-code handshake, the identity call
//! (`GET /user`), the Contents API and the raw-content host.

use axum::http::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use url::Url;

use crate::config::{GitHubConfig, OAuthCredentials};
use crate::error::AppError;
use crate::metrics::UPSTREAM_REQUESTS_TOTAL;

/// Scope requested from GitHub; private repositories need `repo`.
pub const OAUTH_SCOPE: &str = "repo";

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("GitHub answered {status} for {endpoint}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("request to GitHub failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("access token error: {error}")]
    TokenAccess {
        error: String,
        description: Option<String>,
    },
    #[error("missing access token field")]
    MissingAccessToken,
    #[error("invalid GitHub URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("dot segment {0:?} in repository path")]
    DotSegment(String),
}

impl From<GitHubError> for AppError {
    fn from(error: GitHubError) -> Self {
        match error {
            // Every unusable upstream answer reads as "not found" to the caller.
            GitHubError::Status { .. } => AppError::NotFound,
            GitHubError::TokenAccess { .. } => AppError::Unauthorized,
            GitHubError::MissingAccessToken => AppError::Upstream(error.to_string()),
            GitHubError::Request(e) if e.is_decode() => AppError::NotFound,
            GitHubError::Request(e) => AppError::HttpClient(e),
            GitHubError::Url(e) => AppError::Internal(e.into()),
            GitHubError::DotSegment(_) => AppError::NotFound,
        }
    }
}

/// Entry kind reported by the Contents API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

/// One item of a Contents API directory answer
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// Subset of `GET /user`
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitHub {
    credentials: OAuthCredentials,
    redirect_uri: Url,
    api_url: String,
    raw_url: String,
    web_url: String,
    oauth_url: String,
    branch: String,
    client: reqwest::Client,
}

impl GitHub {
    pub fn new(
        config: &GitHubConfig,
        credentials: OAuthCredentials,
        redirect_uri: &str,
        client: reqwest::Client,
    ) -> Result<Self, GitHubError> {
        Ok(Self {
            credentials,
            redirect_uri: Url::parse(redirect_uri)?,
            api_url: base_url(&config.api_url)?,
            raw_url: base_url(&config.raw_url)?,
            web_url: base_url(&config.web_url)?,
            oauth_url: base_url(&config.oauth_url)?,
            branch: config.branch.clone(),
            client,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Web origin, without trailing slash
    pub fn web_url(&self) -> &str {
        &self.web_url
    }

    /// URL the browser is sent to for the OAuth consent screen
    pub fn authorize_url(&self, state: &str) -> Result<Url, GitHubError> {
        let mut url = endpoint(&self.oauth_url, "/login/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<String, GitHubError> {
        let url = endpoint(&self.oauth_url, "/login/oauth/access_token")?;
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let res = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let res = check_status("access_token", res)?;
        let body = res.json::<TokenResponse>().await?;

        if let Some(error) = body.error {
            return Err(GitHubError::TokenAccess {
                error,
                description: body.error_description,
            });
        }

        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or(GitHubError::MissingAccessToken)
    }

    /// `GET /user` for the token's owner
    pub async fn current_user(&self, access_token: &str) -> Result<User, GitHubError> {
        let url = endpoint(&self.api_url, "/user")?;
        let res = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(AUTHORIZATION, format!("token {access_token}"))
            .send()
            .await?;

        Ok(check_status("user", res)?.json().await?)
    }

    /// Directory entries of `subpath` in upstream order
    pub async fn list_contents(
        &self,
        owner: &str,
        repo: &str,
        subpath: &str,
        access_token: &str,
    ) -> Result<Vec<ContentEntry>, GitHubError> {
        let path = format!(
            "/repos/{}/{}/contents/{}",
            encode_segment(owner)?,
            encode_segment(repo)?,
            encode_subpath(subpath)?,
        );
        let url = endpoint(&self.api_url, &path)?;
        let res = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(AUTHORIZATION, format!("token {access_token}"))
            .send()
            .await?;

        Ok(check_status("contents", res)?.json().await?)
    }

    /// Raw text of a file on the configured branch
    pub async fn raw_file(
        &self,
        owner: &str,
        repo: &str,
        subpath: &str,
        access_token: &str,
    ) -> Result<String, GitHubError> {
        let path = format!(
            "/{}/{}/{}/{}",
            encode_segment(owner)?,
            encode_segment(repo)?,
            urlencoding::encode(&self.branch),
            encode_subpath(subpath)?,
        );
        let url = endpoint(&self.raw_url, &path)?;
        let res = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("token {access_token}"))
            .send()
            .await?;

        Ok(check_status("raw", res)?.text().await?)
    }

    /// Canonical web page for a file
    pub fn blob_url(&self, owner: &str, repo: &str, subpath: &str) -> Result<String, GitHubError> {
        Ok(format!(
            "{}/{}/{}/blob/{}/{}",
            self.web_url,
            encode_segment(owner)?,
            encode_segment(repo)?,
            self.branch,
            encode_subpath(subpath)?,
        ))
    }
}

/// Validate a configured base URL and drop its trailing slash
fn base_url(raw: &str) -> Result<String, GitHubError> {
    Url::parse(raw)?;
    Ok(raw.trim_end_matches('/').to_string())
}

/// Append `path` to `base`, keeping any path prefix of the base (e.g. `/api/v3`)
fn endpoint(base: &str, path: &str) -> Result<Url, GitHubError> {
    Ok(Url::parse(&format!("{base}{path}"))?)
}

fn check_status(
    endpoint: &'static str,
    res: reqwest::Response,
) -> Result<reqwest::Response, GitHubError> {
    let status = res.status();
    UPSTREAM_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status.as_str()])
        .inc();

    if status != reqwest::StatusCode::OK {
        tracing::warn!(endpoint, status = status.as_u16(), "GitHub request failed");
        return Err(GitHubError::Status { endpoint, status });
    }

    Ok(res)
}

/// Percent-encode each segment, keeping separators and a trailing slash.
fn encode_subpath(subpath: &str) -> Result<String, GitHubError> {
    Ok(subpath
        .split('/')
        .map(encode_segment)
        .collect::<Result<Vec<_>, _>>()?
        .join("/"))
}

/// Percent-encode one path segment
///
/// `.` and `..` are refused: URL parsing would resolve them and climb out
/// of the repository.
fn encode_segment(segment: &str) -> Result<String, GitHubError> {
    if matches!(segment, "." | "..") {
        return Err(GitHubError::DotSegment(segment.to_string()));
    }
    Ok(urlencoding::encode(segment).into_owned())
}
