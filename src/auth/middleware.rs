//! Gate middleware
//!
//! Protects routes behind the authorization gate. The session is loaded
//! from its cookie, judged by the gate, and written back before the
//! outcome is turned into a response.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::gate::{Decision, RepoRef};
use super::oauth::LOGIN_START_PATH;
use crate::AppState;
use crate::error::AppError;

/// Identity that passed the gate
///
/// Inserted into request extensions by the gate middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Whitelisted GitHub login
    pub login: String,
    /// The user's OAuth access token
    pub access_token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "CurrentUser requested on a route without the gate middleware"
            ))
        })
    }
}

/// `owner`, `repo` and optional `subpath` of a repository route
#[derive(Debug, Deserialize)]
pub struct RepoParams {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub subpath: Option<String>,
}

impl RepoParams {
    /// Whether no segment is `.` or `..`
    ///
    /// Dot segments are resolved away once pasted into an upstream URL,
    /// which would land outside the `owner/repo` the gate checked.
    pub fn stays_in_repo(&self) -> bool {
        [self.owner.as_str(), self.repo.as_str()]
            .into_iter()
            .chain(self.subpath.as_deref().unwrap_or_default().split('/'))
            .all(|segment| !matches!(segment, "." | ".."))
    }
}

/// Middleware for routes that only need a whitelisted user
///
/// # Usage
/// ```ignore
/// let routes = Router::new()
///     .route("/_go", get(go))
///     .route_layer(middleware::from_fn_with_state(state, require_user));
/// ```
pub async fn require_user(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    guard(&state, jar, request, next, None).await
}

/// Middleware for `/<owner>/<repo>/...` routes
///
/// Additionally checks `owner/repo` against the repository whitelist.
pub async fn require_repo_access(
    State(state): State<AppState>,
    Path(params): Path<RepoParams>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !params.stays_in_repo() {
        tracing::warn!(
            owner = %params.owner,
            repo = %params.repo,
            subpath = ?params.subpath,
            "Rejecting dot segment in repository path"
        );
        return Err(AppError::NotFound);
    }

    let repo = RepoRef {
        owner: &params.owner,
        repo: &params.repo,
    };
    guard(&state, jar, request, next, Some(repo)).await
}

async fn guard(
    state: &AppState,
    jar: CookieJar,
    mut request: Request,
    next: Next,
    repo: Option<RepoRef<'_>>,
) -> Result<Response, AppError> {
    let mut session = state.load_session(&jar);
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let decision = state
        .gate
        .authorize(&mut session, state.github.as_ref(), &target, repo)
        .await;
    let jar = state.store_session(jar, &session)?;

    match decision {
        Decision::Allow(login) => {
            let access_token = session
                .access_token()
                .ok_or(AppError::Unauthorized)?
                .to_owned();
            request
                .extensions_mut()
                .insert(CurrentUser { login, access_token });
            Ok((jar, next.run(request).await).into_response())
        }
        Decision::RedirectToLogin => {
            tracing::debug!(path = %target, "Redirecting unauthenticated request to login");
            Ok((jar, Redirect::to(LOGIN_START_PATH)).into_response())
        }
        Decision::Deny(status) => Ok((jar, AppError::from_status(status)).into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(owner: &str, repo: &str, subpath: Option<&str>) -> RepoParams {
        RepoParams {
            owner: owner.to_string(),
            repo: repo.to_string(),
            subpath: subpath.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn ordinary_paths_stay_in_repo() {
        assert!(params("randy3k", "foo", None).stays_in_repo());
        assert!(params("randy3k", "foo", Some("docs/")).stays_in_repo());
        assert!(params("randy3k", "foo", Some("docs/..hidden/a.b.html")).stays_in_repo());
        assert!(params("randy3k", ".github", Some("...")).stays_in_repo());
    }

    #[test]
    fn dot_segments_escape_repo() {
        assert!(!params("randy3k", "..", None).stays_in_repo());
        assert!(!params("..", "foo", None).stays_in_repo());
        assert!(
            !params("randy3k", "foo", Some("../../../someone/private/contents/")).stays_in_repo()
        );
        assert!(!params("randy3k", "foo", Some("docs/./a.html")).stays_in_repo());
        assert!(!params("randy3k", "foo", Some("docs/..")).stays_in_repo());
    }
}
