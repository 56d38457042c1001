//! GitHub OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with GitHub, plus the
//! explicit login/logout triggers.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;

use super::session::{random_token, remove_session};
use crate::AppState;
use crate::error::AppError;

/// Where unauthenticated requests are sent
pub const LOGIN_START_PATH: &str = "/login/github";

/// OAuth callback registered with GitHub
pub const CALLBACK_PATH: &str = "/login/github/authorized";

const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_COOKIE_PATH: &str = "/login";

/// Create authentication router
///
/// Routes:
/// - GET /_login - Start the login flow
/// - GET /_logout - Clear the session
/// - GET /login/github - Redirect to GitHub
/// - GET /login/github/authorized - OAuth callback
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/_login", get(login))
        .route("/_logout", get(logout))
        .route(LOGIN_START_PATH, get(github_redirect))
        .route(CALLBACK_PATH, get(github_callback))
}

/// GET /_login
async fn login() -> Redirect {
    Redirect::to(LOGIN_START_PATH)
}

/// GET /_logout
///
/// Clears the whole session when authorized; always lands on home.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let session = state.load_session(&jar);
    if !session.is_authorized() {
        return (jar, Redirect::to("/"));
    }

    tracing::info!(login = ?session.login(), "Logging out");
    (remove_session(jar), Redirect::to("/"))
}

/// GET /login/github
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in cookie
/// 3. Redirect to GitHub with client_id, redirect_uri, scope, state
async fn github_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let csrf_state = random_token();
    let url = state.github.authorize_url(&csrf_state)?;

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf_state))
        .path(OAUTH_STATE_COOKIE_PATH)
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(cookie), Redirect::to(url.as_str())))
}

/// Query parameters from GitHub callback
#[derive(Debug, Deserialize)]
struct GitHubCallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set when the user declined
    error: Option<String>,
}

/// GET /login/github/authorized
///
/// # Steps
/// 1. Verify CSRF state
/// 2. Exchange code for access token
/// 3. Store the token in the session
/// 4. Redirect to home, which replays any saved deep link
async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<GitHubCallbackQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    verify_csrf_state(query.state.as_deref(), &jar)?;
    let jar = jar.remove(
        Cookie::build(OAUTH_STATE_COOKIE)
            .path(OAUTH_STATE_COOKIE_PATH)
            .build(),
    );

    if let Some(error) = query.error {
        tracing::info!(%error, "GitHub authorization was declined");
        return Err(AppError::Unauthorized);
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("code is required".to_string()))?;

    let access_token = state.github.exchange_code(&code).await.map_err(|error| {
        tracing::warn!(%error, "GitHub token exchange failed");
        AppError::from(error)
    })?;

    let mut session = state.load_session(&jar);
    session.set_access_token(access_token);
    let jar = state.store_session(jar, &session)?;

    tracing::info!("GitHub authorization completed");
    Ok((jar, Redirect::to("/")).into_response())
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(state: Option<&str>, jar: &CookieJar) -> Result<(), AppError> {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .ok_or(AppError::Unauthorized)?;

    match state {
        Some(state) if !state.is_empty() && state == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
