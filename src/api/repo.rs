//! Repository listings and pages

use axum::{
    extract::{Path, State},
    http::Uri,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::AppState;
use crate::auth::{CurrentUser, RepoParams};
use crate::error::AppError;
use crate::proxy;
use crate::render::render_tree;

/// GET /:owner/:repo
///
/// Repository roots live under the slash form, like every directory.
pub async fn add_trailing_slash(uri: Uri) -> Redirect {
    let target = match uri.query() {
        Some(query) => format!("{}/?{}", uri.path(), query),
        None => format!("{}/", uri.path()),
    };
    Redirect::permanent(&target)
}

/// GET /:owner/:repo/
pub async fn repo_home(
    State(state): State<AppState>,
    Path(RepoParams { owner, repo, .. }): Path<RepoParams>,
    user: CurrentUser,
) -> Result<Response, AppError> {
    list_directory(&state, &user, &owner, &repo, "").await
}

/// GET /:owner/:repo/*subpath
///
/// Directories (trailing `/`) are listed, `.html` files are served as-is
/// and everything else is sent to GitHub.
pub async fn view_page(
    State(state): State<AppState>,
    Path((owner, repo, subpath)): Path<(String, String, String)>,
    user: CurrentUser,
) -> Result<Response, AppError> {
    if subpath.ends_with('/') {
        return list_directory(&state, &user, &owner, &repo, &subpath).await;
    }

    if subpath.ends_with(".html") {
        let token = state.content_token(&user);
        let text = proxy::raw_file(&state.github, &owner, &repo, &subpath, token).await?;
        return Ok(Html(text).into_response());
    }

    Ok(Redirect::to(&state.github.blob_url(&owner, &repo, &subpath)?).into_response())
}

async fn list_directory(
    state: &AppState,
    user: &CurrentUser,
    owner: &str,
    repo: &str,
    subpath: &str,
) -> Result<Response, AppError> {
    let token = state.content_token(user);
    let listing = proxy::list_directory(&state.github, owner, repo, subpath, token).await?;
    tracing::debug!(
        login = %user.login,
        %owner,
        %repo,
        %subpath,
        folders = listing.folders.len(),
        files = listing.files.len(),
        "Rendering directory listing"
    );

    Ok(Html(render_tree(&listing)).into_response())
}
