//! `/_go` shortcut

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::proxy::go_target;

#[derive(Debug, Deserialize)]
pub struct GoQuery {
    repo: Option<String>,
}

/// GET /_go?repo=<url>
pub async fn go(
    State(state): State<AppState>,
    Query(query): Query<GoQuery>,
) -> Result<Redirect, AppError> {
    let repo = query
        .repo
        .filter(|repo| !repo.is_empty())
        .ok_or_else(|| AppError::Validation("repo is required".to_string()))?;

    Ok(Redirect::to(&go_target(state.github.web_url(), &repo)))
}
