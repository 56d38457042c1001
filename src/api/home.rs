//! Home page

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::error::AppError;
use crate::render::{IndexPage, render_index};

/// GET /
///
/// Refreshes the identity when configured, replays a pending deep link
/// once the session is authorized, and otherwise renders the index.
pub async fn home(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let mut session = state.load_session(&jar);

    if session.is_authorized() && state.config.auth.refresh_identity_on_home {
        if let Err(error) = state
            .gate
            .refresh_identity(&mut session, state.github.as_ref())
            .await
        {
            tracing::warn!(%error, "Identity refresh failed; clearing session");
            session.clear();
            let jar = state.store_session(jar, &session)?;
            return Ok((jar, Redirect::to("/")).into_response());
        }
    }

    if session.is_authorized() {
        if let Some(previous_url) = session.take_previous_url() {
            let jar = state.store_session(jar, &session)?;
            return Ok((jar, Redirect::to(&previous_url)).into_response());
        }
    }

    let page = render_index(&IndexPage {
        authorized: session.is_authorized(),
        login: session.login(),
        client_id: state.github.client_id(),
    });
    let jar = state.store_session(jar, &session)?;

    Ok((jar, Html(page)).into_response())
}
