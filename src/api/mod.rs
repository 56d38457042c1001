//! API layer
//!
//! HTTP handlers for:
//! - Home page and deep-link restore
//! - Repository listings and pages
//! - `/_go` shortcut
//! - Metrics (Prometheus)

mod go;
mod home;
pub mod metrics;
mod repo;

use axum::{Router, middleware, routing::get};

use crate::AppState;
use crate::auth::{require_repo_access, require_user};

/// Create the page router
///
/// Repository routes check the repository whitelist on top of the user
/// whitelist; `/_go` and `/metrics` only need a whitelisted user.
pub fn router(state: AppState) -> Router<AppState> {
    let repo_routes = Router::new()
        .route("/:owner/:repo", get(repo::add_trailing_slash))
        .route("/:owner/:repo/", get(repo::repo_home))
        .route("/:owner/:repo/*subpath", get(repo::view_page))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_repo_access,
        ));

    let user_routes = Router::new()
        .route("/_go", get(go::go))
        .route("/metrics", get(metrics::metrics_handler))
        .route_layer(middleware::from_fn_with_state(state, require_user));

    Router::new()
        .route("/", get(home::home))
        .merge(repo_routes)
        .merge(user_routes)
}
