//! gitgate - A GitHub OAuth gated front-end for whitelisted repositories
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - OAuth login/logout                                       │
//! │  - Home, repository listings, raw pages, /_go               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Authorization Gate                        │
//! │  - Encrypted-cookie session                                 │
//! │  - Identity resolution, user and repository whitelists     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Content Proxy                            │
//! │  - GitHub Contents API and raw file host                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: GitHub OAuth, sessions and the authorization gate
//! - `github`: GitHub client
//! - `proxy`: Directory listing and raw file proxy
//! - `render`: HTML pages
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod metrics;
pub mod proxy;
pub mod render;

use std::sync::Arc;

use axum_extra::extract::CookieJar;

use auth::{CurrentUser, Gate, Session};

/// Application state shared across all handlers
///
/// Everything in here is immutable after startup; sessions live in the
/// client's cookie.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Whitelist policy
    pub gate: Arc<Gate>,

    /// GitHub OAuth and API client
    pub github: Arc<github::GitHub>,

    session_secret: Arc<str>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Compile the gate policy
    /// 2. Resolve the session secret
    /// 3. Build the HTTP client and GitHub client
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Gate policy
        let gate = Gate::from_config(&config.auth)?;
        tracing::info!(
            users = config.auth.user_whitelist.len(),
            repo_patterns = config.auth.repo_whitelist.len(),
            deny_status = config.auth.deny_status,
            "Gate policy compiled"
        );

        // 2. Session secret
        let session_secret = match &config.auth.session_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!(
                    "auth.session_secret is not set; sessions will not survive a restart"
                );
                auth::session::random_token()
            }
        };

        // 3. HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.github.timeout_seconds))
            .https_only(!config.allows_insecure_transport())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let credentials = config.github.credentials(config.environment)?;
        let redirect_uri = format!("{}{}", config.server.base_url(), auth::CALLBACK_PATH);
        let github = github::GitHub::new(&config.github, credentials, &redirect_uri, http_client)
            .map_err(|e| error::AppError::Config(format!("github: {e}")))?;
        tracing::info!(%redirect_uri, "GitHub client initialized");

        Ok(Self {
            config: Arc::new(config),
            gate: Arc::new(gate),
            github: Arc::new(github),
            session_secret: session_secret.into(),
        })
    }

    /// Secret used to sign session cookies
    pub fn session_secret(&self) -> &str {
        &self.session_secret
    }

    /// Session carried by the request's cookie, or a fresh one
    pub fn load_session(&self, jar: &CookieJar) -> Session {
        auth::session::load_session(
            jar,
            &self.session_secret,
            self.config.auth.session_max_age,
        )
    }

    /// Write `session` back into the cookie jar
    pub fn store_session(
        &self,
        jar: CookieJar,
        session: &Session,
    ) -> Result<CookieJar, error::AppError> {
        auth::session::store_session(
            jar,
            session,
            &self.session_secret,
            self.config.should_use_secure_cookies(),
        )
    }

    /// Token used for content requests
    ///
    /// The configured static token wins over the user's own OAuth token.
    pub fn content_token<'a>(&'a self, user: &'a CurrentUser) -> &'a str {
        self.config
            .github
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .unwrap_or(&user.access_token)
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower::ServiceBuilder;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
