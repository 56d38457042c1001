//! Authorization gate
//!
//! Decides whether a session may reach a protected route. Checks run in a
//! fixed order: OAuth authorization, identity resolution, user whitelist,
//! then (for repository routes) the repository whitelist.

use std::collections::HashSet;

use axum::async_trait;
use axum::http::StatusCode;
use regex::Regex;

use super::session::Session;
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::github::GitHub;
use crate::metrics::{GATE_DECISIONS_TOTAL, IDENTITY_FETCHES_TOTAL};

/// Identity fetches attempted before giving up, without backoff.
pub const IDENTITY_FETCH_ATTEMPTS: usize = 3;

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed as the given GitHub login
    Allow(String),
    /// No OAuth session yet; the requested path was saved for replay
    RedirectToLogin,
    /// Stop with this status
    Deny(StatusCode),
}

impl Decision {
    fn label(&self) -> &'static str {
        match self {
            Decision::Allow(_) => "allow",
            Decision::RedirectToLogin => "redirect_to_login",
            Decision::Deny(status) if status.is_server_error() => "error",
            Decision::Deny(_) => "deny",
        }
    }
}

/// Resolves the GitHub login behind an access token
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_login(&self, access_token: &str) -> Result<String, AppError>;
}

#[async_trait]
impl IdentityProvider for GitHub {
    async fn fetch_login(&self, access_token: &str) -> Result<String, AppError> {
        Ok(self.current_user(access_token).await?.login)
    }
}

/// `owner/repo` target of a repository-scoped route
#[derive(Debug, Clone, Copy)]
pub struct RepoRef<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
}

/// Ordered repository patterns, each matching a whole `owner/repo`
#[derive(Debug, Clone)]
pub struct RepoWhitelist {
    patterns: Vec<Regex>,
}

impl RepoWhitelist {
    pub fn new<I, P>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern.as_ref())))
            .collect::<Result<_, _>>()?;

        Ok(Self { patterns })
    }

    pub fn allows(&self, owner: &str, repo: &str) -> bool {
        let target = format!("{owner}/{repo}");
        self.patterns.iter().any(|pattern| pattern.is_match(&target))
    }
}

/// Static access policy, built once at startup
#[derive(Debug, Clone)]
pub struct Gate {
    users: HashSet<String>,
    repos: RepoWhitelist,
    enforce_repos: bool,
    deny_status: StatusCode,
}

impl Gate {
    pub fn new(
        users: impl IntoIterator<Item = String>,
        repos: RepoWhitelist,
        enforce_repos: bool,
        deny_status: StatusCode,
    ) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|login| login.trim().to_string())
                .filter(|login| !login.is_empty())
                .collect(),
            repos,
            enforce_repos,
            deny_status,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        let repos = RepoWhitelist::new(&config.repo_whitelist)
            .map_err(|e| AppError::Config(format!("auth.repo_whitelist: {e}")))?;
        let deny_status = StatusCode::from_u16(config.deny_status)
            .map_err(|e| AppError::Config(format!("auth.deny_status: {e}")))?;

        Ok(Self::new(
            config.user_whitelist.iter().cloned(),
            repos,
            config.enforce_repo_whitelist,
            deny_status,
        ))
    }

    pub fn is_whitelisted(&self, login: &str) -> bool {
        self.users.contains(login)
    }

    /// Decide whether `session` may reach `target_path`
    ///
    /// Saves `target_path` for replay when the session is not authorized and
    /// caches the resolved login in the session.
    pub async fn authorize<I>(
        &self,
        session: &mut Session,
        identity: &I,
        target_path: &str,
        repo: Option<RepoRef<'_>>,
    ) -> Decision
    where
        I: IdentityProvider + ?Sized,
    {
        let decision = self.evaluate(session, identity, target_path, repo).await;
        GATE_DECISIONS_TOTAL
            .with_label_values(&[decision.label()])
            .inc();
        decision
    }

    async fn evaluate<I>(
        &self,
        session: &mut Session,
        identity: &I,
        target_path: &str,
        repo: Option<RepoRef<'_>>,
    ) -> Decision
    where
        I: IdentityProvider + ?Sized,
    {
        if !session.is_authorized() {
            session.remember_previous_url(target_path);
            return Decision::RedirectToLogin;
        }

        let login = match session.login().map(ToOwned::to_owned) {
            Some(login) => login,
            None => match self.resolve_identity(session, identity).await {
                Ok(login) => login,
                Err(_) => return Decision::Deny(StatusCode::INTERNAL_SERVER_ERROR),
            },
        };

        if !self.is_whitelisted(&login) {
            tracing::info!(%login, path = %target_path, "User is not whitelisted");
            return Decision::Deny(self.deny_status);
        }

        if let Some(RepoRef { owner, repo }) = repo {
            if self.enforce_repos && !self.repos.allows(owner, repo) {
                tracing::info!(%login, %owner, %repo, "Repository is not whitelisted");
                return Decision::Deny(self.deny_status);
            }
        }

        Decision::Allow(login)
    }

    /// Fetch the identity again even when one is cached
    ///
    /// On failure the cached login is dropped so it cannot outlive revoked access.
    pub async fn refresh_identity<I>(
        &self,
        session: &mut Session,
        identity: &I,
    ) -> Result<String, AppError>
    where
        I: IdentityProvider + ?Sized,
    {
        session.forget_login();
        self.resolve_identity(session, identity).await
    }

    async fn resolve_identity<I>(
        &self,
        session: &mut Session,
        identity: &I,
    ) -> Result<String, AppError>
    where
        I: IdentityProvider + ?Sized,
    {
        let access_token = session
            .access_token()
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let mut last_error = None;
        for attempt in 1..=IDENTITY_FETCH_ATTEMPTS {
            match identity.fetch_login(&access_token).await {
                Ok(login) => {
                    IDENTITY_FETCHES_TOTAL.with_label_values(&["ok"]).inc();
                    tracing::debug!(%login, attempt, "Resolved GitHub identity");
                    session.remember_login(login.clone());
                    return Ok(login);
                }
                Err(error) => {
                    IDENTITY_FETCHES_TOTAL.with_label_values(&["error"]).inc();
                    tracing::warn!(%error, attempt, "GitHub identity fetch failed");
                    last_error = Some(error);
                }
            }
        }

        tracing::error!(
            attempts = IDENTITY_FETCH_ATTEMPTS,
            "Giving up on GitHub identity fetch"
        );
        Err(last_error.unwrap_or(AppError::Unauthorized))
    }
}
