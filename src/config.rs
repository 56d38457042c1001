//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. `.env` file (if present)
//! 3. Configuration files (config/default.toml, config/local.toml)
//! 4. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Selects which OAuth credential pair is used
    #[serde(default)]
    pub environment: Environment,
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "pages.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Allow the OAuth flow and session cookies over plain http
    #[serde(default)]
    pub insecure_transport: bool,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://pages.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// GitHub OAuth application and API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// Production OAuth client id
    pub client_id: Option<String>,
    /// Production OAuth client secret
    pub client_secret: Option<String>,
    /// OAuth app registered for local development
    #[serde(default)]
    pub develop: GitHubOAuthConfig,
    /// Static access token used for content requests instead of the user's token
    pub token: Option<String>,
    /// REST API base (identity and contents)
    pub api_url: String,
    /// Raw file host
    pub raw_url: String,
    /// Web origin used for source redirects and `/_go`
    pub web_url: String,
    /// OAuth authorize/token endpoint origin
    pub oauth_url: String,
    /// Branch used for raw fetches and source redirects
    pub branch: String,
    /// Upstream request timeout in seconds
    pub timeout_seconds: u64,
}

/// GitHub OAuth credential pair
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GitHubOAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// OAuth credentials resolved for the active environment
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl GitHubConfig {
    /// Pick the credential pair for `environment`.
    pub fn credentials(
        &self,
        environment: Environment,
    ) -> Result<OAuthCredentials, crate::error::AppError> {
        let (client_id, client_secret, prefix) = match environment {
            Environment::Development => (
                self.develop.client_id.as_deref(),
                self.develop.client_secret.as_deref(),
                "github.develop",
            ),
            Environment::Production => (
                self.client_id.as_deref(),
                self.client_secret.as_deref(),
                "github",
            ),
        };

        let non_empty = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };

        match (non_empty(client_id), non_empty(client_secret)) {
            (Some(client_id), Some(client_secret)) => Ok(OAuthCredentials {
                client_id,
                client_secret,
            }),
            _ => Err(crate::error::AppError::Config(format!(
                "{prefix}.client_id and {prefix}.client_secret are required"
            ))),
        }
    }
}

/// Gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes); a random one is generated when unset
    pub session_secret: Option<String>,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// GitHub logins allowed through the gate
    #[serde(default)]
    pub user_whitelist: Vec<String>,
    /// Regular expressions over `owner/repo`
    #[serde(default)]
    pub repo_whitelist: Vec<String>,
    /// Check repository-scoped routes against `repo_whitelist`
    pub enforce_repo_whitelist: bool,
    /// Status returned on whitelist denial (403 or 404)
    pub deny_status: u16,
    /// Re-fetch the identity on every visit to the home route
    pub refresh_identity_on_home: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set
    pub fn filter_directives(&self) -> String {
        format!("gitgate={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. `.env` (if exists, exported into the process environment)
    /// 3. config/default.toml (if exists)
    /// 4. config/local.toml (if exists)
    /// 5. Environment variables (GITGATE_*)
    ///
    /// The result is not validated yet; call [`AppConfig::validate`] once
    /// logging is set up so its warnings are not lost.
    ///
    /// # Errors
    /// Returns error if a source cannot be read or deserialized
    pub fn from_sources() -> Result<Self, crate::error::AppError> {
        use config::{Environment as EnvSource, File};

        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        let config = Self::with_defaults()?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (GITGATE_*)
            .add_source(
                EnvSource::with_prefix("GITGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.user_whitelist")
                    .with_list_parse_key("auth.repo_whitelist")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    fn with_defaults()
    -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, crate::error::AppError>
    {
        Ok(config::Config::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("server.insecure_transport", false)?
            .set_default("github.api_url", "https://api.github.com")?
            .set_default("github.raw_url", "https://raw.githubusercontent.com")?
            .set_default("github.web_url", "https://github.com")?
            .set_default("github.oauth_url", "https://github.com")?
            .set_default("github.branch", "master")?
            .set_default("github.timeout_seconds", 30)?
            .set_default("auth.session_max_age", 604800)?
            .set_default("auth.enforce_repo_whitelist", true)?
            .set_default("auth.deny_status", 404)?
            .set_default("auth.refresh_identity_on_home", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?)
    }

    /// Plain http is tolerated for local development and when explicitly enabled.
    pub fn allows_insecure_transport(&self) -> bool {
        self.server.insecure_transport || self.environment == Environment::Development
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https") || !self.allows_insecure_transport()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if let Some(secret) = &self.auth.session_secret {
            if secret.len() < MIN_SESSION_SECRET_BYTES {
                return Err(crate::error::AppError::Config(format!(
                    "auth.session_secret must be at least {} bytes",
                    MIN_SESSION_SECRET_BYTES
                )));
            }
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self
            .auth
            .user_whitelist
            .iter()
            .all(|login| login.trim().is_empty())
        {
            return Err(crate::error::AppError::Config(
                "auth.user_whitelist must name at least one GitHub login".to_string(),
            ));
        }

        if !matches!(self.auth.deny_status, 403 | 404) {
            return Err(crate::error::AppError::Config(format!(
                "auth.deny_status must be 403 or 404, got {}",
                self.auth.deny_status
            )));
        }

        if self.auth.enforce_repo_whitelist && self.auth.repo_whitelist.is_empty() {
            tracing::warn!("auth.repo_whitelist is empty; every repository route will be denied");
        }

        self.github.credentials(self.environment)?;

        if self.github.timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "github.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.allows_insecure_transport() {
            let host = normalized_server_host(&self.server.domain);
            if self.environment == Environment::Production && !is_local_server_domain(&host) {
                return Err(crate::error::AppError::Config(
                    "server.insecure_transport is only allowed for local domains in production"
                        .to_string(),
                ));
            }
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Allowing insecure transport for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https unless insecure transport is allowed".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    // IPv6 hosts come back bracketed from `Url::host_str`.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
