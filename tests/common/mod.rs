//! Common test utilities for E2E tests
//!
//! Every test server talks to its own fake GitHub, bound to a random port.
//! Access tokens of the form `token-<login>` resolve to `<login>`; tokens
//! starting with `fail` make `GET /user` answer 500.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use gitgate::auth::Session;
use gitgate::auth::session::{SESSION_COOKIE, create_session_token, verify_session_token};
use gitgate::{AppState, config};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Authorization code the fake GitHub accepts
pub const GOOD_CODE: &str = "good-code";

/// Requests seen by the fake GitHub
#[derive(Clone, Default)]
pub struct GitHubRecorder {
    user_calls: Arc<AtomicUsize>,
    authorizations: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl GitHubRecorder {
    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    /// `Authorization` headers sent to the contents and raw endpoints
    pub fn content_authorizations(&self) -> Vec<String> {
        self.authorizations
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    /// Every path requested from the fake GitHub
    pub fn upstream_paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn record_authorization(&self, headers: &HeaderMap) {
        let value = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if let Ok(mut seen) = self.authorizations.lock() {
            seen.push(value);
        }
    }
}

/// Start the fake GitHub and return its base URL
async fn spawn_fake_github(recorder: GitHubRecorder) -> String {
    let app = Router::new()
        .route("/login/oauth/access_token", post(access_token))
        .route("/user", get(user))
        .route("/repos/:owner/:repo/contents/", get(root_contents))
        .route("/repos/:owner/:repo/contents/*path", get(contents))
        .route("/raw/:owner/:repo/:branch/*path", get(raw))
        .layer(middleware::from_fn_with_state(recorder.clone(), record_path))
        .with_state(recorder);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn record_path(
    State(recorder): State<GitHubRecorder>,
    request: Request,
    next: Next,
) -> Response {
    if let Ok(mut seen) = recorder.paths.lock() {
        seen.push(request.uri().path().to_string());
    }
    next.run(request).await
}

async fn access_token(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    if form.get("code").map(String::as_str) == Some(GOOD_CODE) {
        Json(serde_json::json!({
            "access_token": "token-randy3k",
            "token_type": "bearer",
            "scope": "repo",
        }))
    } else {
        Json(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired.",
        }))
    }
}

async fn user(State(recorder): State<GitHubRecorder>, headers: HeaderMap) -> Response {
    recorder.user_calls.fetch_add(1, Ordering::SeqCst);

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("token "))
        .unwrap_or_default();

    if token.starts_with("fail") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match token.strip_prefix("token-") {
        Some(login) => Json(serde_json::json!({ "login": login, "id": 1 })).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn root_contents(
    State(recorder): State<GitHubRecorder>,
    Path((owner, repo)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    recorder.record_authorization(&headers);
    directory(&owner, &repo, "")
}

async fn contents(
    State(recorder): State<GitHubRecorder>,
    Path((owner, repo, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    recorder.record_authorization(&headers);
    directory(&owner, &repo, &path)
}

fn directory(_owner: &str, repo: &str, path: &str) -> Response {
    if repo == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let entries = match path.trim_end_matches('/') {
        "" => serde_json::json!([
            {"name": ".github", "type": "dir"},
            {"name": "docs", "type": "dir"},
            {"name": "README.md", "type": "file"},
            {"name": "index.html", "type": "file"},
        ]),
        "docs" => serde_json::json!([
            {"name": "zeta", "type": "dir"},
            {"name": ".nojekyll", "type": "file"},
            {"name": "b.html", "type": "file"},
            {"name": "alpha", "type": "dir"},
            {"name": "a.html", "type": "file"},
            {"name": "vendored", "type": "submodule"},
        ]),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    Json(entries).into_response()
}

async fn raw(
    State(recorder): State<GitHubRecorder>,
    Path((owner, repo, branch, path)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    recorder.record_authorization(&headers);
    if branch == "master" && path.ends_with(".html") {
        format!("<h1>{owner}/{repo}/{path}</h1>").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub github: GitHubRecorder,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(customize: impl FnOnce(&mut config::AppConfig)) -> Self {
        gitgate::metrics::init_metrics();

        let github = GitHubRecorder::default();
        let github_url = spawn_fake_github(github.clone()).await;

        // Create test configuration
        let mut config = config::AppConfig {
            environment: config::Environment::Production,
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "127.0.0.1".to_string(),
                protocol: "http".to_string(),
                insecure_transport: true,
            },
            github: config::GitHubConfig {
                client_id: Some("test-client-id".to_string()),
                client_secret: Some("test-client-secret".to_string()),
                develop: config::GitHubOAuthConfig::default(),
                token: None,
                api_url: github_url.clone(),
                raw_url: format!("{}/raw", github_url),
                web_url: "https://github.com".to_string(),
                oauth_url: github_url,
                branch: "master".to_string(),
                timeout_seconds: 10,
            },
            auth: config::AuthConfig {
                session_secret: Some("test-secret-key-32-bytes-long!!!".to_string()),
                session_max_age: 604800,
                user_whitelist: vec!["randy3k".to_string(), "randybot".to_string()],
                repo_whitelist: vec!["randy3k/.*".to_string()],
                enforce_repo_whitelist: true,
                deny_status: 404,
                refresh_identity_on_home: true,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        customize(&mut config);

        // Initialize app state
        let state = AppState::new(config).unwrap();

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = gitgate::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            github,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// `Cookie` header value carrying `session`
    pub fn session_cookie(&self, session: &Session) -> String {
        let token = create_session_token(session, self.state.session_secret())
            .expect("Failed to create session token");
        format!("{}={}", SESSION_COOKIE, token)
    }

    /// Cookie for a session that went through OAuth as `login`
    pub fn authorized_cookie(&self, login: &str) -> String {
        let session = Session::with_access_token(
            format!("token-{}", login),
            self.state.config.auth.session_max_age,
        );
        self.session_cookie(&session)
    }

    /// GET `path`, optionally with a `Cookie` header
    pub async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        request.send().await.unwrap()
    }

    /// GET `path` over a bare TCP connection
    ///
    /// The path is sent byte for byte; reqwest would resolve `..` segments
    /// before sending. Returns the status code and the raw response.
    pub async fn raw_get(&self, path: &str, cookie: Option<&str>) -> (u16, String) {
        let host = self.addr.trim_start_matches("http://");
        let mut stream = TcpStream::connect(host).await.unwrap();

        let cookie_header = cookie
            .map(|cookie| format!("Cookie: {}\r\n", cookie))
            .unwrap_or_default();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\n{}Connection: close\r\n\r\n",
            path, host, cookie_header
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response).into_owned();
        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_default();

        (status, response)
    }

    /// Session written by `response`, if it set a non-empty session cookie
    pub fn session_from(&self, response: &reqwest::Response) -> Option<Session> {
        let token = cookie_value(response, SESSION_COOKIE)?;
        verify_session_token(&token, self.state.session_secret()).ok()
    }
}

/// Value of the `name` cookie set by `response`
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

/// `Location` header of a redirect
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
