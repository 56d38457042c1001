//! E2E tests for the authorization gate on repository routes

mod common;

use common::{TestServer, location};
use gitgate::auth::Session;

#[tokio::test]
async fn test_anonymous_request_redirects_to_login_and_saves_target() {
    let server = TestServer::new().await;

    let response = server.get("/randy3k/foo/?tab=1", None).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/login/github");
    let session = server.session_from(&response).expect("session cookie is set");
    assert_eq!(session.previous_url(), Some("/randy3k/foo/?tab=1"));
    assert!(!session.is_authorized());
}

#[tokio::test]
async fn test_whitelisted_user_on_whitelisted_repo_is_allowed() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("randy3k");

    let response = server.get("/randy3k/bar/", Some(&cookie)).await;

    assert_eq!(response.status(), 200);
    let session = server.session_from(&response).expect("session cookie is set");
    assert_eq!(session.login(), Some("randy3k"));
}

#[tokio::test]
async fn test_identity_is_cached_in_session() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("randybot");

    let first = server.get("/randy3k/bar/", Some(&cookie)).await;
    assert_eq!(first.status(), 200);
    assert_eq!(server.github.user_calls(), 1);

    let session = server.session_from(&first).expect("session cookie is set");
    let cookie = server.session_cookie(&session);
    let second = server.get("/randy3k/bar/docs/", Some(&cookie)).await;

    assert_eq!(second.status(), 200);
    assert_eq!(server.github.user_calls(), 1);
}

#[tokio::test]
async fn test_user_outside_whitelist_gets_not_found() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("eve");

    let response = server.get("/randy3k/foo/", Some(&cookie)).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_deny_status_is_configurable() {
    let server = TestServer::with_config(|config| config.auth.deny_status = 403).await;
    let cookie = server.authorized_cookie("eve");

    let response = server.get("/randy3k/foo/", Some(&cookie)).await;

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_repository_outside_whitelist_is_denied() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("randy3k");

    let response = server.get("/someone/else/", Some(&cookie)).await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_repository_whitelist_can_be_disabled() {
    let server =
        TestServer::with_config(|config| config.auth.enforce_repo_whitelist = false).await;
    let cookie = server.authorized_cookie("randy3k");

    let response = server.get("/someone/else/", Some(&cookie)).await;

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_identity_failure_after_three_attempts_is_server_error() {
    let server = TestServer::new().await;
    let session = Session::with_access_token("fail-token", 3600);
    let cookie = server.session_cookie(&session);

    let response = server.get("/randy3k/foo/", Some(&cookie)).await;

    assert_eq!(response.status(), 500);
    assert_eq!(server.github.user_calls(), 3);
}

#[tokio::test]
async fn test_go_redirects_github_links_onto_this_site() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("randy3k");

    let response = server
        .get("/_go?repo=https%3A%2F%2Fgithub.com%2Frandy3k%2Fx", Some(&cookie))
        .await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/randy3k/x");
}

#[tokio::test]
async fn test_go_requires_repo_parameter() {
    let server = TestServer::new().await;
    let cookie = server.authorized_cookie("randy3k");

    let response = server.get("/_go", Some(&cookie)).await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_go_requires_login() {
    let server = TestServer::new().await;

    let response = server.get("/_go?repo=https://github.com/randy3k/x", None).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/login/github");
}

#[tokio::test]
async fn test_whitelist_denials_are_not_counted_as_errors() {
    let server = TestServer::new().await;

    let denied = server
        .get("/randy3k/foo/", Some(&server.authorized_cookie("eve")))
        .await;
    assert_eq!(denied.status(), 404);

    let metrics = server
        .get("/metrics", Some(&server.authorized_cookie("randy3k")))
        .await;
    let body = metrics.text().await.unwrap();

    assert!(body.contains("gitgate_gate_decisions_total{decision=\"deny\"}"));
    assert!(!body.contains("gitgate_errors_total{error_type=\"not_found\"}"));
    assert!(!body.contains("gitgate_errors_total{error_type=\"forbidden\"}"));
}
