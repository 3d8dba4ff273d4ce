// Integration tests for the API client
//
// These tests run the client against a local mock backend and check the
// access token lifecycle: header attachment, 401 recovery, single-flight
// refresh and failure propagation.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::Value;
use std::io::Write;
use std::time::Duration;

use turbolink_client::auth::{RefreshError, RefreshState};
use turbolink_client::error::ApiError;
use turbolink_client::http_client::ApiClient;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn client_for(server: &ServerGuard) -> ApiClient {
    ApiClient::new(&server.url(), Duration::from_secs(5)).expect("Failed to create API client")
}

/// Endpoint that rejects `old` and accepts `fresh`
async fn rotating_endpoint(server: &mut ServerGuard, path: &str, old: &str, fresh: &str) -> (Mock, Mock) {
    let rejected = server
        .mock("GET", path)
        .match_header("authorization", format!("Bearer {}", old).as_str())
        .with_status(401)
        .with_body(r#"{"message":"Token expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let accepted = server
        .mock("GET", path)
        .match_header("authorization", format!("Bearer {}", fresh).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    (rejected, accepted)
}

async fn refresh_endpoint(server: &mut ServerGuard, status: usize, body: &str, hits: usize) -> Mock {
    server
        .mock("POST", "/api/refresh-token")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

// ==================================================================================================
// Authorization Header Tests
// ==================================================================================================

#[tokio::test]
async fn test_set_auth_token_controls_authorization_header() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let with_token = server
        .mock("GET", "/api/url/me")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;
    let without_token = server
        .mock("GET", "/api/url/me")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    client.set_auth_token(Some("tok-1".to_string()));
    client.get("/url/me").await.unwrap();

    client.set_auth_token(None);
    assert!(client.auth_token().is_none());
    client.get("/url/me").await.unwrap();

    with_token.assert_async().await;
    without_token.assert_async().await;
}

#[tokio::test]
async fn test_empty_token_is_treated_as_no_token() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let mock = server
        .mock("GET", "/api/profile")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"user":{"_id":"u1"}}"#)
        .create_async()
        .await;

    client.set_auth_token(Some(String::new()));
    assert!(client.auth_token().is_none());
    client.get("/profile").await.unwrap();

    mock.assert_async().await;
}

// ==================================================================================================
// Refresh Recovery Tests
// ==================================================================================================

#[tokio::test]
async fn test_401_refreshes_once_and_replays() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let (rejected, accepted) = rotating_endpoint(&mut server, "/api/url/me", "old", "xyz").await;
    let refresh = refresh_endpoint(&mut server, 200, r#"{"accessToken":"xyz"}"#, 1).await;

    client.set_auth_token(Some("old".to_string()));
    let response = client.get("/url/me").await.unwrap();
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(client.auth_token().as_deref(), Some("xyz"));
    assert_eq!(client.refresh_count(), 1);
    assert_eq!(client.refresh_state(), RefreshState::Idle);

    rejected.assert_async().await;
    accepted.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_parallel_401s_share_one_refresh() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let (a_old, a_new) = rotating_endpoint(&mut server, "/api/url/me", "old", "xyz").await;
    let (b_old, b_new) = rotating_endpoint(&mut server, "/api/profile", "old", "xyz").await;
    let (c_old, c_new) = rotating_endpoint(&mut server, "/api/url/analytics/abc", "old", "xyz").await;
    let refresh = refresh_endpoint(&mut server, 200, r#"{"accessToken":"xyz"}"#, 1).await;

    client.set_auth_token(Some("old".to_string()));
    let (a, b, c) = tokio::join!(
        client.get("/url/me"),
        client.get("/profile"),
        client.get("/url/analytics/abc"),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(client.refresh_count(), 1);
    assert_eq!(client.auth_token().as_deref(), Some("xyz"));

    for mock in [a_old, a_new, b_old, b_new, c_old, c_new, refresh] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_second_401_is_terminal() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let first = server
        .mock("GET", "/api/profile")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let replay = server
        .mock("GET", "/api/profile")
        .match_header("authorization", "Bearer xyz")
        .with_status(401)
        .with_body(r#"{"message":"Still unauthorized"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = refresh_endpoint(&mut server, 200, r#"{"accessToken":"xyz"}"#, 1).await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.get("/profile").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.message(), Some("Still unauthorized"));
    assert_eq!(client.refresh_count(), 1);

    first.assert_async().await;
    replay.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_403_never_refreshes() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let forbidden = server
        .mock("POST", "/api/url/delete/abc")
        .with_status(403)
        .with_body(r#"{"message":"Not your link"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = refresh_endpoint(&mut server, 200, r#"{"accessToken":"xyz"}"#, 0).await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.post_empty("/url/delete/abc").await.unwrap_err();

    assert!(err.is_forbidden());
    assert_eq!(err.status(), Some(403));
    assert_eq!(client.auth_token().as_deref(), Some("old"));
    assert_eq!(client.refresh_count(), 0);

    forbidden.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_403_never_refreshes_without_token() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let forbidden = server
        .mock("GET", "/api/url/me")
        .match_header("authorization", Matcher::Missing)
        .with_status(403)
        .with_body(r#"{"message":"Forbidden"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = refresh_endpoint(&mut server, 200, r#"{"accessToken":"xyz"}"#, 0).await;

    let err = client.get("/url/me").await.unwrap_err();

    assert!(err.is_forbidden());
    assert_eq!(client.auth_token(), None);
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(client.refresh_state(), RefreshState::Idle);

    forbidden.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_other_errors_pass_through_untouched() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let mock = server
        .mock("GET", "/api/url/missing")
        .with_status(404)
        .with_body("not json at all")
        .create_async()
        .await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.get("/url/missing").await.unwrap_err();

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "not json at all");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(client.refresh_count(), 0);
    mock.assert_async().await;
}

// ==================================================================================================
// Refresh Failure Tests
// ==================================================================================================

#[tokio::test]
async fn test_refresh_failure_clears_token() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let rejected = server
        .mock("GET", "/api/url/me")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = refresh_endpoint(&mut server, 500, r#"{"message":"Invalid refresh token"}"#, 1).await;
    let anonymous = server
        .mock("GET", "/api/profile")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"user":{"_id":"u1"}}"#)
        .expect(1)
        .create_async()
        .await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.get("/url/me").await.unwrap_err();

    match err {
        ApiError::Refresh(RefreshError::Rejected { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Invalid refresh token");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(client.auth_token().is_none());

    // Later requests go out without credentials
    client.get("/profile").await.unwrap();

    rejected.assert_async().await;
    refresh.assert_async().await;
    anonymous.assert_async().await;
}

#[tokio::test]
async fn test_refresh_without_token_is_failure() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let _rejected = server
        .mock("GET", "/api/url/me")
        .with_status(401)
        .create_async()
        .await;
    let refresh = refresh_endpoint(&mut server, 200, "{}", 1).await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.get("/url/me").await.unwrap_err();

    assert!(matches!(err, ApiError::Refresh(RefreshError::MissingToken)));
    assert!(client.auth_token().is_none());
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_parallel_callers_all_see_refresh_failure() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let mut rejected = Vec::new();
    for path in ["/api/url/me", "/api/profile", "/api/url/analytics/abc"] {
        rejected.push(
            server
                .mock("GET", path)
                .match_header("authorization", "Bearer old")
                .with_status(401)
                .expect(1)
                .create_async()
                .await,
        );
    }
    let refresh = refresh_endpoint(&mut server, 401, r#"{"message":"Session expired"}"#, 1).await;

    client.set_auth_token(Some("old".to_string()));
    let (a, b, c) = tokio::join!(
        client.get("/url/me"),
        client.get("/profile"),
        client.get("/url/analytics/abc"),
    );

    for result in [a, b, c] {
        match result {
            Err(ApiError::Refresh(RefreshError::Rejected { status, .. })) => assert_eq!(status, 401),
            other => panic!("unexpected result: {:?}", other.map(|r| r.status())),
        }
    }
    assert!(client.auth_token().is_none());
    assert_eq!(client.refresh_count(), 1);

    for mock in rejected {
        mock.assert_async().await;
    }
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    // Nothing listens on port 1
    let client = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    client.set_auth_token(Some("old".to_string()));

    let err = client.get("/url/me").await.unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(client.auth_token().as_deref(), Some("old"));
}

#[tokio::test]
async fn test_refresh_network_failure_fails_request_and_clears_token() {
    let mut server = Server::new_async().await;
    let client = ApiClient::new(&server.url(), Duration::from_millis(300)).unwrap();

    let rejected = server
        .mock("GET", "/api/url/me")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    // Refresh body stalls past the client timeout
    let refresh = server
        .mock("POST", "/api/refresh-token")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(1));
            w.write_all(br#"{"accessToken":"late"}"#)
        })
        .expect(1)
        .create_async()
        .await;

    client.set_auth_token(Some("old".to_string()));
    let err = client.get("/url/me").await.unwrap_err();

    assert!(
        matches!(err, ApiError::Refresh(RefreshError::Network(_))),
        "unexpected error: {:?}",
        err
    );
    assert_eq!(client.auth_token(), None);
    assert_eq!(client.refresh_count(), 1);
    assert_eq!(client.refresh_state(), RefreshState::Idle);

    rejected.assert_async().await;
    refresh.assert_async().await;
}

// ==================================================================================================
// Cookie Tests
// ==================================================================================================

#[tokio::test]
async fn test_refresh_cookie_travels_with_refresh_request() {
    let mut server = Server::new_async().await;
    let client = client_for(&server);

    let login = server
        .mock("POST", "/api/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "refreshToken=r1; Path=/; HttpOnly")
        .with_body(r#"{"accessToken":"old"}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/refresh-token")
        .match_header("cookie", Matcher::Regex("refreshToken=r1".to_string()))
        .with_status(200)
        .with_body(r#"{"accessToken":"xyz"}"#)
        .expect(1)
        .create_async()
        .await;

    client
        .post("/login", &serde_json::json!({"email": "a@example.com", "password": "pw"}))
        .await
        .unwrap();

    // Only the cookie is kept, as after a restart
    assert!(client.auth_token().is_none());
    let token = client.refresh_session().await.unwrap();
    assert_eq!(token, "xyz");
    assert_eq!(client.auth_token().as_deref(), Some("xyz"));

    login.assert_async().await;
    refresh.assert_async().await;
}
