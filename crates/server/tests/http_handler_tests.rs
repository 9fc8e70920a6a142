//! HTTP handler tests for the API endpoints.
//!
//! Discord is replaced by a wiremock server; everything else is the real router.

use auth_broker::api::auth::{AuthResponse, LoginResponse, PublicKeyResponse, VerifyResponse};
use auth_broker::api::health::HealthResponse;
use auth_broker::config::{AppConfig, DiscordConfig};
use auth_broker::error::ErrorResponse;
use auth_broker::issuer::TokenIssuer;
use auth_broker::keys::SigningKeys;
use auth_broker::{AppState, api};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEFAULT_REDIRECT: &str = "http://localhost:8001/auth/callback";

fn create_test_config(discord_base_url: &str) -> AppConfig {
    AppConfig {
        discord: DiscordConfig {
            client_id: "test_id".into(),
            client_secret: "test_secret".into(),
            redirect_uri: DEFAULT_REDIRECT.into(),
            api_base_url: discord_base_url.into(),
            authorize_url: "https://discord.com/api/oauth2/authorize".into(),
            request_timeout_secs: 2,
        },
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 8001,
        keys_dir: "keys".into(),
    }
}

fn create_test_server(discord: &MockServer) -> (TestServer, AppState) {
    let issuer = TokenIssuer::new(&SigningKeys::generate().expect("keys")).expect("issuer");
    let state = AppState::new(create_test_config(&discord.uri()), issuer).expect("state");
    let server = TestServer::new(api::router(state.clone())).expect("create test server");
    (server, state)
}

/// Discord accepting code `abc` for user 123456789.
async fn mount_happy_discord(discord: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .mount(discord)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "123456789", "username": "testuser"})),
        )
        .mount(discord)
        .await;
}

/// Discord that must not be contacted at all.
async fn mount_untouchable_discord(discord: &MockServer) {
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(discord)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(discord)
        .await;
}

// =============================================================================
// Health / Login / Public Key
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_healthy() {
    let discord = MockServer::start().await;
    let (server, _) = create_test_server(&discord);

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "healthy");
    assert!(!body.timestamp.is_empty());
}

#[tokio::test]
async fn test_login_returns_authorization_url() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let response = server.get("/auth/login").await;

    response.assert_status_ok();
    let body: LoginResponse = response.json();
    assert!(
        body.auth_url
            .starts_with("https://discord.com/api/oauth2/authorize?client_id=test_id&")
    );
    assert!(body.auth_url.contains("response_type=code"));
    assert!(body.auth_url.contains("scope=identify"));
    assert!(
        body.auth_url
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8001%2Fauth%2Fcallback")
    );
}

#[tokio::test]
async fn test_public_key_endpoint() {
    let discord = MockServer::start().await;
    let (server, state) = create_test_server(&discord);

    let response = server.get("/auth/public-key").await;

    response.assert_status_ok();
    let body: PublicKeyResponse = response.json();
    assert!(body.public_key.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(body.public_key.ends_with("-----END PUBLIC KEY-----\n"));
    assert_eq!(body.public_key, state.issuer.export_public_key_pem());
}

#[tokio::test]
async fn test_api_docs_are_served() {
    let discord = MockServer::start().await;
    let (server, _) = create_test_server(&discord);

    server.get("/api-docs").await.assert_status_ok();
}

// =============================================================================
// Code exchange entry points
// =============================================================================

#[tokio::test]
async fn test_post_auth_issues_token() {
    let discord = MockServer::start().await;
    mount_happy_discord(&discord).await;
    let (server, state) = create_test_server(&discord);

    let response = server
        .post("/auth")
        .json(&json!({"code": "abc", "redirectUri": DEFAULT_REDIRECT}))
        .await;

    response.assert_status_ok();
    let body: AuthResponse = response.json();
    assert_eq!(body.user.id, "123456789");
    assert_eq!(body.user.username.as_deref(), Some("testuser"));

    let claims = state.issuer.verify(&body.token).expect("valid token");
    assert_eq!(claims.discord_id(), "123456789");
    assert_eq!(claims.user_id(), "123456789");
    assert_eq!(claims.username(), Some("testuser"));
}

#[tokio::test]
async fn test_repeated_logins_receive_distinct_tokens() {
    let discord = MockServer::start().await;
    mount_happy_discord(&discord).await;
    let (server, state) = create_test_server(&discord);

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = server
            .post("/auth")
            .json(&json!({"code": "abc", "redirectUri": DEFAULT_REDIRECT}))
            .await;
        response.assert_status_ok();
        tokens.push(response.json::<AuthResponse>().token);
    }
    assert_ne!(tokens[0], tokens[1]);

    let first = state.issuer.verify(&tokens[0]).expect("valid token");
    let second = state.issuer.verify(&tokens[1]).expect("valid token");
    assert_eq!(first.user_id(), second.user_id());
    assert!(second.iat() > first.iat());
}

#[tokio::test]
async fn test_callback_issues_token_with_default_redirect() {
    let discord = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8001%2Fauth%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(1)
        .mount(&discord)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
        .mount(&discord)
        .await;
    let (server, state) = create_test_server(&discord);

    let response = server
        .get("/auth/callback")
        .add_query_param("code", "abc")
        .await;

    response.assert_status_ok();
    let body: AuthResponse = response.json();
    assert_eq!(body.user.id, "42");
    assert_eq!(body.user.username, None);
    assert_eq!(state.issuer.verify(&body.token).unwrap().user_id(), "42");
}

#[tokio::test]
async fn test_callback_forwards_explicit_redirect() {
    let discord = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("redirect_uri=https%3A%2F%2Fapp.example.org%2Fdone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .expect(1)
        .mount(&discord)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
        .mount(&discord)
        .await;
    let (server, _) = create_test_server(&discord);

    server
        .get("/auth/callback")
        .add_query_param("code", "abc")
        .add_query_param("redirect_uri", "https://app.example.org/done")
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_both_entry_points_share_response_shape() {
    let discord = MockServer::start().await;
    mount_happy_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let post: serde_json::Value = server
        .post("/auth")
        .json(&json!({"code": "abc", "redirectUri": DEFAULT_REDIRECT}))
        .await
        .json();
    let get: serde_json::Value = server
        .get("/auth/callback")
        .add_query_param("code", "abc")
        .await
        .json();

    for body in [&post, &get] {
        let object = body.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["token", "user"]);
        assert_eq!(
            body["user"],
            json!({"id": "123456789", "username": "testuser"})
        );
    }
}

#[tokio::test]
async fn test_exchange_failure_is_unauthorized() {
    let discord = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&discord)
        .await;
    let (server, _) = create_test_server(&discord);

    let response = server
        .post("/auth")
        .json(&json!({"code": "expired", "redirectUri": DEFAULT_REDIRECT}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "authentication_failed");
    assert!(body.detail.starts_with("Token exchange failed"));

    let response = server
        .get("/auth/callback")
        .add_query_param("code", "expired")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_user_id_is_unauthorized() {
    let discord = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .mount(&discord)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "nobody"})))
        .mount(&discord)
        .await;
    let (server, _) = create_test_server(&discord);

    let response = server
        .post("/auth")
        .json(&json!({"code": "abc", "redirectUri": DEFAULT_REDIRECT}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json();
    assert_eq!(body.detail, "No user id in response");
}

// =============================================================================
// Request validation
// =============================================================================

#[tokio::test]
async fn test_post_auth_missing_code_is_rejected() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let response = server
        .post("/auth")
        .json(&json!({"redirectUri": DEFAULT_REDIRECT}))
        .await;

    response.assert_status_bad_request();
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "invalid_request");
}

#[tokio::test]
async fn test_post_auth_missing_redirect_uri_is_rejected() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    server
        .post("/auth")
        .json(&json!({"code": "abc"}))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_post_auth_empty_code_is_rejected() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let response = server
        .post("/auth")
        .json(&json!({"code": "", "redirectUri": DEFAULT_REDIRECT}))
        .await;

    response.assert_status_bad_request();
    let body: ErrorResponse = response.json();
    assert_eq!(body.detail, "`code` must not be empty");
}

#[tokio::test]
async fn test_post_auth_without_json_is_rejected() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    server
        .post("/auth")
        .text("code=abc")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_callback_without_code_is_rejected() {
    let discord = MockServer::start().await;
    mount_untouchable_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let response = server.get("/auth/callback").await;

    response.assert_status_bad_request();
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "invalid_request");
}

// =============================================================================
// Token verification
// =============================================================================

#[tokio::test]
async fn test_verify_accepts_issued_token() {
    let discord = MockServer::start().await;
    mount_happy_discord(&discord).await;
    let (server, _) = create_test_server(&discord);

    let token = server
        .post("/auth")
        .json(&json!({"code": "abc", "redirectUri": DEFAULT_REDIRECT}))
        .await
        .json::<AuthResponse>()
        .token;

    let response = server.get("/auth/verify").authorization_bearer(token).await;

    response.assert_status_ok();
    let body: VerifyResponse = response.json();
    assert!(body.valid);
    assert_eq!(body.claims.user_id(), "123456789");
}

#[tokio::test]
async fn test_verify_rejects_foreign_and_missing_tokens() {
    let discord = MockServer::start().await;
    let (server, _) = create_test_server(&discord);
    let foreign = TokenIssuer::new(&SigningKeys::generate().unwrap())
        .unwrap()
        .issue(&auth_broker::discord::DiscordUser {
            id: "1".into(),
            username: None,
        })
        .unwrap();

    server
        .get("/auth/verify")
        .authorization_bearer(foreign)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = server.get("/auth/verify").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error, "authentication_failed");
}
