//! End-to-end tests against a running server with mocked upstreams.

mod common;

use common::*;
use device_auth_integration::{DeviceStartResponse, TokenBundle};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn start(client: &reqwest::Client, base: &str, provider: &str) -> DeviceStartResponse {
    let response = client
        .post(auth_url(base, "/device/start"))
        .json(&json!({ "provider": provider }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

async fn poll(client: &reqwest::Client, base: &str, device_code: &str) -> (StatusCode, Value) {
    let response = client
        .post(auth_url(base, "/device/poll"))
        .json(&json!({ "device_code": device_code }))
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

fn query_value(location: &str, key: &str) -> Option<String> {
    url::Url::parse(location)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_github_device_login_end_to_end() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/github/token"))
        .and(body_string_contains("code=gh-code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "gh-access" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithIdp"))
        .and(query_param("key", API_KEY))
        .and(body_string_contains("access_token=gh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "fb-id-token",
            "refreshToken": "fb-refresh-token",
            "expiresIn": "3600",
            "email": "octocat@example.com",
            "localId": "uid-123"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let started = start(&client, &base, "github").await;
    assert_eq!(started.verification_uri, auth_url(&base, "/device"));
    assert!(started
        .verification_uri_complete
        .ends_with(&format!("?code={}", started.user_code)));
    assert_eq!(started.interval, 5);
    assert_eq!(started.expires_in, 600);

    let (status, body) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({ "status": "pending" }));

    // Lower-case entry without the dash still matches.
    let typed = started.user_code.replace('-', "").to_lowercase();
    let response = client
        .post(auth_url(&base, "/device"))
        .form(&[("code", typed.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(location.starts_with(&format!("{}/github/authorize?", mock_server.uri())));
    assert_eq!(
        query_value(&location, "redirect_uri").as_deref(),
        Some(auth_url(&base, "/device/callback/github").as_str())
    );
    assert_eq!(query_value(&location, "client_id").as_deref(), Some("github-client"));
    let state = query_value(&location, "state").unwrap();

    let response = client
        .get(auth_url(&base, "/device/callback/github"))
        .query(&[("code", "gh-code"), ("state", state.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await.unwrap();
    assert!(html.contains("Authentication complete"));

    let (status, body) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::OK);
    let bundle: TokenBundle = serde_json::from_value(body).unwrap();
    assert_eq!(bundle.id_token, "fb-id-token");
    assert_eq!(bundle.refresh_token, "fb-refresh-token");
    assert_eq!(bundle.expires_in, 3600);
    assert_eq!(bundle.provider.as_str(), "github");
    assert_eq!(bundle.email.as_deref(), Some("octocat@example.com"));

    let (status, body) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Unknown device code" }));
}

#[tokio::test]
async fn test_provider_denial_reaches_cli_once() {
    let mock_server = setup_mock_server().await;
    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let started = start(&client, &base, "google").await;
    let response = client
        .post(auth_url(&base, "/device"))
        .form(&[("code", started.user_code.as_str())])
        .send()
        .await
        .unwrap();
    let location = response.headers()["location"].to_str().unwrap().to_string();
    let state = query_value(&location, "state").unwrap();
    assert_eq!(query_value(&location, "access_type").as_deref(), Some("offline"));

    let html = client
        .get(auth_url(&base, "/device/callback/google"))
        .query(&[("error", "access_denied"), ("state", state.as_str())])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Authorization failed: access_denied"));

    let (status, body) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "access_denied" }));

    let (status, _) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_identity_success_without_tokens_fails_session() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/github/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "gh-access" })),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithIdp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "identitytoolkit#VerifyAssertionResponse"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let started = start(&client, &base, "github").await;
    let response = client
        .post(auth_url(&base, "/device"))
        .form(&[("code", started.user_code.as_str())])
        .send()
        .await
        .unwrap();
    let location = response.headers()["location"].to_str().unwrap().to_string();
    let state = query_value(&location, "state").unwrap();

    let html = client
        .get(auth_url(&base, "/device/callback/github"))
        .query(&[("code", "gh-code"), ("state", state.as_str())])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Identity provider authentication failed"));
    assert!(!html.contains("Authentication complete"));

    let (status, body) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("id_token").is_none());
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid upstream response"));

    let (status, _) = poll(&client, &base, &started.device_code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_rejects_bad_requests() {
    let mock_server = setup_mock_server().await;
    let base = spawn_app(
        config_builder(&mock_server)
            .github_credentials("", "")
            .build()
            .unwrap(),
    )
    .await;
    let client = http_client();

    let response = client
        .post(auth_url(&base, "/device/start"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "detail": "Invalid request" }));

    let response = client
        .post(auth_url(&base, "/device/start"))
        .json(&json!({ "provider": "gitlab" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(auth_url(&base, "/device/start"))
        .json(&json!({ "provider": "github" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_poll_errors() {
    let mock_server = setup_mock_server().await;
    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let (status, body) = poll(&client, &base, "no-such-code").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Unknown device code" }));

    let response = client
        .post(auth_url(&base, "/device/poll"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verification_pages() {
    let mock_server = setup_mock_server().await;
    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let response = client
        .get(auth_url(&base, "/device"))
        .query(&[("code", "<b>ABCD</b>")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = response.text().await.unwrap();
    assert!(html.contains("&lt;b&gt;ABCD&lt;/b&gt;"));
    assert!(!html.contains("<b>ABCD</b>"));

    let html = client
        .post(auth_url(&base, "/device"))
        .form(&[("code", "ZZZZ-ZZZZ")])
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Invalid or expired device code"));

    let html = client
        .get(auth_url(&base, "/device/callback/github"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("Missing state parameter"));
}

#[tokio::test]
async fn test_health_and_banner() {
    let mock_server = setup_mock_server().await;
    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["identity_configured"], true);
    assert_eq!(body["providers"], json!({ "google": true, "github": true }));
    assert_eq!(body["live_sessions"], 0);

    let response = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_degraded_without_identity_key() {
    let base = spawn_app(device_auth_integration::server_config().build().unwrap()).await;

    let body: Value = http_client()
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["identity_configured"], false);
}

#[tokio::test]
async fn test_login_passthrough() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .and(query_param("key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "id-1",
            "refreshToken": "refresh-1",
            "expiresIn": "3600",
            "email": "user@example.com",
            "localId": "uid-1"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:signUp"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "EMAIL_EXISTS" }
        })))
        .mount(&mock_server)
        .await;

    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let response = client
        .post(auth_url(&base, "/login"))
        .json(&json!({ "email": "user@example.com", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id_token"], "id-1");
    assert_eq!(body["refresh_token"], "refresh-1");
    assert_eq!(body["expires_in"], 3600);

    let response = client
        .post(auth_url(&base, "/register"))
        .json(&json!({ "email": "user@example.com", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "detail": "EMAIL_EXISTS" }));
}

#[tokio::test]
async fn test_profile_requires_token() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .and(body_string_contains("bearer-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{
                "localId": "uid-1",
                "email": "user@example.com",
                "displayName": "User",
                "emailVerified": true
            }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let base = spawn_app(config_builder(&mock_server).build().unwrap()).await;
    let client = http_client();

    let response = client.get(auth_url(&base, "/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(auth_url(&base, "/me"))
        .bearer_auth("bearer-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["local_id"], "uid-1");
    assert_eq!(body["display_name"], "User");
    assert_eq!(body["email_verified"], true);

    let response = client
        .delete(auth_url(&base, "/me"))
        .header("X-ID-Token", "header-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
}
