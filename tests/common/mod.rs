//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use device_auth_integration::telemetry::{NoOpLogger, NoOpMetrics};
use device_auth_integration::{
    build_router, server_config, AppState, ReqwestHttpTransport, ServerConfig, ServerConfigBuilder,
};
use wiremock::MockServer;

pub const API_KEY: &str = "test-api-key";
pub const PREFIX: &str = "/api/v1/auth";

/// Set up a mock upstream server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Configuration pointing every upstream at `mock`.
pub fn config_builder(mock: &MockServer) -> ServerConfigBuilder {
    let uri = mock.uri();
    server_config()
        .identity_api_key(API_KEY)
        .identity_endpoints(format!("{}/v1", uri), format!("{}/v1/token", uri))
        .google_credentials("google-client", "google-secret")
        .google_endpoints(
            format!("{}/google/authorize", uri),
            format!("{}/google/token", uri),
        )
        .github_credentials("github-client", "github-secret")
        .github_endpoints(
            format!("{}/github/authorize", uri),
            format!("{}/github/token", uri),
        )
}

/// Serve the application on an ephemeral port and return its base URL.
pub async fn spawn_app(config: ServerConfig) -> String {
    let transport = Arc::new(ReqwestHttpTransport::new().expect("transport"));
    let state = AppState::from_config(
        &config,
        transport,
        Arc::new(NoOpLogger),
        Arc::new(NoOpMetrics),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("server");
    });

    format!("http://{}", addr)
}

/// HTTP client that leaves redirects to the test.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client")
}

/// Absolute URL of an auth route.
pub fn auth_url(base: &str, path: &str) -> String {
    format!("{}{}{}", base, PREFIX, path)
}
