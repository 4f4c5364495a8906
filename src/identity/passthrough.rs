//! Identity Passthrough
//!
//! Account operations forwarded to the identity provider for callers that
//! already hold credentials.

use std::sync::Arc;

use super::client::IdentityProvider;
use crate::error::{AuthenticationError, DeviceAuthResult, NotFoundError, ValidationError};
use crate::providers::provider_token_field;
use crate::telemetry::{DeviceAuthLogContext, DeviceAuthMetrics, Logger};
use crate::types::{
    AuthResponse, AuthUserProfile, DeleteAccountResponse, LoginRequest, ProfileUpdateRequest,
    Provider, ProviderLoginRequest, RefreshRequest, RegisterRequest,
};

/// Pick the caller's ID token from `X-ID-Token` or `Authorization: Bearer`.
///
/// A non-empty `X-ID-Token` wins over the `Authorization` header.
pub fn extract_id_token(
    x_id_token: Option<&str>,
    authorization: Option<&str>,
) -> Result<String, AuthenticationError> {
    if let Some(token) = x_id_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let header = authorization
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(AuthenticationError::MissingToken)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthenticationError::InvalidHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthenticationError::InvalidHeader);
    }
    Ok(token.to_string())
}

/// Build the federated sign-in body for a provider token.
pub fn federated_post_body(field: &str, token: &str, provider_id: &str) -> String {
    serde_urlencoded::to_string([(field, token), ("providerId", provider_id)])
        .unwrap_or_else(|_| format!("{}=&providerId={}", field, provider_id))
}

/// Account operations backed by an [`IdentityProvider`].
pub struct IdentityPassthrough {
    identity: Arc<dyn IdentityProvider>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn DeviceAuthMetrics>,
}

impl IdentityPassthrough {
    /// Create new passthrough.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn DeviceAuthMetrics>,
    ) -> Self {
        Self {
            identity,
            logger,
            metrics,
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> DeviceAuthResult<AuthResponse> {
        let result = self.identity.sign_up(request).await;
        self.observe("register", result)
    }

    pub async fn login(&self, request: &LoginRequest) -> DeviceAuthResult<AuthResponse> {
        let result = self.identity.sign_in_with_password(request).await;
        self.observe("login", result)
    }

    /// Sign in with a token the caller obtained from Google or GitHub directly.
    pub async fn login_with_provider(
        &self,
        request: &ProviderLoginRequest,
    ) -> DeviceAuthResult<AuthResponse> {
        let provider: Provider = request.provider.parse().map_err(|_| ValidationError::InvalidField {
            message: format!("Unsupported provider '{}'", request.provider),
        })?;

        // Google accepts an access token when no ID token is supplied.
        let preferred = provider_token_field(provider);
        let credential = match provider {
            Provider::Google => non_empty(&request.id_token)
                .map(|token| (preferred, token))
                .or_else(|| non_empty(&request.access_token).map(|token| ("access_token", token))),
            Provider::Github => non_empty(&request.access_token).map(|token| (preferred, token)),
        };
        let (field, token) = credential.ok_or_else(|| {
            let wanted = match provider {
                Provider::Google => "id_token or access_token",
                Provider::Github => preferred,
            };
            ValidationError::InvalidField {
                message: format!("Missing {} for {} login", wanted, provider.display_name()),
            }
        })?;
        let post_body = federated_post_body(field, token, provider.identity_provider_id());

        let result = self.identity.sign_in_with_idp(&post_body).await;
        self.observe("login_provider", result)
    }

    pub async fn refresh(&self, request: &RefreshRequest) -> DeviceAuthResult<AuthResponse> {
        let result = self.identity.refresh(&request.refresh_token).await;
        self.observe("refresh", result)
    }

    /// Profile of the first user attached to `id_token`.
    pub async fn profile(&self, id_token: &str) -> DeviceAuthResult<AuthUserProfile> {
        let users = self.observe("profile", self.identity.lookup(id_token).await)?;
        users
            .into_iter()
            .next()
            .ok_or_else(|| NotFoundError::User.into())
    }

    pub async fn update_profile(
        &self,
        id_token: &str,
        request: &ProfileUpdateRequest,
    ) -> DeviceAuthResult<AuthUserProfile> {
        let result = self.identity.update(id_token, request).await;
        self.observe("update_profile", result)
    }

    pub async fn delete_profile(&self, id_token: &str) -> DeviceAuthResult<DeleteAccountResponse> {
        self.observe("delete_profile", self.identity.delete(id_token).await)?;
        Ok(DeleteAccountResponse::success())
    }

    fn observe<R>(&self, operation: &str, result: DeviceAuthResult<R>) -> DeviceAuthResult<R> {
        if let Err(e) = &result {
            self.logger.warn(
                "Identity provider call failed",
                &DeviceAuthLogContext::new()
                    .operation(operation)
                    .extra("error_code", e.error_code()),
            );
            if e.is_upstream() {
                self.metrics.record_upstream_error("identity", e.error_code());
            }
        }
        result
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeviceAuthError, UpstreamError};
    use crate::identity::client::MockIdentityProvider;
    use crate::telemetry::{InMemoryMetrics, NoOpLogger};
    use mockall::predicate::eq;

    fn auth() -> AuthResponse {
        AuthResponse {
            id_token: "id".to_string(),
            refresh_token: "rt".to_string(),
            expires_in: 3600,
            email: None,
            local_id: Some("uid".to_string()),
        }
    }

    fn passthrough(mock: MockIdentityProvider) -> (IdentityPassthrough, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        let passthrough = IdentityPassthrough::new(Arc::new(mock), Arc::new(NoOpLogger), metrics.clone());
        (passthrough, metrics)
    }

    #[test]
    fn test_extract_id_token() {
        assert_eq!(extract_id_token(Some("abc"), None).unwrap(), "abc");
        assert_eq!(
            extract_id_token(Some("header"), Some("Bearer other")).unwrap(),
            "header"
        );
        assert_eq!(extract_id_token(Some(""), Some("bearer tok")).unwrap(), "tok");
        assert!(matches!(
            extract_id_token(None, None),
            Err(AuthenticationError::MissingToken)
        ));
        assert!(matches!(
            extract_id_token(None, Some("Basic abc")),
            Err(AuthenticationError::InvalidHeader)
        ));
        assert!(matches!(
            extract_id_token(None, Some("Bearer")),
            Err(AuthenticationError::InvalidHeader)
        ));
        assert!(matches!(
            extract_id_token(None, Some("Bearer   ")),
            Err(AuthenticationError::InvalidHeader)
        ));
    }

    #[test]
    fn test_federated_post_body_encodes_token() {
        assert_eq!(
            federated_post_body("id_token", "a+b/c=", "google.com"),
            "id_token=a%2Bb%2Fc%3D&providerId=google.com"
        );
    }

    #[tokio::test]
    async fn test_google_prefers_id_token() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_sign_in_with_idp()
            .with(eq("id_token=gid&providerId=google.com"))
            .times(1)
            .returning(|_| Ok(auth()));
        let (passthrough, _) = passthrough(mock);

        let request = ProviderLoginRequest {
            provider: "Google".to_string(),
            id_token: Some("gid".to_string()),
            access_token: Some("gat".to_string()),
        };
        assert_eq!(passthrough.login_with_provider(&request).await.unwrap(), auth());
    }

    #[tokio::test]
    async fn test_google_falls_back_to_access_token() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_sign_in_with_idp()
            .with(eq("access_token=gat&providerId=google.com"))
            .times(1)
            .returning(|_| Ok(auth()));
        let (passthrough, _) = passthrough(mock);

        let request = ProviderLoginRequest {
            provider: "google".to_string(),
            id_token: None,
            access_token: Some("gat".to_string()),
        };
        assert!(passthrough.login_with_provider(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_github_login_accepts_mixed_case_provider() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_sign_in_with_idp()
            .with(eq("access_token=gh-token&providerId=github.com"))
            .times(1)
            .returning(|_| Ok(auth()));
        let (passthrough, _) = passthrough(mock);

        let request = ProviderLoginRequest {
            provider: " GitHub ".to_string(),
            id_token: None,
            access_token: Some("gh-token".to_string()),
        };
        assert!(passthrough.login_with_provider(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_login_validation() {
        let (passthrough, _) = passthrough(MockIdentityProvider::new());

        let missing_google = ProviderLoginRequest {
            provider: "google".to_string(),
            id_token: None,
            access_token: None,
        };
        let err = passthrough.login_with_provider(&missing_google).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.detail(), "Missing id_token or access_token for Google login");

        let missing_github = ProviderLoginRequest {
            provider: "github".to_string(),
            id_token: Some("ignored".to_string()),
            access_token: None,
        };
        let err = passthrough.login_with_provider(&missing_github).await.unwrap_err();
        assert_eq!(err.detail(), "Missing access_token for GitHub login");

        let unsupported = ProviderLoginRequest {
            provider: "gitlab".to_string(),
            id_token: None,
            access_token: Some("t".to_string()),
        };
        let err = passthrough.login_with_provider(&unsupported).await.unwrap_err();
        assert_eq!(err.detail(), "Unsupported provider 'gitlab'");
    }

    #[tokio::test]
    async fn test_profile_without_users_is_not_found() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_lookup().returning(|_| Ok(Vec::new()));
        let (passthrough, _) = passthrough(mock);

        let err = passthrough.profile("token").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.detail(), "User not found");
    }

    #[tokio::test]
    async fn test_delete_profile() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_delete()
            .with(eq("token"))
            .times(1)
            .returning(|_| Ok(()));
        let (passthrough, _) = passthrough(mock);

        let response = passthrough.delete_profile("token").await.unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.message, "Account deleted successfully");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_recorded() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_sign_in_with_password().returning(|_| {
            Err(DeviceAuthError::Upstream(UpstreamError::Identity {
                message: "INVALID_PASSWORD".to_string(),
            }))
        });
        let (passthrough, metrics) = passthrough(mock);

        let request = LoginRequest {
            email: "a@b.c".to_string(),
            password: "wrong".to_string(),
        };
        let err = passthrough.login(&request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.detail(), "INVALID_PASSWORD");
        assert_eq!(metrics.total("device_auth_upstream_errors_total"), 1.0);
    }
}
