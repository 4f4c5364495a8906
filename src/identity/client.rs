//! Identity Provider Client
//!
//! REST client for the identity provider's account and secure-token endpoints.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{
    create_identity_error, ConfigurationError, DeviceAuthError, DeviceAuthResult, UpstreamError,
};
use crate::types::{
    AuthResponse, AuthUserProfile, IdentitySettings, LoginRequest, ProfileUpdateRequest,
    RegisterRequest,
};

/// `requestUri` sent with federated sign-in; the identity provider only checks it is a valid URL.
pub const IDP_REQUEST_URI: &str = "http://localhost";

/// Identity provider interface (for dependency injection).
///
/// Each method is exactly one upstream call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an email/password account.
    async fn sign_up(&self, request: &RegisterRequest) -> DeviceAuthResult<AuthResponse>;

    /// Email/password sign-in.
    async fn sign_in_with_password(&self, request: &LoginRequest)
        -> DeviceAuthResult<AuthResponse>;

    /// Federated sign-in with a form-encoded provider credential.
    async fn sign_in_with_idp(&self, post_body: &str) -> DeviceAuthResult<AuthResponse>;

    /// Exchange a refresh token.
    async fn refresh(&self, refresh_token: &str) -> DeviceAuthResult<AuthResponse>;

    /// Users attached to an ID token.
    async fn lookup(&self, id_token: &str) -> DeviceAuthResult<Vec<AuthUserProfile>>;

    /// Update display name and/or password.
    async fn update(
        &self,
        id_token: &str,
        request: &ProfileUpdateRequest,
    ) -> DeviceAuthResult<AuthUserProfile>;

    /// Delete the account behind an ID token.
    async fn delete(&self, id_token: &str) -> DeviceAuthResult<()>;
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AuthUserProfile>,
}

/// Identity provider client over an [`HttpTransport`].
pub struct IdentityToolkitClient<T: HttpTransport> {
    settings: IdentitySettings,
    transport: Arc<T>,
    timeout: Duration,
}

impl<T: HttpTransport> IdentityToolkitClient<T> {
    /// Create new client.
    pub fn new(settings: IdentitySettings, transport: Arc<T>, timeout: Duration) -> Self {
        Self {
            settings,
            transport,
            timeout,
        }
    }

    /// API key is present.
    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    fn api_key(&self) -> DeviceAuthResult<&str> {
        self.settings
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().as_str())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                DeviceAuthError::Configuration(ConfigurationError::MissingRequired {
                    field: "FIREBASE_API_KEY".to_string(),
                })
            })
    }

    fn accounts_url(&self, operation: &str) -> DeviceAuthResult<String> {
        let base = self.settings.identity_base_url.trim_end_matches('/');
        keyed_url(&format!("{}/accounts:{}", base, operation), self.api_key()?)
    }

    async fn post_json(
        &self,
        operation: &str,
        payload: &serde_json::Value,
    ) -> DeviceAuthResult<HttpResponse> {
        let request = HttpRequest::json(self.accounts_url(operation)?, payload)?
            .with_timeout(self.timeout);
        let response = self.transport.send(request).await?;
        check(response)
    }
}

fn keyed_url(endpoint: &str, api_key: &str) -> DeviceAuthResult<String> {
    let url = url::Url::parse_with_params(endpoint, &[("key", api_key)]).map_err(|_| {
        DeviceAuthError::Configuration(ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
        })
    })?;
    Ok(url.to_string())
}

fn check(response: HttpResponse) -> DeviceAuthResult<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(create_identity_error(&response.body))
    }
}

/// Parse a sign-in body, rejecting success responses without usable tokens.
fn token_response(response: HttpResponse) -> DeviceAuthResult<AuthResponse> {
    let auth: AuthResponse = serde_json::from_str(&response.body).map_err(|e| {
        DeviceAuthError::Upstream(UpstreamError::InvalidResponse {
            message: format!("malformed token response: {}", e),
        })
    })?;
    match auth.missing_token() {
        Some(field) => Err(DeviceAuthError::Upstream(UpstreamError::MissingToken {
            field: field.to_string(),
        })),
        None => Ok(auth),
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> IdentityProvider for IdentityToolkitClient<T> {
    async fn sign_up(&self, request: &RegisterRequest) -> DeviceAuthResult<AuthResponse> {
        let mut payload = json!({
            "email": request.email,
            "password": request.password,
            "returnSecureToken": true,
        });
        if let Some(display_name) = &request.display_name {
            payload["displayName"] = json!(display_name);
        }
        token_response(self.post_json("signUp", &payload).await?)
    }

    async fn sign_in_with_password(
        &self,
        request: &LoginRequest,
    ) -> DeviceAuthResult<AuthResponse> {
        let payload = json!({
            "email": request.email,
            "password": request.password,
            "returnSecureToken": true,
        });
        token_response(self.post_json("signInWithPassword", &payload).await?)
    }

    async fn sign_in_with_idp(&self, post_body: &str) -> DeviceAuthResult<AuthResponse> {
        let payload = json!({
            "postBody": post_body,
            "requestUri": IDP_REQUEST_URI,
            "returnSecureToken": true,
        });
        token_response(self.post_json("signInWithIdp", &payload).await?)
    }

    async fn refresh(&self, refresh_token: &str) -> DeviceAuthResult<AuthResponse> {
        let url = keyed_url(&self.settings.secure_token_url, self.api_key()?)?;
        let request = HttpRequest::form(
            url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )?
        .with_timeout(self.timeout);
        token_response(check(self.transport.send(request).await?)?)
    }

    async fn lookup(&self, id_token: &str) -> DeviceAuthResult<Vec<AuthUserProfile>> {
        let payload = json!({ "idToken": id_token });
        let response: LookupResponse = self.post_json("lookup", &payload).await?.json()?;
        Ok(response.users)
    }

    async fn update(
        &self,
        id_token: &str,
        request: &ProfileUpdateRequest,
    ) -> DeviceAuthResult<AuthUserProfile> {
        let mut payload = json!({
            "idToken": id_token,
            "returnSecureToken": true,
        });
        if let Some(display_name) = &request.display_name {
            payload["displayName"] = json!(display_name);
        }
        if let Some(password) = &request.password {
            payload["password"] = json!(password);
        }
        self.post_json("update", &payload).await?.json()
    }

    async fn delete(&self, id_token: &str) -> DeviceAuthResult<()> {
        let payload = json!({ "idToken": id_token });
        self.post_json("delete", &payload).await?;
        Ok(())
    }
}
