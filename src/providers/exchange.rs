//! Provider Exchange
//!
//! Google and GitHub authorization URLs, authorization-code exchange and the
//! hand-off to federated sign-in.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, DeviceAuthError, DeviceAuthResult, UpstreamError};
use crate::identity::{federated_post_body, IdentityProvider};
use crate::types::{AuthResponse, Provider, ProviderSettings};

pub const GOOGLE_SCOPES: &str = "openid email profile";
pub const GITHUB_SCOPES: &str = "read:user user:email";

/// Provider exchange interface (for dependency injection).
#[async_trait]
pub trait ProviderExchange: Send + Sync {
    /// Client id and secret are present for `provider`.
    fn is_configured(&self, provider: Provider) -> bool;

    /// Consent-screen URL the browser is redirected to.
    fn authorization_url(
        &self,
        provider: Provider,
        state: &str,
        callback_url: &str,
    ) -> DeviceAuthResult<String>;

    /// Trade an authorization code for the provider token used in federated sign-in.
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        callback_url: &str,
        state: &str,
    ) -> DeviceAuthResult<String>;

    /// Sign in to the identity provider with a provider token.
    async fn to_federated_identity(
        &self,
        provider: Provider,
        provider_token: &str,
    ) -> DeviceAuthResult<AuthResponse>;
}

/// Name of the token-endpoint field carrying the credential used for federated sign-in.
pub fn provider_token_field(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "id_token",
        Provider::Github => "access_token",
    }
}

#[derive(Deserialize)]
struct ProviderTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Provider exchange over an [`HttpTransport`].
pub struct OAuthProviderExchange<T: HttpTransport> {
    google: ProviderSettings,
    github: ProviderSettings,
    transport: Arc<T>,
    identity: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl<T: HttpTransport> OAuthProviderExchange<T> {
    /// Create new exchange.
    pub fn new(
        google: ProviderSettings,
        github: ProviderSettings,
        transport: Arc<T>,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            google,
            github,
            transport,
            identity,
            timeout,
        }
    }

    fn settings(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Google => &self.google,
            Provider::Github => &self.github,
        }
    }

    fn configured(&self, provider: Provider) -> DeviceAuthResult<(&ProviderSettings, &str)> {
        let settings = self.settings(provider);
        match &settings.client_secret {
            Some(secret) if settings.is_configured() => {
                Ok((settings, secret.expose_secret().as_str()))
            }
            _ => Err(ConfigurationError::ProviderNotConfigured { provider }.into()),
        }
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> ProviderExchange for OAuthProviderExchange<T> {
    fn is_configured(&self, provider: Provider) -> bool {
        self.settings(provider).is_configured()
    }

    fn authorization_url(
        &self,
        provider: Provider,
        state: &str,
        callback_url: &str,
    ) -> DeviceAuthResult<String> {
        let (settings, _) = self.configured(provider)?;
        let client_id = settings.client_id.as_str();

        let params: Vec<(&str, &str)> = match provider {
            Provider::Google => vec![
                ("client_id", client_id),
                ("redirect_uri", callback_url),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
            Provider::Github => vec![
                ("client_id", client_id),
                ("redirect_uri", callback_url),
                ("scope", GITHUB_SCOPES),
                ("state", state),
                ("allow_signup", "false"),
            ],
        };

        let url = url::Url::parse_with_params(&settings.authorization_endpoint, &params)
            .map_err(|_| ConfigurationError::InvalidEndpoint {
                url: settings.authorization_endpoint.clone(),
            })?;
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        callback_url: &str,
        state: &str,
    ) -> DeviceAuthResult<String> {
        let (settings, client_secret) = self.configured(provider)?;
        let client_id = settings.client_id.as_str();

        let form: Vec<(&str, &str)> = match provider {
            Provider::Google => vec![
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", callback_url),
                ("grant_type", "authorization_code"),
            ],
            Provider::Github => vec![
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", callback_url),
                ("state", state),
            ],
        };

        let request =
            HttpRequest::form(settings.token_endpoint.as_str(), &form)?.with_timeout(self.timeout);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(UpstreamError::ProviderRejected {
                provider,
                status: response.status,
            }
            .into());
        }

        let tokens: ProviderTokenResponse = response.json()?;
        let field = provider_token_field(provider);
        let token = match provider {
            Provider::Google => tokens.id_token,
            Provider::Github => tokens.access_token,
        };

        token.filter(|t| !t.is_empty()).ok_or_else(|| {
            UpstreamError::MissingToken {
                field: field.to_string(),
            }
            .into()
        })
    }

    async fn to_federated_identity(
        &self,
        provider: Provider,
        provider_token: &str,
    ) -> DeviceAuthResult<AuthResponse> {
        let post_body = federated_post_body(
            provider_token_field(provider),
            provider_token,
            provider.identity_provider_id(),
        );
        self.identity.sign_in_with_idp(&post_body).await
    }
}

/// Recorded call on [`MockProviderExchange`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeCall {
    ExchangeCode {
        provider: Provider,
        code: String,
        callback_url: String,
        state: String,
    },
    Federated {
        provider: Provider,
        provider_token: String,
    },
}

/// Mock provider exchange for testing.
///
/// Authorization URLs point at `https://<provider>.test/authorize`; exchange
/// results are returned in the order they were queued.
#[derive(Default)]
pub struct MockProviderExchange {
    configured: Mutex<HashSet<Provider>>,
    exchange_results: Mutex<VecDeque<DeviceAuthResult<String>>>,
    federated_results: Mutex<VecDeque<DeviceAuthResult<AuthResponse>>>,
    calls: Mutex<Vec<ExchangeCall>>,
}

impl MockProviderExchange {
    /// Create a mock with every provider configured.
    pub fn new() -> Self {
        let mock = Self::default();
        for provider in Provider::ALL {
            mock.set_configured(provider, true);
        }
        mock
    }

    /// Toggle whether `provider` counts as configured.
    pub fn set_configured(&self, provider: Provider, configured: bool) -> &Self {
        let mut set = lock(&self.configured);
        if configured {
            set.insert(provider);
        } else {
            set.remove(&provider);
        }
        drop(set);
        self
    }

    /// Queue a code-exchange result.
    pub fn queue_exchange(&self, result: DeviceAuthResult<String>) -> &Self {
        lock(&self.exchange_results).push_back(result);
        self
    }

    /// Queue a federated sign-in result.
    pub fn queue_federated(&self, result: DeviceAuthResult<AuthResponse>) -> &Self {
        lock(&self.federated_results).push_back(result);
        self
    }

    /// Calls made so far.
    pub fn get_calls(&self) -> Vec<ExchangeCall> {
        lock(&self.calls).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exhausted() -> DeviceAuthError {
    UpstreamError::InvalidResponse {
        message: "No mock result available".to_string(),
    }
    .into()
}

#[async_trait]
impl ProviderExchange for MockProviderExchange {
    fn is_configured(&self, provider: Provider) -> bool {
        lock(&self.configured).contains(&provider)
    }

    fn authorization_url(
        &self,
        provider: Provider,
        state: &str,
        callback_url: &str,
    ) -> DeviceAuthResult<String> {
        if !self.is_configured(provider) {
            return Err(ConfigurationError::ProviderNotConfigured { provider }.into());
        }
        let endpoint = format!("https://{}.test/authorize", provider.as_str());
        let url = url::Url::parse_with_params(
            &endpoint,
            &[("state", state), ("redirect_uri", callback_url)],
        )
        .map_err(|_| ConfigurationError::InvalidEndpoint { url: endpoint.clone() })?;
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        callback_url: &str,
        state: &str,
    ) -> DeviceAuthResult<String> {
        lock(&self.calls).push(ExchangeCall::ExchangeCode {
            provider,
            code: code.to_string(),
            callback_url: callback_url.to_string(),
            state: state.to_string(),
        });
        lock(&self.exchange_results)
            .pop_front()
            .unwrap_or_else(|| Err(exhausted()))
    }

    async fn to_federated_identity(
        &self,
        provider: Provider,
        provider_token: &str,
    ) -> DeviceAuthResult<AuthResponse> {
        lock(&self.calls).push(ExchangeCall::Federated {
            provider,
            provider_token: provider_token.to_string(),
        });
        lock(&self.federated_results)
            .pop_front()
            .unwrap_or_else(|| Err(exhausted()))
    }
}
