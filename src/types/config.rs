//! Configuration Types
//!
//! Server, provider and identity-provider configuration.

use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::time::Duration;

use super::session::{
    DEFAULT_COMPLETED_GRACE_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SESSION_TTL_SECS,
};
use super::Provider;

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GITHUB_AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
pub const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Default timeout for outbound calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default prefix under which the auth routes are mounted.
pub const DEFAULT_ROUTE_PREFIX: &str = "/api/v1/auth";
pub const DEFAULT_PORT: u16 = 8000;

/// Complete server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub google: ProviderSettings,
    pub github: ProviderSettings,
    pub identity: IdentitySettings,
    pub session: SessionSettings,
    /// Outbound HTTP timeout.
    pub timeout: Duration,
    pub bind_addr: SocketAddr,
    pub route_prefix: String,
    /// Overrides the origin derived from request headers.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            google: ProviderSettings::google(),
            github: ProviderSettings::github(),
            identity: IdentitySettings::default(),
            session: SessionSettings::default(),
            timeout: DEFAULT_TIMEOUT,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Settings for one provider.
    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Google => &self.google,
            Provider::Github => &self.github,
        }
    }

    /// Providers with both client id and secret present.
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.provider(*p).is_configured())
            .collect()
    }
}

/// OAuth client registration and endpoints for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

impl ProviderSettings {
    /// Unconfigured Google settings with production endpoints.
    pub fn google() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            authorization_endpoint: GOOGLE_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Unconfigured GitHub settings with production endpoints.
    pub fn github() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            authorization_endpoint: GITHUB_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GITHUB_TOKEN_ENDPOINT.to_string(),
        }
    }

    /// Set client credentials.
    pub fn with_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Both client id and secret are present.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && self
                .client_secret
                .as_ref()
                .map(|s| !s.expose_secret().is_empty())
                .unwrap_or(false)
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Identity provider endpoints and API key.
#[derive(Clone)]
pub struct IdentitySettings {
    pub api_key: Option<SecretString>,
    pub identity_base_url: String,
    pub secure_token_url: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            identity_base_url: IDENTITY_BASE_URL.to_string(),
            secure_token_url: SECURE_TOKEN_URL.to_string(),
        }
    }
}

impl IdentitySettings {
    /// API key is present and non-empty.
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_ref()
            .map(|k| !k.expose_secret().is_empty())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("api_key", &"[REDACTED]")
            .field("identity_base_url", &self.identity_base_url)
            .field("secure_token_url", &self.secure_token_url)
            .finish()
    }
}

/// Device session lifecycle settings.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub poll_interval_secs: u64,
    pub completed_grace_secs: u64,
    /// Period of the background sweep; `None` relies on request-driven sweeps only.
    pub sweep_interval: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            completed_grace_secs: DEFAULT_COMPLETED_GRACE_SECS,
            sweep_interval: None,
        }
    }
}
