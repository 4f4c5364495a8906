//! Configuration Builder
//!
//! Fluent builder and environment loading for the server configuration.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ConfigurationError, DeviceAuthError};
use crate::types::{
    IdentitySettings, ProviderSettings, ServerConfig, SessionSettings, DEFAULT_PORT,
    DEFAULT_ROUTE_PREFIX, DEFAULT_TIMEOUT,
};

/// Sweep period used by the binary when `DEVICE_SWEEP_INTERVAL_SECS` is unset.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Server configuration builder.
pub struct ServerConfigBuilder {
    google: ProviderSettings,
    github: ProviderSettings,
    identity: IdentitySettings,
    session: SessionSettings,
    timeout: Duration,
    bind_addr: SocketAddr,
    route_prefix: String,
    public_base_url: Option<String>,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
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

    /// Set Google client credentials.
    pub fn google_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.google = self.google.with_credentials(client_id, client_secret);
        self
    }

    /// Set GitHub client credentials.
    pub fn github_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.github = self.github.with_credentials(client_id, client_secret);
        self
    }

    /// Override Google authorization and token endpoints.
    pub fn google_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.google.authorization_endpoint = authorization_endpoint.into();
        self.google.token_endpoint = token_endpoint.into();
        self
    }

    /// Override GitHub authorization and token endpoints.
    pub fn github_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.github.authorization_endpoint = authorization_endpoint.into();
        self.github.token_endpoint = token_endpoint.into();
        self
    }

    /// Set identity provider API key.
    pub fn identity_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.identity.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    /// Override identity provider endpoints.
    pub fn identity_endpoints(
        mut self,
        identity_base_url: impl Into<String>,
        secure_token_url: impl Into<String>,
    ) -> Self {
        self.identity.identity_base_url = identity_base_url.into();
        self.identity.secure_token_url = secure_token_url.into();
        self
    }

    /// Set device session lifetime.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session.ttl_secs = ttl.as_secs();
        self
    }

    /// Set polling interval advertised to the CLI.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.session.poll_interval_secs = interval.as_secs();
        self
    }

    /// Set how long finished sessions stay retrievable.
    pub fn completed_grace(mut self, grace: Duration) -> Self {
        self.session.completed_grace_secs = grace.as_secs();
        self
    }

    /// Enable the background sweep.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.session.sweep_interval = Some(interval);
        self
    }

    /// Set outbound request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set listen address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Listen on all interfaces at `port`.
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        self
    }

    /// Set the prefix the auth routes are mounted under.
    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = prefix.into();
        self
    }

    /// Use a fixed public origin instead of request headers.
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// Load settings from environment variables.
    pub fn from_env(self) -> Result<Self, DeviceAuthError> {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`; unset or empty keys leave defaults in place.
    pub fn from_lookup<F>(mut self, lookup: F) -> Result<Self, DeviceAuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(api_key) = get("FIREBASE_API_KEY") {
            self = self.identity_api_key(api_key);
        }
        if let (Some(id), Some(secret)) = (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            self = self.google_credentials(id, secret);
        }
        if let (Some(id), Some(secret)) = (get("GITHUB_CLIENT_ID"), get("GITHUB_CLIENT_SECRET")) {
            self = self.github_credentials(id, secret);
        }
        if let Some(port) = get("PORT") {
            self = self.port(parse_number("PORT", &port)?);
        }
        if let Some(url) = get("PUBLIC_BASE_URL") {
            self = self.public_base_url(url);
        }
        if let Some(ttl) = get("DEVICE_SESSION_TTL_SECS") {
            self = self.session_ttl(Duration::from_secs(parse_number(
                "DEVICE_SESSION_TTL_SECS",
                &ttl,
            )?));
        }
        if let Some(grace) = get("DEVICE_SESSION_GRACE_SECS") {
            self = self.completed_grace(Duration::from_secs(parse_number(
                "DEVICE_SESSION_GRACE_SECS",
                &grace,
            )?));
        }
        let sweep = match get("DEVICE_SWEEP_INTERVAL_SECS") {
            Some(secs) => parse_number("DEVICE_SWEEP_INTERVAL_SECS", &secs)?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };
        if sweep > 0 {
            self = self.sweep_interval(Duration::from_secs(sweep));
        }

        Ok(self)
    }

    /// Build the server configuration.
    pub fn build(self) -> Result<ServerConfig, DeviceAuthError> {
        if self.session.ttl_secs == 0 {
            return Err(invalid("session TTL must be positive"));
        }
        if self.session.poll_interval_secs == 0 {
            return Err(invalid("poll interval must be positive"));
        }
        if self.session.poll_interval_secs >= self.session.ttl_secs {
            return Err(invalid("poll interval must be shorter than the session TTL"));
        }
        if matches!(self.session.sweep_interval, Some(d) if d.is_zero()) {
            return Err(invalid("sweep interval must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive"));
        }
        if !self.route_prefix.is_empty()
            && (!self.route_prefix.starts_with('/') || self.route_prefix.ends_with('/'))
        {
            return Err(invalid(
                "route prefix must start with '/' and not end with '/'",
            ));
        }

        for endpoint in [
            &self.google.authorization_endpoint,
            &self.google.token_endpoint,
            &self.github.authorization_endpoint,
            &self.github.token_endpoint,
            &self.identity.identity_base_url,
            &self.identity.secure_token_url,
        ] {
            validate_url(endpoint)?;
        }

        let public_base_url = match self.public_base_url {
            Some(url) => {
                validate_url(&url)?;
                Some(url.trim_end_matches('/').to_string())
            }
            None => None,
        };

        Ok(ServerConfig {
            google: self.google,
            github: self.github,
            identity: self.identity,
            session: self.session,
            timeout: self.timeout,
            bind_addr: self.bind_addr,
            route_prefix: self.route_prefix,
            public_base_url,
        })
    }
}

fn invalid(message: &str) -> DeviceAuthError {
    DeviceAuthError::Configuration(ConfigurationError::InvalidConfig {
        message: message.to_string(),
    })
}

fn validate_url(url: &str) -> Result<(), DeviceAuthError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(DeviceAuthError::Configuration(
            ConfigurationError::InvalidEndpoint {
                url: url.to_string(),
            },
        )),
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, DeviceAuthError> {
    value
        .parse()
        .map_err(|_| invalid(&format!("{} must be a non-negative integer, got '{}'", key, value)))
}

impl ServerConfig {
    /// Configuration from environment variables.
    pub fn from_env() -> Result<Self, DeviceAuthError> {
        ServerConfigBuilder::new().from_env()?.build()
    }
}

/// Create a new server configuration builder.
pub fn server_config() -> ServerConfigBuilder {
    ServerConfigBuilder::new()
}
