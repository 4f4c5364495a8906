//! Device Authorization Error Types
//!
//! Layered error hierarchy with HTTP status mapping.

use std::time::Duration;
use thiserror::Error;

use crate::types::{Provider, SessionStatus};

/// Root error type for the device authorization bridge.
#[derive(Error, Debug)]
pub enum DeviceAuthError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Expired: {0}")]
    Expired(#[from] ExpiredError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DeviceAuthError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "DEVICE_AUTH_VALIDATION",
            Self::Authentication(_) => "DEVICE_AUTH_AUTHENTICATION",
            Self::Configuration(_) => "DEVICE_AUTH_CONFIG",
            Self::NotFound(_) => "DEVICE_AUTH_NOT_FOUND",
            Self::Expired(_) => "DEVICE_AUTH_EXPIRED",
            Self::Upstream(_) => "DEVICE_AUTH_UPSTREAM",
            Self::Session(_) => "DEVICE_AUTH_SESSION",
            Self::Network(_) => "DEVICE_AUTH_NETWORK",
            Self::Protocol(_) => "DEVICE_AUTH_PROTOCOL",
        }
    }

    /// HTTP status code this error surfaces as on JSON endpoints.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Authentication(_) => 401,
            Self::Configuration(_) => 500,
            Self::NotFound(_) => 404,
            Self::Expired(_) => 410,
            Self::Upstream(_) | Self::Network(_) | Self::Protocol(_) => 400,
            Self::Session(SessionError::NotFound { .. }) => 404,
            Self::Session(_) => 500,
        }
    }

    /// Client-facing message, without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Authentication(e) => e.to_string(),
            Self::Configuration(e) => e.to_string(),
            Self::NotFound(e) => e.to_string(),
            Self::Expired(e) => e.to_string(),
            Self::Upstream(e) => e.to_string(),
            Self::Session(e) => e.to_string(),
            Self::Network(e) => e.to_string(),
            Self::Protocol(e) => e.to_string(),
        }
    }

    /// Check if the failure came from a provider or the identity provider.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_) | Self::Network(_) | Self::Protocol(_)
        )
    }

    /// Check if the error is a server misconfiguration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Malformed request input.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid request")]
    InvalidRequest,

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unsupported provider")]
    UnsupportedProvider { provider: String },

    #[error("{message}")]
    InvalidField { message: String },
}

/// Missing or malformed caller credentials.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("missing authorization header")]
    MissingToken,

    #[error("invalid authorization header")]
    InvalidHeader,
}

/// Server configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("{} OAuth is not configured on the server", provider.as_str())]
    ProviderNotConfigured { provider: Provider },

    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Lookup failures.
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("Unknown device code")]
    DeviceCode,

    #[error("Session not found or expired")]
    State,

    #[error("User not found")]
    User,
}

/// Time-bound failures.
#[derive(Error, Debug)]
pub enum ExpiredError {
    #[error("Device authorization expired")]
    Session,
}

/// Provider or identity-provider failure.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{} authorization failed (HTTP {status})", provider.display_name())]
    ProviderRejected { provider: Provider, status: u16 },

    #[error("Missing {field} in provider response")]
    MissingToken { field: String },

    #[error("{message}")]
    Identity { message: String },

    #[error("Invalid upstream response: {message}")]
    InvalidResponse { message: String },
}

/// Session store error.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown device code")]
    NotFound { device_code_fingerprint: String },

    #[error("Session key collision on {index} index")]
    Conflict { index: &'static str },

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Failed to build HTTP client: {message}")]
    ClientBuild { message: String },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Result type for device authorization operations.
pub type DeviceAuthResult<T> = Result<T, DeviceAuthError>;

/// Error body returned by the identity provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IdentityErrorResponse {
    pub error: IdentityErrorBody,
}

/// Inner error object of an identity-provider error body.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IdentityErrorBody {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Parse the identity-provider error message out of an HTTP body.
pub fn parse_identity_error(body: &str) -> Option<String> {
    serde_json::from_str::<IdentityErrorResponse>(body)
        .ok()
        .and_then(|response| response.error.message)
}

/// Create an upstream error from a failed identity-provider response.
pub fn create_identity_error(body: &str) -> DeviceAuthError {
    let message = parse_identity_error(body).unwrap_or_else(|| "identity_provider_error".to_string());
    DeviceAuthError::Upstream(UpstreamError::Identity { message })
}
