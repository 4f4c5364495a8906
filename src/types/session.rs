//! Session Types
//!
//! Device authorization session, its lifecycle status and the token bundle
//! handed to the polling client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::AuthResponse;

/// Session lifetime in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;
/// Minimum polling interval advertised to the CLI.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// How long a finished session stays retrievable before eviction.
pub const DEFAULT_COMPLETED_GRACE_SECS: u64 = 120;

/// Browser OAuth provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    /// All supported providers.
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    /// Human-facing provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Github => "GitHub",
        }
    }

    /// Provider id understood by the identity provider's federated sign-in.
    pub fn identity_provider_id(&self) -> &'static str {
        match self {
            Self::Google => "google.com",
            Self::Github => "github.com",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            _ => Err(ValidationError::UnsupportedProvider {
                provider: s.to_string(),
            }),
        }
    }
}

/// Lifecycle stage of a device session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Authorizing,
    Complete,
    Error,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorizing => "authorizing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses only leave the store through eviction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Expired)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Authorizing) => true,
            (Self::Authorizing, Self::Authorizing) => true,
            (Self::Pending | Self::Authorizing, Self::Complete | Self::Error | Self::Expired) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Federated token bundle returned to the CLI on a successful poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

impl TokenBundle {
    /// Build the bundle from a federated sign-in result.
    pub fn from_auth_response(provider: Provider, auth: AuthResponse) -> Self {
        Self {
            id_token: auth.id_token,
            refresh_token: auth.refresh_token,
            expires_in: auth.expires_in,
            provider,
            email: auth.email,
            local_id: auth.local_id,
        }
    }
}

/// One device authorization session.
///
/// Owned by the session store; everything outside it works on snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSession {
    /// Secret polling key, only ever returned to the CLI.
    pub device_code: String,
    /// Code shown to the human, `XXXX-XXXX`.
    pub user_code: String,
    /// `user_code` without separators, upper-cased.
    pub normalized_user_code: String,
    pub provider: Provider,
    /// OAuth `state` echoed back by the provider.
    pub state: String,
    pub status: SessionStatus,
    pub created_at: i64,
    pub expires_at: i64,
    pub completed_at: Option<i64>,
    pub last_touched: Option<i64>,
    /// Present only when `status` is `Complete`.
    pub tokens: Option<TokenBundle>,
    /// Present only when `status` is `Error`.
    pub error: Option<String>,
}

impl DeviceSession {
    /// Create a pending session.
    pub fn new(
        device_code: String,
        user_code: String,
        normalized_user_code: String,
        provider: Provider,
        state: String,
        created_at: i64,
        ttl_secs: u64,
    ) -> Self {
        Self {
            device_code,
            user_code,
            normalized_user_code,
            provider,
            state,
            status: SessionStatus::Pending,
            created_at,
            expires_at: created_at + ttl_secs as i64,
            completed_at: None,
            last_touched: None,
            tokens: None,
            error: None,
        }
    }

    /// Check whether the TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
