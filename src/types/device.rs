//! Device Authorization Types
//!
//! Requests, responses and outcomes of the device flow.

use serde::{Deserialize, Serialize};

use super::TokenBundle;

/// Body of `POST device/start`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceStartRequest {
    pub provider: String,
}

/// Device authorization response returned to the CLI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStartResponse {
    /// Device verification code (not shown to user).
    pub device_code: String,
    /// User code to display.
    pub user_code: String,
    /// URI for user to visit.
    pub verification_uri: String,
    /// URI with code pre-filled.
    pub verification_uri_complete: String,
    /// Minimum polling interval in seconds.
    pub interval: u64,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Body of `POST device/poll`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DevicePollRequest {
    pub device_code: String,
}

/// Result of one poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// Authorization still pending (user hasn't completed yet).
    Pending,
    /// Tokens ready; the session has been consumed.
    Complete(TokenBundle),
    /// Authorization failed; the session has been consumed.
    Failed { detail: String },
    /// Session outlived its TTL; the session has been consumed.
    Expired,
    /// No such device code.
    Unknown,
}

impl PollOutcome {
    /// HTTP status for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Pending => 202,
            Self::Complete(_) => 200,
            Self::Failed { .. } => 400,
            Self::Expired => 410,
            Self::Unknown => 404,
        }
    }

    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete(_) => "complete",
            Self::Failed { .. } => "error",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

/// `{"status": "pending"}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub status: String,
}

impl PendingResponse {
    pub fn pending() -> Self {
        Self {
            status: "pending".to_string(),
        }
    }
}

/// `{"detail": "..."}` error body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Human-facing verification page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DevicePage {
    pub message: String,
    /// Code to pre-fill in the form.
    pub code: String,
    pub is_error: bool,
    pub show_form: bool,
}

impl DevicePage {
    /// Entry form.
    pub fn form(message: impl Into<String>, code: impl Into<String>, is_error: bool) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            is_error,
            show_form: true,
        }
    }

    /// Result page without the form.
    pub fn result(message: impl Into<String>, is_error: bool) -> Self {
        Self {
            message: message.into(),
            code: String::new(),
            is_error,
            show_form: false,
        }
    }
}

/// Result of the human submitting a user code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Send the browser to the provider consent screen (HTTP 302).
    Redirect(String),
    /// Re-render the entry form.
    Page(DevicePage),
}
