//! Identity Types
//!
//! Request and response shapes for the identity passthrough.

use serde::{Deserialize, Deserializer, Serialize};

/// Normalized identity-provider sign-in result.
///
/// Accepts camelCase or snake_case keys on input; always emits snake_case.
/// Both tokens and the lifetime are required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "idToken")]
    pub id_token: String,
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    #[serde(alias = "expiresIn", deserialize_with = "deserialize_expires_in")]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        alias = "localId",
        alias = "user_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub local_id: Option<String>,
}

/// Account profile as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(alias = "localId")]
    pub local_id: String,
    #[serde(alias = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(alias = "emailVerified", default)]
    pub email_verified: bool,
    #[serde(default)]
    pub disabled: bool,
}

/// Email/password sign-up.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Email/password sign-in.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Direct provider-token sign-in, bypassing the device flow.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProviderLoginRequest {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Refresh-token exchange.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Profile update.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProfileUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Account deletion acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccountResponse {
    pub status: String,
    pub message: String,
}

impl DeleteAccountResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: "Account deleted successfully".to_string(),
        }
    }
}

impl AuthResponse {
    /// Name of the first token field that came back empty.
    pub fn missing_token(&self) -> Option<&'static str> {
        if self.id_token.trim().is_empty() {
            Some("idToken")
        } else if self.refresh_token.trim().is_empty() {
            Some("refreshToken")
        } else {
            None
        }
    }
}

// The identity provider reports `expiresIn` as a decimal string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("invalid expiresIn: {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("invalid expiresIn: {:?}", s))),
        other => Err(D::Error::custom(format!("invalid expiresIn: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_auth_response_camel_case() {
        let json = r#"{
            "idToken": "id-123",
            "refreshToken": "refresh-456",
            "expiresIn": "3600",
            "email": "user@example.com",
            "localId": "uid-789",
            "kind": "identitytoolkit#VerifyAssertionResponse"
        }"#;

        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id_token, "id-123");
        assert_eq!(response.refresh_token, "refresh-456");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.email.as_deref(), Some("user@example.com"));
        assert_eq!(response.local_id.as_deref(), Some("uid-789"));
    }

    #[test]
    fn test_auth_response_snake_case() {
        let json = r#"{
            "id_token": "id-123",
            "refresh_token": "refresh-456",
            "expires_in": 3600,
            "user_id": "uid-789",
            "token_type": "Bearer"
        }"#;

        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.local_id.as_deref(), Some("uid-789"));
        assert!(response.email.is_none());
    }

    #[test]
    fn test_auth_response_serializes_snake_case() {
        let response = AuthResponse {
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 60,
            email: None,
            local_id: Some("uid".to_string()),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id_token": "id",
                "refresh_token": "refresh",
                "expires_in": 60,
                "local_id": "uid"
            })
        );
    }

    #[test]
    fn test_auth_response_requires_tokens_and_lifetime() {
        let missing = r#"{"kind": "identitytoolkit#VerifyAssertionResponse"}"#;
        assert!(serde_json::from_str::<AuthResponse>(missing).is_err());

        let no_refresh = r#"{"idToken": "id", "expiresIn": "3600"}"#;
        assert!(serde_json::from_str::<AuthResponse>(no_refresh).is_err());

        let bad_lifetime = r#"{"idToken": "id", "refreshToken": "rt", "expiresIn": "soon"}"#;
        assert!(serde_json::from_str::<AuthResponse>(bad_lifetime).is_err());

        let negative = r#"{"idToken": "id", "refreshToken": "rt", "expiresIn": -5}"#;
        assert!(serde_json::from_str::<AuthResponse>(negative).is_err());
    }

    #[test]
    fn test_missing_token_reports_empty_field() {
        let json = r#"{"idToken": "", "refreshToken": "rt", "expiresIn": 60}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.missing_token(), Some("idToken"));

        let json = r#"{"idToken": "id", "refreshToken": " ", "expiresIn": 60}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.missing_token(), Some("refreshToken"));

        let json = r#"{"idToken": "id", "refreshToken": "rt", "expiresIn": 60}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.missing_token(), None);
    }

    #[test]
    fn test_profile_from_lookup_user() {
        let json = r#"{
            "localId": "uid-1",
            "email": "user@example.com",
            "displayName": "User",
            "emailVerified": true,
            "passwordHash": "ignored"
        }"#;

        let profile: AuthUserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.local_id, "uid-1");
        assert_eq!(profile.display_name.as_deref(), Some("User"));
        assert!(profile.email_verified);
        assert!(!profile.disabled);
    }
}
