//! Callback Types
//!
//! Provider redirect parameters and the public origin used to build
//! verification and callback URLs.

use serde::Deserialize;

use super::Provider;

/// Callback parameters from authorization redirect.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code (if success).
    #[serde(default)]
    pub code: Option<String>,
    /// State parameter.
    #[serde(default)]
    pub state: Option<String>,
    /// Error code (if authorization failed).
    #[serde(default)]
    pub error: Option<String>,
    /// Error description.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Non-empty state, if any.
    pub fn state(&self) -> Option<&str> {
        non_empty(&self.state)
    }

    /// Non-empty authorization code, if any.
    pub fn code(&self) -> Option<&str> {
        non_empty(&self.code)
    }

    /// Non-empty provider error, if any.
    pub fn error(&self) -> Option<&str> {
        non_empty(&self.error)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Scheme and host the browser used to reach this server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOrigin {
    base: String,
}

impl RequestOrigin {
    /// Build from a scheme and a host (with optional port).
    pub fn new(scheme: &str, host: &str) -> Self {
        Self {
            base: format!("{}://{}", scheme, host),
        }
    }

    /// Build from a configured public base URL such as `https://auth.example.com`.
    pub fn from_base_url(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Derive the origin from forwarded headers.
    pub fn from_headers(forwarded_proto: Option<&str>, host: Option<&str>) -> Self {
        let scheme = match forwarded_proto {
            Some(proto) if proto.trim().eq_ignore_ascii_case("https") => "https",
            _ => "http",
        };
        let host = host.filter(|h| !h.is_empty()).unwrap_or("localhost");
        Self::new(scheme, host)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Verification page URL.
    pub fn verification_uri(&self, route_prefix: &str) -> String {
        self.url(&format!("{}/device", route_prefix))
    }

    /// Provider callback URL.
    pub fn callback_uri(&self, route_prefix: &str, provider: Provider) -> String {
        self.url(&format!(
            "{}/device/callback/{}",
            route_prefix,
            provider.as_str()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_params_from_query() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc123&state=xyz789").unwrap();

        assert_eq!(params.code(), Some("abc123"));
        assert_eq!(params.state(), Some("xyz789"));
        assert!(params.error().is_none());
    }

    #[test]
    fn test_callback_params_error() {
        let params: CallbackParams = serde_urlencoded::from_str(
            "error=access_denied&error_description=User%20denied&code=&state=",
        )
        .unwrap();

        assert!(params.code().is_none());
        assert!(params.state().is_none());
        assert_eq!(params.error(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User denied"));
    }

    #[test]
    fn test_origin_from_headers() {
        let origin = RequestOrigin::from_headers(Some("https"), Some("auth.example.com"));
        assert_eq!(
            origin.verification_uri("/api/v1/auth"),
            "https://auth.example.com/api/v1/auth/device"
        );

        let origin = RequestOrigin::from_headers(None, Some("localhost:8000"));
        assert_eq!(
            origin.callback_uri("/api/v1/auth", Provider::Github),
            "http://localhost:8000/api/v1/auth/device/callback/github"
        );
    }

    #[test]
    fn test_origin_from_base_url_trims_slash() {
        let origin = RequestOrigin::from_base_url("https://auth.example.com/");
        assert_eq!(origin.base(), "https://auth.example.com");
    }
}
