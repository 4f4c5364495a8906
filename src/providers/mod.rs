//! OAuth Providers
//!
//! Browser-side provider integration for the device flow.

pub mod exchange;

pub use exchange::{
    provider_token_field, ExchangeCall, MockProviderExchange, OAuthProviderExchange,
    ProviderExchange, GITHUB_SCOPES, GOOGLE_SCOPES,
};
