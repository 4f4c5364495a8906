//! Device Authorization Bridge
//!
//! Lets a command-line client sign a user in through Google or GitHub in a
//! browser, federates the provider token into an identity provider, and hands
//! the resulting credentials back to the CLI through device-code polling.
//!
//! # Flow
//!
//! 1. The CLI calls `POST device/start` with a provider and receives a
//!    device code, a user code and a verification URL.
//! 2. The user opens the verification page, enters the user code and is
//!    redirected to the provider's consent screen.
//! 3. The provider redirects back to `device/callback/{provider}`; the
//!    authorization code is exchanged and federated into the identity provider.
//! 4. The CLI polls `POST device/poll` until it receives the token bundle,
//!    which is handed out exactly once.
//!
//! Account passthrough routes (`register`, `login`, `login/provider`,
//! `refresh`, `me`) forward directly to the identity provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use device_auth_integration::{server, server_config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = server_config()
//!         .identity_api_key("api-key")
//!         .github_credentials("client-id", "client-secret")
//!         .port(8000)
//!         .build()?;
//!
//!     server::run(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: wire types, sessions and configuration
//! - `error`: error hierarchy with HTTP status mapping
//! - `core`: HTTP transport, code generation and clock
//! - `session`: device session store and background sweeper
//! - `providers`: Google/GitHub authorization URLs and code exchange
//! - `identity`: identity provider client and account passthrough
//! - `flows`: the device authorization state machine
//! - `server`: axum routes and verification pages
//! - `builders`: fluent configuration builder
//! - `telemetry`: logging and metrics seams

pub mod builders;
pub mod core;
pub mod error;
pub mod flows;
pub mod identity;
pub mod providers;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod types;

// Re-export builders
pub use builders::{server_config, ServerConfigBuilder};

// Re-export core types
pub use crate::core::{
    Clock, CodeGenerator, DefaultCodeGenerator, HttpTransport, MockClock, MockHttpTransport,
    ReqwestHttpTransport, SequenceCodeGenerator, SystemClock,
};

// Re-export errors
pub use error::{DeviceAuthError, DeviceAuthResult};

// Re-export services
pub use flows::{DeviceFlowService, DeviceFlowSettings};
pub use identity::{IdentityPassthrough, IdentityProvider, IdentityToolkitClient};
pub use providers::{MockProviderExchange, OAuthProviderExchange, ProviderExchange};
pub use server::{build_router, AppState};
pub use session::{InMemorySessionStore, SessionStore};

// Re-export types
pub use types::{
    DevicePage, DeviceSession, DeviceStartResponse, PollOutcome, Provider, RequestOrigin,
    ServerConfig, SessionStatus, SubmitOutcome, TokenBundle,
};
