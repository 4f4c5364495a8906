//! Identity Provider
//!
//! Identity-provider REST client and the account passthrough built on it.

pub mod client;
pub mod passthrough;

pub use client::{IdentityProvider, IdentityToolkitClient, IDP_REQUEST_URI};
pub use passthrough::{extract_id_token, federated_post_body, IdentityPassthrough};
