//! Device Authorization Types
//!
//! Core type definitions for the device flow and identity passthrough.

pub mod auth;
pub mod callback;
pub mod config;
pub mod device;
pub mod session;

pub use auth::*;
pub use callback::*;
pub use config::*;
pub use device::*;
pub use session::*;
