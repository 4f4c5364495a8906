//! Session Management
//!
//! Device session storage and background expiry.

pub mod store;
pub mod sweeper;

pub use store::{Claim, InMemorySessionStore, SessionStore, SweepStats};
pub use sweeper::spawn_sweeper;
