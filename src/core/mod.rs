//! Core Components
//!
//! Core infrastructure: HTTP transport, code generation and time.

pub mod clock;
pub mod codes;
pub mod transport;

pub use clock::*;
pub use codes::*;
pub use transport::*;
