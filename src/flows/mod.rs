//! Device Authorization Flows
//!
//! Device authorization grant bridged onto browser OAuth providers.
//!
//! - **start**: CLI requests a device code and user code
//! - **submit**: human enters the user code and is sent to the provider
//! - **callback**: provider returns; tokens are exchanged and federated
//! - **poll**: CLI collects the token bundle exactly once

pub mod device;

pub use device::{DeviceFlowService, DeviceFlowSettings};
