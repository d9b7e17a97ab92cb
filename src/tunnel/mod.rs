//! Tunnel endpoint resolution and process control
//!
//! Handles the tunnel client process lifecycle and the discovery of the
//! public endpoint it exposes for a locally bound service.

mod process;
mod resolver;

pub use process::*;
pub use resolver::*;
