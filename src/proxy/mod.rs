//! Invitation proxy module
//!
//! HTTP surface that relays invitation requests to the local agent.

mod forward;

pub use forward::*;
