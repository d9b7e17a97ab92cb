//! Agent bootstrap module
//!
//! Sequences one agent launch: tunnel acquisition, endpoint resolution,
//! then agent process start with the endpoint injected.

mod launch;
mod sequencer;

pub use launch::*;
pub use sequencer::*;
