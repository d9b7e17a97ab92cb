//! Configuration module
//!
//! Role port table and launchpad.toml loading.

mod settings;

pub use settings::*;
