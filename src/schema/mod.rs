//! Schema module - configuration and initial-condition types.

mod config;
mod seed;

pub use config::*;
pub use seed::*;
