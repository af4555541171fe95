//! Comm module - communicator context and halo exchange.

mod context;
mod halo;

pub use context::*;
pub use halo::*;
