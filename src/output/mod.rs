//! Output module - snapshot cadence and persistence.

mod scheduler;
mod writer;

pub use scheduler::*;
pub use writer::*;
