//! Compute module - state buffers and the numerical core.

pub mod flux;
mod integrator;
mod operator;
pub mod state;
mod timestep;

pub use integrator::*;
pub use operator::*;
pub use state::{FieldStats, NFIELDS, StateField, field};
pub use timestep::*;
