//! Error types shared across the solver.

use crate::schema::ConfigError;

/// Result alias used by every fallible solver operation.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors produced by solver operations.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The requested rank layout cannot tile the grid.
    #[error("cannot split {extent} cells along {axis} across {ranks} ranks")]
    Partition {
        axis: char,
        extent: usize,
        ranks: usize,
    },

    /// A state buffer does not match the subdomain it was paired with.
    #[error("state buffer holds {got} values, expected {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    /// The state left the physical regime and the run cannot continue.
    #[error("unstable state at step {step}: {detail}")]
    UnstableState { step: u64, detail: String },

    /// A rank could not talk to its peers.
    #[error("communication failure: {0}")]
    Comm(String),

    /// A snapshot could not be persisted.
    #[error("snapshot write failed: {0}")]
    Snapshot(#[from] std::io::Error),
}
