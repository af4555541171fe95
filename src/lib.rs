//! Conflux - Distributed explicit solver for conservation-law PDEs.
//!
//! This crate provides a time-stepping engine for a five-field compressible
//! fluid system on a distributed structured grid: Cartesian domain
//! decomposition with ghost-cell halo exchange, SSP Runge-Kutta stage
//! integration over a pluggable spatial operator, CFL step-size control, and
//! cadence-driven snapshot output.
//!
//! # Architecture
//!
//! - `schema`: configuration and initial-condition types
//! - `grid`: global geometry, subdomains, and the decomposition
//! - `comm`: communicator context and halo exchange
//! - `compute`: state buffers, fluxes, the spatial operator, and stepping
//! - `output`: snapshot cadence and persistence
//! - `runtime`: the per-rank solver lifecycle
//!
//! # Example
//!
//! ```rust,no_run
//! use conflux::{
//!     comm::SingleRank,
//!     output::NullSnapshotWriter,
//!     runtime::Solver,
//!     schema::SolverConfig,
//! };
//!
//! let config = SolverConfig::default();
//! let mut solver = Solver::setup(
//!     config,
//!     Box::new(SingleRank::new()),
//!     Box::new(NullSnapshotWriter::default()),
//! )
//! .unwrap();
//!
//! let report = solver.run().unwrap();
//! println!("{} steps to t = {}", report.steps, report.final_time);
//! solver.cleanup().unwrap();
//! ```

pub mod comm;
pub mod compute;
pub mod error;
pub mod grid;
pub mod output;
pub mod runtime;
pub mod schema;

// Re-export commonly used types
pub use error::{SolverError, SolverResult};
pub use runtime::{RunReport, Solver, run_rank_group, run_standalone};
pub use schema::SolverConfig;
