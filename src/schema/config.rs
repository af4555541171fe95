//! Configuration types for solver runs.

use serde::{Deserialize, Serialize};

use super::InitialCondition;

fn default_halo() -> usize {
    1
}

fn default_ranks() -> (usize, usize, usize) {
    (1, 1, 1)
}

fn default_gamma() -> f64 {
    5.0 / 3.0
}

fn default_cfl() -> f64 {
    0.4
}

fn default_dt_max() -> f64 {
    1.0e-2
}

fn default_rng_seed() -> u64 {
    0
}

/// Top-level solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Global grid geometry.
    pub grid: GridConfig,
    /// Rank counts per axis (px, py, pz). Total ranks = px * py * pz.
    #[serde(default = "default_ranks")]
    pub ranks: (usize, usize, usize),
    /// Boundary condition per axis, applied to both faces of that axis.
    #[serde(default)]
    pub boundaries: BoundaryConfig,
    /// Physical model parameters.
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Time integration and output cadence parameters.
    pub time: TimeConfig,
    /// Initial condition applied at setup.
    #[serde(default)]
    pub initial: InitialCondition,
    /// Seed for the run's random number generator.
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
}

/// Global structured-grid geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell counts per axis.
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Physical box lengths per axis.
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    /// Ghost-layer width on every subdomain face.
    #[serde(default = "default_halo")]
    pub halo: usize,
}

/// Boundary condition applied where a subdomain face has no neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// Wrap around to the opposite side of the global grid.
    Periodic,
    /// Mirror the interior with the normal momentum negated.
    Reflective,
    /// Zero-gradient: copy the adjacent interior layer.
    Outflow,
    /// Hold the configured ambient state in the ghost layer.
    Fixed,
}

/// Per-axis boundary conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub x: BoundaryKind,
    pub y: BoundaryKind,
    pub z: BoundaryKind,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            x: BoundaryKind::Periodic,
            y: BoundaryKind::Periodic,
            z: BoundaryKind::Periodic,
        }
    }
}

impl BoundaryConfig {
    /// Boundary kind for the given axis (0 = x, 1 = y, 2 = z).
    pub fn along(&self, axis: usize) -> BoundaryKind {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

/// Physical model parameters for the five-field fluid system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Adiabatic index of the ideal-gas closure.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Ambient state used by `Fixed` boundaries and as a perturbation base.
    #[serde(default)]
    pub ambient: FlowState,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gamma: default_gamma(),
            ambient: FlowState::default(),
        }
    }
}

/// A primitive-variable flow state (density, velocity, pressure).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowState {
    pub density: f64,
    pub velocity: (f64, f64, f64),
    pub pressure: f64,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            density: 1.0,
            velocity: (0.0, 0.0, 0.0),
            pressure: 1.0,
        }
    }
}

/// Time integration and output cadence parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Stop time.
    pub t1: f64,
    /// Snapshot output interval.
    pub dtout: f64,
    /// CFL safety factor, strictly below 1.
    #[serde(default = "default_cfl")]
    pub cfl: f64,
    /// Step-size ceiling, also the fallback when no signal limits the step.
    #[serde(default = "default_dt_max")]
    pub dt_max: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig {
                nx: 32,
                ny: 32,
                nz: 32,
                lx: 1.0,
                ly: 1.0,
                lz: 1.0,
                halo: 1,
            },
            ranks: default_ranks(),
            boundaries: BoundaryConfig::default(),
            physics: PhysicsConfig::default(),
            time: TimeConfig {
                t1: 0.1,
                dtout: 0.02,
                cfl: default_cfl(),
                dt_max: default_dt_max(),
            },
            initial: InitialCondition::default(),
            rng_seed: default_rng_seed(),
        }
    }
}

impl SolverConfig {
    /// Total number of ranks in the decomposition.
    #[inline]
    pub fn rank_count(&self) -> usize {
        self.ranks.0 * self.ranks.1 * self.ranks.2
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.nx == 0 || self.grid.ny == 0 || self.grid.nz == 0 {
            return Err(ConfigError::InvalidExtent);
        }
        if self.grid.lx <= 0.0 || self.grid.ly <= 0.0 || self.grid.lz <= 0.0 {
            return Err(ConfigError::InvalidBoxLength);
        }
        if self.grid.halo == 0 {
            return Err(ConfigError::InvalidHalo);
        }
        if self.ranks.0 == 0 || self.ranks.1 == 0 || self.ranks.2 == 0 {
            return Err(ConfigError::InvalidRanks);
        }
        if !(self.physics.gamma > 1.0) {
            return Err(ConfigError::InvalidGamma(self.physics.gamma));
        }
        if self.physics.ambient.density <= 0.0 || self.physics.ambient.pressure <= 0.0 {
            return Err(ConfigError::InvalidAmbient);
        }
        if !(self.time.t1 > 0.0) {
            return Err(ConfigError::InvalidStopTime(self.time.t1));
        }
        if !(self.time.dtout > 0.0) {
            return Err(ConfigError::InvalidOutputInterval(self.time.dtout));
        }
        if !(self.time.cfl > 0.0 && self.time.cfl < 1.0) {
            return Err(ConfigError::InvalidCfl(self.time.cfl));
        }
        if !(self.time.dt_max > 0.0) {
            return Err(ConfigError::InvalidDtMax(self.time.dt_max));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid extents (nx, ny, nz) must be non-zero")]
    InvalidExtent,
    #[error("Box lengths (lx, ly, lz) must be positive")]
    InvalidBoxLength,
    #[error("Halo width must be non-zero")]
    InvalidHalo,
    #[error("Rank counts (px, py, pz) must be non-zero")]
    InvalidRanks,
    #[error("Adiabatic index must exceed 1, got {0}")]
    InvalidGamma(f64),
    #[error("Ambient density and pressure must be positive")]
    InvalidAmbient,
    #[error("Stop time must be positive, got {0}")]
    InvalidStopTime(f64),
    #[error("Output interval must be positive, got {0}")]
    InvalidOutputInterval(f64),
    #[error("CFL factor must lie in (0, 1), got {0}")]
    InvalidCfl(f64),
    #[error("Step-size ceiling must be positive, got {0}")]
    InvalidDtMax(f64),
}
