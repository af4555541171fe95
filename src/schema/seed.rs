//! Initial conditions applied to the state buffer at setup.
//!
//! Conditions are evaluated in global coordinates so that a decomposed run
//! produces the same field as a single-rank run of the same configuration.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::FlowState;
use crate::compute::flux::conserved;
use crate::compute::state::StateField;
use crate::grid::{GlobalGrid, Subdomain};

/// Predefined initial conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InitialCondition {
    /// A single flow state everywhere.
    Uniform {
        state: FlowState,
    },
    /// Ambient flow with a Gaussian bump in density and pressure.
    GaussianPulse {
        /// Background state.
        base: FlowState,
        /// Pulse center as fractions of the box lengths.
        center: (f64, f64, f64),
        /// Pulse radius as a fraction of the shortest box length.
        radius: f64,
        /// Peak relative amplitude added to density and pressure.
        amplitude: f64,
    },
    /// Two half-spaces split across one axis (a Riemann problem).
    ShockTube {
        /// Split axis (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// Split position as a fraction of the box length along `axis`.
        position: f64,
        left: FlowState,
        right: FlowState,
    },
    /// Ambient flow with Gaussian random noise in density and pressure.
    Perturbed {
        base: FlowState,
        /// Standard deviation of the relative perturbation.
        amplitude: f64,
    },
}

impl Default for InitialCondition {
    fn default() -> Self {
        Self::GaussianPulse {
            base: FlowState::default(),
            center: (0.5, 0.5, 0.5),
            radius: 0.1,
            amplitude: 0.5,
        }
    }
}

impl InitialCondition {
    /// Fill the interior of `q` on this rank's subdomain.
    ///
    /// Ghost layers are left untouched; the first halo exchange fills them.
    pub fn apply(
        &self,
        q: &mut StateField,
        sub: &Subdomain,
        grid: &GlobalGrid,
        gamma: f64,
        rng: &mut StdRng,
    ) {
        let (dx, dy, dz) = grid.spacing();
        let ng = sub.halo;

        for k in 0..sub.nz {
            for j in 0..sub.ny {
                for i in 0..sub.nx {
                    let x = (sub.ix0 + i) as f64 * dx + 0.5 * dx;
                    let y = (sub.iy0 + j) as f64 * dy + 0.5 * dy;
                    let z = (sub.iz0 + k) as f64 * dz + 0.5 * dz;

                    let state = self.evaluate(x, y, z, grid, rng);
                    let u = conserved(&state, gamma);
                    q.cell_mut(i + ng, j + ng, k + ng).copy_from_slice(&u);
                }
            }
        }
    }

    fn evaluate(&self, x: f64, y: f64, z: f64, grid: &GlobalGrid, rng: &mut StdRng) -> FlowState {
        match self {
            Self::Uniform { state } => *state,
            Self::GaussianPulse {
                base,
                center,
                radius,
                amplitude,
            } => {
                let cx = center.0 * grid.lx;
                let cy = center.1 * grid.ly;
                let cz = center.2 * grid.lz;
                let r = radius * grid.lx.min(grid.ly).min(grid.lz);
                let sigma_sq = (r / 2.0).powi(2);
                let dist_sq = (x - cx).powi(2) + (y - cy).powi(2) + (z - cz).powi(2);
                let bump = amplitude * (-dist_sq / (2.0 * sigma_sq)).exp();

                let mut state = *base;
                state.density *= 1.0 + bump;
                state.pressure *= 1.0 + bump;
                state
            }
            Self::ShockTube {
                axis,
                position,
                left,
                right,
            } => {
                let (coord, length) = match axis {
                    0 => (x, grid.lx),
                    1 => (y, grid.ly),
                    _ => (z, grid.lz),
                };
                if coord < position * length { *left } else { *right }
            }
            Self::Perturbed { base, amplitude } => {
                // Fall back to uniform noise if the width is degenerate.
                let noise = match Normal::new(0.0, *amplitude) {
                    Ok(normal) => normal.sample(rng),
                    Err(_) => rng.gen_range(-amplitude.abs()..=amplitude.abs()),
                };
                let mut state = *base;
                state.density *= (1.0 + noise).max(0.1);
                state.pressure *= (1.0 + noise).max(0.1);
                state
            }
        }
    }
}
