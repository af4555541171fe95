//! Spatial discretization of the conservation law.
//!
//! The engine is discretization-agnostic: the stage integrator only sees the
//! [`SpatialOperator`] trait. The provided implementation is a first-order
//! finite-volume scheme with Rusanov interface fluxes.

use rayon::prelude::*;

use crate::grid::{GlobalGrid, Subdomain};

use super::flux::rusanov_flux;
use super::state::{NFIELDS, StateField};

/// Evaluates the rate of change of the conserved fields.
///
/// `q` must have freshly exchanged halos; the stencil reads one ghost layer.
/// `out` receives `du/dt` on the interior and zeros on the ghost layers.
pub trait SpatialOperator: Send + Sync {
    fn rhs(&self, q: &StateField, sub: &Subdomain, grid: &GlobalGrid, out: &mut StateField);
}

/// Finite-volume operator with Rusanov (local Lax-Friedrichs) fluxes.
pub struct RusanovOperator {
    gamma: f64,
}

impl RusanovOperator {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }
}

impl SpatialOperator for RusanovOperator {
    fn rhs(&self, q: &StateField, sub: &Subdomain, grid: &GlobalGrid, out: &mut StateField) {
        let (dx, dy, dz) = grid.spacing();
        let inv = [1.0 / dx, 1.0 / dy, 1.0 / dz];
        let (ax, ay, _) = q.extent();
        let slab = ax * ay * NFIELDS;
        let (ir, jr, kr) = sub.interior();
        let gamma = self.gamma;

        // One rayon task per z-slab; slabs are contiguous in the flat layout.
        out.data_mut()
            .par_chunks_mut(slab)
            .enumerate()
            .for_each(|(k, out_slab)| {
                out_slab.fill(0.0);
                if !kr.contains(&k) {
                    return;
                }
                for j in jr.clone() {
                    for i in ir.clone() {
                        let u = q.cell(i, j, k);
                        let mut dudt = [0.0; NFIELDS];

                        for axis in 0..3 {
                            let (ul, ur) = match axis {
                                0 => (q.cell(i - 1, j, k), q.cell(i + 1, j, k)),
                                1 => (q.cell(i, j - 1, k), q.cell(i, j + 1, k)),
                                _ => (q.cell(i, j, k - 1), q.cell(i, j, k + 1)),
                            };
                            let f_hi = rusanov_flux(u, ur, axis, gamma);
                            let f_lo = rusanov_flux(ul, u, axis, gamma);
                            for n in 0..NFIELDS {
                                dudt[n] -= (f_hi[n] - f_lo[n]) * inv[axis];
                            }
                        }

                        let base = (j * ax + i) * NFIELDS;
                        out_slab[base..base + NFIELDS].copy_from_slice(&dudt);
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::flux::conserved;
    use crate::schema::FlowState;

    const GAMMA: f64 = 5.0 / 3.0;

    fn filled_uniform(sub: &Subdomain, state: &FlowState) -> StateField {
        let mut q = StateField::zeroed(sub);
        let u = conserved(state, GAMMA);
        let (ax, ay, az) = sub.alloc_extent();
        for k in 0..az {
            for j in 0..ay {
                for i in 0..ax {
                    q.cell_mut(i, j, k).copy_from_slice(&u);
                }
            }
        }
        q
    }

    #[test]
    fn uniform_state_has_zero_rate_of_change() {
        let grid = GlobalGrid::new(6, 6, 6, 1.0, 1.0, 1.0);
        let sub = Subdomain::whole(&grid, 1);
        let q = filled_uniform(
            &sub,
            &FlowState {
                density: 1.3,
                velocity: (0.4, -0.2, 0.1),
                pressure: 0.9,
            },
        );

        let op = RusanovOperator::new(GAMMA);
        let mut rhs = StateField::zeroed(&sub);
        op.rhs(&q, &sub, &grid, &mut rhs);

        assert!(rhs.data().iter().all(|&v| v.abs() < 1e-13));
    }

    #[test]
    fn density_gradient_drives_mass_toward_the_deficit() {
        let grid = GlobalGrid::new(6, 6, 6, 1.0, 1.0, 1.0);
        let sub = Subdomain::whole(&grid, 1);
        let mut q = filled_uniform(&sub, &FlowState::default());

        // Denser column at the low-x interior edge.
        let dense = conserved(
            &FlowState {
                density: 2.0,
                velocity: (0.0, 0.0, 0.0),
                pressure: 2.0,
            },
            GAMMA,
        );
        let (_, jr, kr) = sub.interior();
        for k in kr {
            for j in jr.clone() {
                q.cell_mut(1, j, k).copy_from_slice(&dense);
            }
        }

        let op = RusanovOperator::new(GAMMA);
        let mut rhs = StateField::zeroed(&sub);
        op.rhs(&q, &sub, &grid, &mut rhs);

        // Dense cells lose mass, their x-neighbors gain it.
        assert!(rhs.cell(1, 3, 3)[0] < 0.0);
        assert!(rhs.cell(2, 3, 3)[0] > 0.0);
    }

    #[test]
    fn ghost_layers_stay_zero() {
        let grid = GlobalGrid::new(4, 4, 4, 1.0, 1.0, 1.0);
        let sub = Subdomain::whole(&grid, 1);
        let q = filled_uniform(&sub, &FlowState::default());

        let op = RusanovOperator::new(GAMMA);
        let mut rhs = StateField::zeroed(&sub);
        // Pre-poison the rhs buffer so stale values would be visible.
        rhs.data_mut().fill(7.0);
        op.rhs(&q, &sub, &grid, &mut rhs);

        assert_eq!(rhs.cell(0, 2, 2), &[0.0; NFIELDS]);
        assert_eq!(rhs.cell(5, 2, 2), &[0.0; NFIELDS]);
        assert_eq!(rhs.cell(2, 0, 2), &[0.0; NFIELDS]);
    }
}
