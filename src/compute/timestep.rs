//! CFL step-size control.

use rayon::prelude::*;

use crate::error::{SolverError, SolverResult};
use crate::grid::{GlobalGrid, Subdomain};

use super::flux::signal_speed;
use super::state::StateField;

/// This rank's stability bound: the minimum over interior cells and axes of
/// `spacing / (|v| + c)`, scaled by the CFL safety factor.
///
/// The result may be infinite when nothing propagates; the caller clamps to
/// the configured ceiling. A non-finite state value is an unrecoverable-state
/// error, not a bound-computation problem; `step` labels the error context.
pub fn local_stable_dt(
    q: &StateField,
    sub: &Subdomain,
    grid: &GlobalGrid,
    gamma: f64,
    cfl: f64,
    step: u64,
) -> SolverResult<f64> {
    let (dx, dy, dz) = grid.spacing();
    let spacing = [dx, dy, dz];
    let (ir, jr, kr) = sub.interior();

    let bound = kr
        .into_par_iter()
        .map(|k| {
            let mut slab_min = f64::INFINITY;
            for j in jr.clone() {
                for i in ir.clone() {
                    let u = q.cell(i, j, k);
                    if u.iter().any(|v| !v.is_finite()) {
                        return f64::NAN;
                    }
                    for (axis, h) in spacing.iter().enumerate() {
                        slab_min = slab_min.min(h / signal_speed(u, axis, gamma));
                    }
                }
            }
            slab_min
        })
        .reduce(
            || f64::INFINITY,
            |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) },
        );

    if bound.is_nan() {
        return Err(SolverError::UnstableState {
            step,
            detail: "non-finite value encountered while computing the step bound".into(),
        });
    }
    Ok(cfl * bound)
}

/// Clamp a reduced global bound to the ceiling and to the remaining time.
///
/// An unbounded result (quiet state) falls back to `dt_max`; the final step
/// is shortened to land on `t1`.
pub fn clamp_dt(global_bound: f64, dt_max: f64, t: f64, t1: f64) -> f64 {
    let dt = if global_bound.is_finite() {
        global_bound.min(dt_max)
    } else {
        dt_max
    };
    dt.min(t1 - t).max(0.0)
}
