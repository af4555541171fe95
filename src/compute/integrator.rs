//! Multi-stage explicit time integration (SSP-RK3, Shu-Osher form).
//!
//! Each stage exchanges halos on its working buffer, evaluates the spatial
//! operator, and combines the stage buffers with the scheme's fixed
//! coefficients:
//!
//! ```text
//! q1 = q + dt L(q)
//! q2 = 3/4 q + 1/4 q1 + 1/4 dt L(q1)
//! q  = 1/3 q + 2/3 q2 + 2/3 dt L(q2)
//! ```

use rayon::prelude::*;

use crate::comm::{Communicator, HaloExchange};
use crate::error::SolverResult;
use crate::grid::{GlobalGrid, Subdomain};

use super::operator::SpatialOperator;
use super::state::StateField;

/// Owns the rate-of-change scratch buffer and drives the three stages.
pub struct StageIntegrator {
    rhs: StateField,
}

impl StageIntegrator {
    pub fn new(sub: &Subdomain) -> Self {
        Self {
            rhs: StateField::zeroed(sub),
        }
    }

    /// Advance `q` by one step of size `dt`, in place.
    ///
    /// `q1` and `q2` are scratch stage buffers: they are overwritten and
    /// carry no meaning after this returns. The caller advances `t` by `dt`
    /// after a successful step.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        q: &mut StateField,
        q1: &mut StateField,
        q2: &mut StateField,
        op: &dyn SpatialOperator,
        halo: &HaloExchange,
        comm: &dyn Communicator,
        sub: &Subdomain,
        grid: &GlobalGrid,
        dt: f64,
    ) -> SolverResult<()> {
        q.check_shape(sub)?;
        q1.check_shape(sub)?;
        q2.check_shape(sub)?;

        halo.exchange(q, comm)?;
        op.rhs(q, sub, grid, &mut self.rhs);
        combine2(q1, 1.0, q, dt, &self.rhs);

        halo.exchange(q1, comm)?;
        op.rhs(q1, sub, grid, &mut self.rhs);
        combine3(q2, 0.75, q, 0.25, q1, 0.25 * dt, &self.rhs);

        halo.exchange(q2, comm)?;
        op.rhs(q2, sub, grid, &mut self.rhs);
        combine_final(q, 1.0 / 3.0, 2.0 / 3.0, q2, 2.0 / 3.0 * dt, &self.rhs);

        Ok(())
    }
}

/// `out = a x + b y`.
fn combine2(out: &mut StateField, a: f64, x: &StateField, b: f64, y: &StateField) {
    out.data_mut()
        .par_iter_mut()
        .zip(x.data().par_iter().zip(y.data().par_iter()))
        .for_each(|(o, (&xv, &yv))| *o = a * xv + b * yv);
}

/// `out = a x + b y + c z`.
fn combine3(
    out: &mut StateField,
    a: f64,
    x: &StateField,
    b: f64,
    y: &StateField,
    c: f64,
    z: &StateField,
) {
    out.data_mut()
        .par_iter_mut()
        .zip(
            x.data()
                .par_iter()
                .zip(y.data().par_iter().zip(z.data().par_iter())),
        )
        .for_each(|(o, (&xv, (&yv, &zv)))| *o = a * xv + b * yv + c * zv);
}

/// `out = a out + b y + c z`.
fn combine_final(out: &mut StateField, a: f64, b: f64, y: &StateField, c: f64, z: &StateField) {
    out.data_mut()
        .par_iter_mut()
        .zip(y.data().par_iter().zip(z.data().par_iter()))
        .for_each(|(o, (&yv, &zv))| *o = a * *o + b * yv + c * zv);
}
