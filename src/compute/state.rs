//! State buffer holding the conserved fields on one rank's subdomain.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{SolverError, SolverResult};
use crate::grid::Subdomain;

/// Number of conserved fields per cell.
pub const NFIELDS: usize = 5;

/// Field indices within a cell.
pub mod field {
    /// Mass density.
    pub const RH: usize = 0;
    /// Momentum components.
    pub const MX: usize = 1;
    pub const MY: usize = 2;
    pub const MZ: usize = 3;
    /// Total energy density.
    pub const EN: usize = 4;
}

/// Flat field array over a subdomain's allocated (halo-included) extent.
///
/// Layout is `(i, j, k, field)` with the field index fastest:
/// `((k * ay + j) * ax + i) * NFIELDS + f`. Indices are halo-inclusive, so
/// interior cells start at `(halo, halo, halo)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateField {
    data: Vec<f64>,
    ax: usize,
    ay: usize,
    az: usize,
}

impl StateField {
    /// Allocate a zero-filled field for the subdomain.
    pub fn zeroed(sub: &Subdomain) -> Self {
        let (ax, ay, az) = sub.alloc_extent();
        Self {
            data: vec![0.0; ax * ay * az * NFIELDS],
            ax,
            ay,
            az,
        }
    }

    /// Allocated extents (ghosts included).
    #[inline]
    pub fn extent(&self) -> (usize, usize, usize) {
        (self.ax, self.ay, self.az)
    }

    /// Flat index of `(i, j, k, f)` in halo-inclusive coordinates.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize, f: usize) -> usize {
        ((k * self.ay + j) * self.ax + i) * NFIELDS + f
    }

    /// The conserved vector of one cell.
    #[inline]
    pub fn cell(&self, i: usize, j: usize, k: usize) -> &[f64] {
        let base = self.idx(i, j, k, 0);
        &self.data[base..base + NFIELDS]
    }

    #[inline]
    pub fn cell_mut(&mut self, i: usize, j: usize, k: usize) -> &mut [f64] {
        let base = self.idx(i, j, k, 0);
        &mut self.data[base..base + NFIELDS]
    }

    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy the full contents of `other` into `self`.
    ///
    /// The two fields must have identical extents.
    pub fn assign(&mut self, other: &StateField) {
        debug_assert_eq!(self.extent(), other.extent());
        self.data.copy_from_slice(&other.data);
    }

    /// Verify that this buffer matches the subdomain's allocated extent.
    ///
    /// Public solver operations call this on entry; there is no other shape
    /// contract once the caller owns the buffer.
    pub fn check_shape(&self, sub: &Subdomain) -> SolverResult<()> {
        let expected = sub.alloc_cells() * NFIELDS;
        if self.data.len() != expected || self.extent() != sub.alloc_extent() {
            return Err(SolverError::ShapeMismatch {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    /// Copy the interior cells (ghosts excluded) into a contiguous buffer,
    /// field index fastest. Used when serializing snapshots; `self` is not
    /// mutated.
    pub fn interior_copy(&self, sub: &Subdomain) -> Vec<f64> {
        let (ir, jr, kr) = sub.interior();
        let mut out = Vec::with_capacity(sub.interior_cells() * NFIELDS);
        for k in kr {
            for j in jr.clone() {
                for i in ir.clone() {
                    out.extend_from_slice(self.cell(i, j, k));
                }
            }
        }
        out
    }

    /// Check the interior for physical validity: finite values, positive
    /// density and pressure. Returns a description of the first violation.
    pub fn validity_violation(&self, sub: &Subdomain, gamma: f64) -> Option<String> {
        let (ir, jr, kr) = sub.interior();
        for k in kr {
            for j in jr.clone() {
                for i in ir.clone() {
                    let u = self.cell(i, j, k);
                    if u.iter().any(|v| !v.is_finite()) {
                        return Some(format!("non-finite value at cell ({i}, {j}, {k})"));
                    }
                    if u[field::RH] <= 0.0 {
                        return Some(format!(
                            "non-positive density {} at cell ({i}, {j}, {k})",
                            u[field::RH]
                        ));
                    }
                    let p = super::flux::pressure(u, gamma);
                    if p <= 0.0 {
                        return Some(format!("non-positive pressure {p} at cell ({i}, {j}, {k})"));
                    }
                }
            }
        }
        None
    }
}

/// Interior-field diagnostics logged at each snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FieldStats {
    pub total_mass: f64,
    pub total_momentum: (f64, f64, f64),
    pub total_energy: f64,
    pub min_density: f64,
    pub max_density: f64,
    pub non_finite: usize,
}

impl FieldStats {
    /// Compute diagnostics over the interior, one rayon task per z-slab.
    pub fn from_state(q: &StateField, sub: &Subdomain) -> Self {
        let (ir, jr, kr) = sub.interior();

        kr.into_par_iter()
            .map(|k| {
                let mut slab = FieldStats::empty();
                for j in jr.clone() {
                    for i in ir.clone() {
                        slab.accumulate(q.cell(i, j, k));
                    }
                }
                slab
            })
            .reduce(FieldStats::empty, FieldStats::merge)
    }

    fn empty() -> Self {
        Self {
            total_mass: 0.0,
            total_momentum: (0.0, 0.0, 0.0),
            total_energy: 0.0,
            min_density: f64::INFINITY,
            max_density: f64::NEG_INFINITY,
            non_finite: 0,
        }
    }

    fn accumulate(&mut self, u: &[f64]) {
        self.total_mass += u[field::RH];
        self.total_momentum.0 += u[field::MX];
        self.total_momentum.1 += u[field::MY];
        self.total_momentum.2 += u[field::MZ];
        self.total_energy += u[field::EN];
        self.min_density = self.min_density.min(u[field::RH]);
        self.max_density = self.max_density.max(u[field::RH]);
        self.non_finite += u.iter().filter(|v| !v.is_finite()).count();
    }

    fn merge(a: Self, b: Self) -> Self {
        Self {
            total_mass: a.total_mass + b.total_mass,
            total_momentum: (
                a.total_momentum.0 + b.total_momentum.0,
                a.total_momentum.1 + b.total_momentum.1,
                a.total_momentum.2 + b.total_momentum.2,
            ),
            total_energy: a.total_energy + b.total_energy,
            min_density: a.min_density.min(b.min_density),
            max_density: a.max_density.max(b.max_density),
            non_finite: a.non_finite + b.non_finite,
        }
    }
}
