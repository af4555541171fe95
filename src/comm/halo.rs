//! Ghost-cell synchronization between neighboring subdomains.
//!
//! Exchange proceeds axis by axis (x, then y, then z); each sweep carries the
//! ghost layers filled by the previous sweeps, so edge and corner ghosts are
//! correct after the third sweep. Every rank blocks until the transfers it
//! participates in have completed, which keeps all ranks in lock-step per
//! stage.

use crate::compute::flux::conserved;
use crate::compute::state::{NFIELDS, StateField, field};
use crate::error::{SolverError, SolverResult};
use crate::grid::{FACES, Neighbor, Subdomain};
use crate::schema::{BoundaryKind, FlowState};

use super::Communicator;

use std::ops::Range;

/// Halo exchange for one rank's subdomain.
pub struct HaloExchange {
    sub: Subdomain,
    neighbors: [Neighbor; 6],
    ambient: [f64; NFIELDS],
}

impl HaloExchange {
    pub fn new(
        sub: Subdomain,
        neighbors: [Neighbor; 6],
        ambient: &FlowState,
        gamma: f64,
    ) -> Self {
        Self {
            sub,
            neighbors,
            ambient: conserved(ambient, gamma),
        }
    }

    /// Fill every ghost layer of `q` from neighbor interiors or boundary
    /// conditions. Returns once all transfers this rank participates in have
    /// completed. Idempotent while the interior is unchanged.
    pub fn exchange(&self, q: &mut StateField, comm: &dyn Communicator) -> SolverResult<()> {
        q.check_shape(&self.sub)?;
        for axis in 0..3 {
            self.exchange_axis(q, comm, axis)?;
        }
        Ok(())
    }

    fn exchange_axis(
        &self,
        q: &mut StateField,
        comm: &dyn Communicator,
        axis: usize,
    ) -> SolverResult<()> {
        let low = FACES[2 * axis];
        let high = FACES[2 * axis + 1];
        let n = self.sub.extent_along(axis);
        let ng = self.sub.halo;

        let low_n = self.neighbors[low.index()];
        let high_n = self.neighbors[high.index()];

        // A periodic axis with one rank wraps onto itself without messaging.
        if low_n == Neighbor::Rank(self.sub.rank) {
            let wrap_low = self.pack_slab(q, axis, n..n + ng);
            let wrap_high = self.pack_slab(q, axis, ng..2 * ng);
            self.unpack_slab(q, axis, 0..ng, &wrap_low)?;
            self.unpack_slab(q, axis, n + ng..n + 2 * ng, &wrap_high)?;
            return Ok(());
        }

        // Post both sends before receiving; channel sends do not block, so
        // paired ranks cannot deadlock.
        if let Neighbor::Rank(r) = low_n {
            let slab = self.pack_slab(q, axis, ng..2 * ng);
            comm.send(r, low.index() as u32, slab)?;
        }
        if let Neighbor::Rank(r) = high_n {
            let slab = self.pack_slab(q, axis, n..n + ng);
            comm.send(r, high.index() as u32, slab)?;
        }

        match low_n {
            Neighbor::Rank(r) => {
                // The low neighbor sent from its high face.
                let slab = comm.recv(r, high.index() as u32)?;
                self.unpack_slab(q, axis, 0..ng, &slab)?;
            }
            Neighbor::Boundary(kind) => self.apply_boundary(q, axis, true, kind),
        }
        match high_n {
            Neighbor::Rank(r) => {
                let slab = comm.recv(r, low.index() as u32)?;
                self.unpack_slab(q, axis, n + ng..n + 2 * ng, &slab)?;
            }
            Neighbor::Boundary(kind) => self.apply_boundary(q, axis, false, kind),
        }
        Ok(())
    }

    /// Copy the cells with axis-coordinate in `layers` into a flat buffer.
    /// The slab spans the full allocated extent of the other two axes.
    fn pack_slab(&self, q: &StateField, axis: usize, layers: Range<usize>) -> Vec<f64> {
        let (au, av) = self.cross_extent(q, axis);
        let mut out = Vec::with_capacity(layers.len() * au * av * NFIELDS);
        for p in layers {
            for v in 0..av {
                for u in 0..au {
                    let (i, j, k) = map_coords(axis, p, u, v);
                    out.extend_from_slice(q.cell(i, j, k));
                }
            }
        }
        out
    }

    fn unpack_slab(
        &self,
        q: &mut StateField,
        axis: usize,
        layers: Range<usize>,
        slab: &[f64],
    ) -> SolverResult<()> {
        let (au, av) = self.cross_extent(q, axis);
        let expected = layers.len() * au * av * NFIELDS;
        if slab.len() != expected {
            return Err(SolverError::Comm(format!(
                "halo slab holds {} values, expected {expected}",
                slab.len()
            )));
        }
        let mut offset = 0;
        for p in layers {
            for v in 0..av {
                for u in 0..au {
                    let (i, j, k) = map_coords(axis, p, u, v);
                    q.cell_mut(i, j, k)
                        .copy_from_slice(&slab[offset..offset + NFIELDS]);
                    offset += NFIELDS;
                }
            }
        }
        Ok(())
    }

    /// Allocated extents of the two axes crossing `axis`.
    fn cross_extent(&self, q: &StateField, axis: usize) -> (usize, usize) {
        let (ax, ay, az) = q.extent();
        match axis {
            0 => (ay, az),
            1 => (ax, az),
            _ => (ax, ay),
        }
    }

    /// Fill one face's ghost layers from the local boundary condition.
    fn apply_boundary(&self, q: &mut StateField, axis: usize, low: bool, kind: BoundaryKind) {
        let n = self.sub.extent_along(axis);
        let ng = self.sub.halo;
        let (au, av) = self.cross_extent(q, axis);

        for g in 0..ng {
            // Ghost layer g = 0 is the innermost on either side.
            let ghost = if low { ng - 1 - g } else { n + ng + g };
            let src = match kind {
                // Zero gradient: every ghost layer copies the adjacent
                // interior layer.
                BoundaryKind::Outflow => {
                    if low {
                        ng
                    } else {
                        n + ng - 1
                    }
                }
                // Mirror layer g across the face.
                BoundaryKind::Reflective => {
                    if low {
                        ng + g
                    } else {
                        n + ng - 1 - g
                    }
                }
                // Wrap to the far interior. Periodic faces normally resolve
                // to a rank neighbor; this arm only serves direct calls.
                BoundaryKind::Periodic => {
                    if low {
                        n + ng - 1 - g
                    } else {
                        ng + g
                    }
                }
                BoundaryKind::Fixed => {
                    for v in 0..av {
                        for u in 0..au {
                            let (i, j, k) = map_coords(axis, ghost, u, v);
                            q.cell_mut(i, j, k).copy_from_slice(&self.ambient);
                        }
                    }
                    continue;
                }
            };

            for v in 0..av {
                for u in 0..au {
                    let (si, sj, sk) = map_coords(axis, src, u, v);
                    let mut cell = [0.0; NFIELDS];
                    cell.copy_from_slice(q.cell(si, sj, sk));
                    let (gi, gj, gk) = map_coords(axis, ghost, u, v);
                    let ghost_cell = q.cell_mut(gi, gj, gk);
                    ghost_cell.copy_from_slice(&cell);
                    if kind == BoundaryKind::Reflective {
                        ghost_cell[field::MX + axis] = -ghost_cell[field::MX + axis];
                    }
                }
            }
        }
    }
}

#[inline]
fn map_coords(axis: usize, p: usize, u: usize, v: usize) -> (usize, usize, usize) {
    match axis {
        0 => (p, u, v),
        1 => (u, p, v),
        _ => (u, v, p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{ChannelComm, SingleRank};
    use crate::grid::{Face, GlobalGrid, decompose};
    use crate::schema::BoundaryConfig;
    use std::thread;

    const GAMMA: f64 = 5.0 / 3.0;

    fn bc_all(kind: BoundaryKind) -> BoundaryConfig {
        BoundaryConfig {
            x: kind,
            y: kind,
            z: kind,
        }
    }

    /// Fill the interior with a value derived from global cell coordinates,
    /// so any mis-addressed ghost is detectable.
    fn fill_coded(q: &mut StateField, sub: &Subdomain, grid: &GlobalGrid) {
        let ng = sub.halo;
        for k in 0..sub.nz {
            for j in 0..sub.ny {
                for i in 0..sub.nx {
                    let code = ((sub.iz0 + k) * grid.ny + (sub.iy0 + j)) * grid.nx
                        + (sub.ix0 + i);
                    let cell = q.cell_mut(i + ng, j + ng, k + ng);
                    cell.copy_from_slice(&[code as f64 + 1.0, 0.1, 0.2, 0.3, 10.0]);
                }
            }
        }
    }

    fn single_rank_setup(kind: BoundaryKind) -> (GlobalGrid, Subdomain, HaloExchange, StateField) {
        let grid = GlobalGrid::new(4, 4, 4, 1.0, 1.0, 1.0);
        let decomp = decompose(&grid, (1, 1, 1), &bc_all(kind), 1).unwrap();
        let sub = *decomp.subdomain(0);
        let halo = HaloExchange::new(sub, *decomp.neighbors(0), &FlowState::default(), GAMMA);
        let mut q = StateField::zeroed(&sub);
        fill_coded(&mut q, &sub, &grid);
        (grid, sub, halo, q)
    }

    #[test]
    fn periodic_wrap_copies_the_far_interior() {
        let (_grid, _sub, halo, mut q) = single_rank_setup(BoundaryKind::Periodic);
        let comm = SingleRank::new();
        halo.exchange(&mut q, &comm).unwrap();

        // Low-x ghost of row (j=1, k=1) holds the far interior cell.
        assert_eq!(q.cell(0, 1, 1)[0], q.cell(4, 1, 1)[0]);
        assert_eq!(q.cell(5, 1, 1)[0], q.cell(1, 1, 1)[0]);
        // z wrap carries x-ghost columns, so corners are filled too.
        assert_eq!(q.cell(0, 1, 0)[0], q.cell(4, 1, 4)[0]);
    }

    #[test]
    fn outflow_copies_the_adjacent_interior_layer() {
        let (_grid, _sub, halo, mut q) = single_rank_setup(BoundaryKind::Outflow);
        let comm = SingleRank::new();
        halo.exchange(&mut q, &comm).unwrap();

        assert_eq!(q.cell(0, 2, 2), q.cell(1, 2, 2));
        assert_eq!(q.cell(5, 2, 2), q.cell(4, 2, 2));
    }

    #[test]
    fn reflective_negates_the_normal_momentum() {
        let (_grid, _sub, halo, mut q) = single_rank_setup(BoundaryKind::Reflective);
        let comm = SingleRank::new();
        halo.exchange(&mut q, &comm).unwrap();

        let interior = q.cell(1, 2, 2).to_vec();
        let ghost = q.cell(0, 2, 2);
        assert_eq!(ghost[field::RH], interior[field::RH]);
        assert_eq!(ghost[field::MX], -interior[field::MX]);
        assert_eq!(ghost[field::MY], interior[field::MY]);
        assert_eq!(ghost[field::EN], interior[field::EN]);
    }

    #[test]
    fn fixed_holds_the_ambient_state() {
        let (_grid, _sub, halo, mut q) = single_rank_setup(BoundaryKind::Fixed);
        let comm = SingleRank::new();
        halo.exchange(&mut q, &comm).unwrap();

        let ambient = conserved(&FlowState::default(), GAMMA);
        assert_eq!(q.cell(0, 2, 2), &ambient);
        assert_eq!(q.cell(2, 5, 2), &ambient);
    }

    #[test]
    fn exchange_is_idempotent_on_unchanged_state() {
        let (_grid, _sub, halo, mut q) = single_rank_setup(BoundaryKind::Periodic);
        let comm = SingleRank::new();

        halo.exchange(&mut q, &comm).unwrap();
        let after_first = q.clone();
        halo.exchange(&mut q, &comm).unwrap();
        assert_eq!(q, after_first);
    }

    #[test]
    fn rejects_a_mis_shaped_buffer() {
        let (_grid, sub, halo, _q) = single_rank_setup(BoundaryKind::Periodic);
        let mut wrong = StateField::zeroed(&Subdomain { nx: 6, ..sub });
        let comm = SingleRank::new();
        assert!(matches!(
            halo.exchange(&mut wrong, &comm),
            Err(SolverError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn two_ranks_swap_their_shared_face() {
        let grid = GlobalGrid::new(16, 8, 8, 2.0, 1.0, 1.0);
        let decomp = decompose(&grid, (2, 1, 1), &bc_all(BoundaryKind::Outflow), 1).unwrap();
        let comms = ChannelComm::group(2);

        let results: Vec<StateField> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let decomp = &decomp;
                    let grid = &grid;
                    scope.spawn(move || {
                        let rank = comm.rank();
                        let sub = *decomp.subdomain(rank);
                        let halo = HaloExchange::new(
                            sub,
                            *decomp.neighbors(rank),
                            &FlowState::default(),
                            GAMMA,
                        );
                        let mut q = StateField::zeroed(&sub);
                        fill_coded(&mut q, &sub, grid);
                        halo.exchange(&mut q, comm).unwrap();
                        q
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Rank 0's high-x ghost column equals rank 1's first interior column,
        // and vice versa, for every (j, k).
        let (q0, q1) = (&results[0], &results[1]);
        for k in 1..9 {
            for j in 1..9 {
                assert_eq!(q0.cell(9, j, k), q1.cell(1, j, k));
                assert_eq!(q1.cell(0, j, k), q0.cell(8, j, k));
            }
        }
    }

    #[test]
    fn shared_face_is_paired_in_the_neighbor_map() {
        let grid = GlobalGrid::new(16, 8, 8, 2.0, 1.0, 1.0);
        let decomp = decompose(&grid, (2, 1, 1), &bc_all(BoundaryKind::Outflow), 1).unwrap();
        assert_eq!(decomp.neighbors(0)[Face::XHigh.index()], Neighbor::Rank(1));
        assert_eq!(decomp.neighbors(1)[Face::XLow.index()], Neighbor::Rank(0));
    }
}
