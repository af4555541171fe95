//! Cartesian domain decomposition and the per-rank neighbor map.

use crate::error::{SolverError, SolverResult};
use crate::schema::{BoundaryConfig, BoundaryKind};

use super::{GlobalGrid, Subdomain};

/// One of the six faces of a subdomain block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    XLow,
    XHigh,
    YLow,
    YHigh,
    ZLow,
    ZHigh,
}

/// All faces in exchange order (x sweep, then y, then z).
pub const FACES: [Face; 6] = [
    Face::XLow,
    Face::XHigh,
    Face::YLow,
    Face::YHigh,
    Face::ZLow,
    Face::ZHigh,
];

impl Face {
    /// Decomposed axis this face is normal to (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn axis(self) -> usize {
        match self {
            Face::XLow | Face::XHigh => 0,
            Face::YLow | Face::YHigh => 1,
            Face::ZLow | Face::ZHigh => 2,
        }
    }

    /// True for the low-coordinate face of the axis.
    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, Face::XLow | Face::YLow | Face::ZLow)
    }

    /// The opposing face on the same axis.
    #[inline]
    pub fn opposite(self) -> Face {
        match self {
            Face::XLow => Face::XHigh,
            Face::XHigh => Face::XLow,
            Face::YLow => Face::YHigh,
            Face::YHigh => Face::YLow,
            Face::ZLow => Face::ZHigh,
            Face::ZHigh => Face::ZLow,
        }
    }

    /// Index into per-rank face arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Face::XLow => 0,
            Face::XHigh => 1,
            Face::YLow => 2,
            Face::YHigh => 3,
            Face::ZLow => 4,
            Face::ZHigh => 5,
        }
    }
}

/// What lies on the far side of a subdomain face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// Another rank's interior.
    Rank(usize),
    /// The global boundary, with its condition tag.
    Boundary(BoundaryKind),
}

/// The full partition of the global grid: one subdomain and one six-face
/// neighbor map per rank.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub ranks: (usize, usize, usize),
    subdomains: Vec<Subdomain>,
    neighbors: Vec<[Neighbor; 6]>,
}

impl Decomposition {
    pub fn rank_count(&self) -> usize {
        self.subdomains.len()
    }

    pub fn subdomain(&self, rank: usize) -> &Subdomain {
        &self.subdomains[rank]
    }

    pub fn neighbors(&self, rank: usize) -> &[Neighbor; 6] {
        &self.neighbors[rank]
    }
}

/// Split `extent` cells into `parts` contiguous chunks, remainder cells going
/// to the lowest-coordinate chunks. Returns (start, len) per chunk.
fn split_axis(extent: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = extent / parts;
    let rem = extent % parts;
    let mut out = Vec::with_capacity(parts);
    let mut cursor = 0;
    for p in 0..parts {
        let len = base + usize::from(p < rem);
        out.push((cursor, len));
        cursor += len;
    }
    out
}

/// Build the Cartesian partition of `grid` over `(px, py, pz)` ranks.
///
/// Rank ids are laid out x-fastest: `rank = rx + px * (ry + py * rz)`.
/// Fails when any axis has fewer cells than ranks along it, or when a
/// subdomain would be thinner than the halo on a decomposed or periodic axis
/// (the halo would then reach past the immediate neighbor's interior).
pub fn decompose(
    grid: &GlobalGrid,
    ranks: (usize, usize, usize),
    boundaries: &BoundaryConfig,
    halo: usize,
) -> SolverResult<Decomposition> {
    let (px, py, pz) = ranks;
    let axes = [('x', grid.nx, px), ('y', grid.ny, py), ('z', grid.nz, pz)];
    for &(axis, extent, parts) in &axes {
        if parts == 0 || extent < parts {
            return Err(SolverError::Partition {
                axis,
                extent,
                ranks: parts,
            });
        }
        let min_chunk = extent / parts;
        let decomposed = parts > 1 || boundaries.along(axis_index(axis)) == BoundaryKind::Periodic;
        if decomposed && min_chunk < halo {
            return Err(SolverError::Partition {
                axis,
                extent,
                ranks: parts,
            });
        }
    }

    let x_chunks = split_axis(grid.nx, px);
    let y_chunks = split_axis(grid.ny, py);
    let z_chunks = split_axis(grid.nz, pz);

    let total = px * py * pz;
    let mut subdomains = Vec::with_capacity(total);
    let mut neighbors = Vec::with_capacity(total);

    for rz in 0..pz {
        for ry in 0..py {
            for rx in 0..px {
                let rank = rx + px * (ry + py * rz);
                let (ix0, nx) = x_chunks[rx];
                let (iy0, ny) = y_chunks[ry];
                let (iz0, nz) = z_chunks[rz];
                debug_assert_eq!(subdomains.len(), rank);
                subdomains.push(Subdomain {
                    rank,
                    ix0,
                    iy0,
                    iz0,
                    nx,
                    ny,
                    nz,
                    halo,
                });

                let mut map = [Neighbor::Boundary(BoundaryKind::Outflow); 6];
                for face in FACES {
                    map[face.index()] =
                        resolve_neighbor(face, (rx, ry, rz), ranks, boundaries);
                }
                neighbors.push(map);
            }
        }
    }

    Ok(Decomposition {
        ranks,
        subdomains,
        neighbors,
    })
}

fn axis_index(axis: char) -> usize {
    match axis {
        'x' => 0,
        'y' => 1,
        _ => 2,
    }
}

fn resolve_neighbor(
    face: Face,
    coords: (usize, usize, usize),
    ranks: (usize, usize, usize),
    boundaries: &BoundaryConfig,
) -> Neighbor {
    let axis = face.axis();
    let coord = [coords.0, coords.1, coords.2][axis];
    let parts = [ranks.0, ranks.1, ranks.2][axis];
    let kind = boundaries.along(axis);

    let target = if face.is_low() {
        if coord > 0 {
            Some(coord - 1)
        } else if kind == BoundaryKind::Periodic {
            Some(parts - 1)
        } else {
            None
        }
    } else if coord + 1 < parts {
        Some(coord + 1)
    } else if kind == BoundaryKind::Periodic {
        Some(0)
    } else {
        None
    };

    match target {
        Some(c) => {
            let mut coords = [coords.0, coords.1, coords.2];
            coords[axis] = c;
            Neighbor::Rank(coords[0] + ranks.0 * (coords[1] + ranks.1 * coords[2]))
        }
        None => Neighbor::Boundary(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outflow_everywhere() -> BoundaryConfig {
        BoundaryConfig {
            x: BoundaryKind::Outflow,
            y: BoundaryKind::Outflow,
            z: BoundaryKind::Outflow,
        }
    }

    #[test]
    fn two_ranks_split_a_16x8x8_grid_into_8x8x8_blocks() {
        let grid = GlobalGrid::new(16, 8, 8, 2.0, 1.0, 1.0);
        let decomp = decompose(&grid, (2, 1, 1), &outflow_everywhere(), 1).unwrap();

        let a = decomp.subdomain(0);
        let b = decomp.subdomain(1);
        assert_eq!((a.nx, a.ny, a.nz), (8, 8, 8));
        assert_eq!((b.nx, b.ny, b.nz), (8, 8, 8));
        assert_eq!(a.ix0, 0);
        assert_eq!(b.ix0, 8);

        // Shared face pairs the ranks; outer x faces carry the boundary tag.
        assert_eq!(decomp.neighbors(0)[Face::XHigh.index()], Neighbor::Rank(1));
        assert_eq!(decomp.neighbors(1)[Face::XLow.index()], Neighbor::Rank(0));
        assert_eq!(
            decomp.neighbors(0)[Face::XLow.index()],
            Neighbor::Boundary(BoundaryKind::Outflow)
        );
    }

    #[test]
    fn periodic_single_rank_wraps_to_itself() {
        let grid = GlobalGrid::new(8, 8, 8, 1.0, 1.0, 1.0);
        let decomp = decompose(&grid, (1, 1, 1), &BoundaryConfig::default(), 1).unwrap();
        for face in FACES {
            assert_eq!(decomp.neighbors(0)[face.index()], Neighbor::Rank(0));
        }
    }

    #[test]
    fn rejects_more_ranks_than_cells() {
        let grid = GlobalGrid::new(2, 8, 8, 1.0, 1.0, 1.0);
        let err = decompose(&grid, (3, 1, 1), &outflow_everywhere(), 1).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SolverError::Partition { axis: 'x', .. }
        ));
    }

    #[test]
    fn remainder_cells_go_to_low_ranks() {
        let chunks = split_axis(10, 3);
        assert_eq!(chunks, vec![(0, 4), (4, 3), (7, 3)]);
    }

    proptest! {
        /// Every interior cell belongs to exactly one rank along each axis.
        #[test]
        fn partition_tiles_each_axis(extent in 1usize..64, parts in 1usize..8) {
            prop_assume!(parts <= extent);
            let chunks = split_axis(extent, parts);
            let mut cursor = 0;
            for (start, len) in chunks {
                prop_assert_eq!(start, cursor);
                prop_assert!(len >= 1);
                cursor = start + len;
            }
            prop_assert_eq!(cursor, extent);
        }

        /// If A lists B across some face, B lists A across the opposing face.
        #[test]
        fn neighbor_map_is_symmetric(
            px in 1usize..4,
            py in 1usize..4,
            pz in 1usize..3,
            periodic in any::<bool>(),
        ) {
            let grid = GlobalGrid::new(12, 12, 12, 1.0, 1.0, 1.0);
            let bounds = if periodic {
                BoundaryConfig::default()
            } else {
                outflow_everywhere()
            };
            let decomp = decompose(&grid, (px, py, pz), &bounds, 1).unwrap();

            for rank in 0..decomp.rank_count() {
                for face in FACES {
                    if let Neighbor::Rank(other) = decomp.neighbors(rank)[face.index()] {
                        prop_assert_eq!(
                            decomp.neighbors(other)[face.opposite().index()],
                            Neighbor::Rank(rank)
                        );
                    }
                }
            }
        }

        /// Interior extents sum to the global extent with no gaps or overlaps.
        #[test]
        fn interiors_cover_the_grid(px in 1usize..5, py in 1usize..5) {
            let grid = GlobalGrid::new(20, 15, 6, 1.0, 1.0, 1.0);
            let decomp = decompose(&grid, (px, py, 1), &outflow_everywhere(), 1).unwrap();

            let mut owned = vec![0u8; grid.cell_count()];
            for rank in 0..decomp.rank_count() {
                let sub = decomp.subdomain(rank);
                for k in sub.iz0..sub.iz0 + sub.nz {
                    for j in sub.iy0..sub.iy0 + sub.ny {
                        for i in sub.ix0..sub.ix0 + sub.nx {
                            owned[(k * grid.ny + j) * grid.nx + i] += 1;
                        }
                    }
                }
            }
            prop_assert!(owned.iter().all(|&c| c == 1));
        }
    }
}
