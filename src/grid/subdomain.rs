//! Global grid geometry and per-rank subdomains.

/// Global structured grid: cell counts and physical box lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalGrid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
}

impl GlobalGrid {
    pub fn new(nx: usize, ny: usize, nz: usize, lx: f64, ly: f64, lz: f64) -> Self {
        Self {
            nx,
            ny,
            nz,
            lx,
            ly,
            lz,
        }
    }

    /// Uniform cell spacing per axis.
    #[inline]
    pub fn spacing(&self) -> (f64, f64, f64) {
        (
            self.lx / self.nx as f64,
            self.ly / self.ny as f64,
            self.lz / self.nz as f64,
        )
    }

    /// Smallest cell spacing across the three axes.
    #[inline]
    pub fn min_spacing(&self) -> f64 {
        let (dx, dy, dz) = self.spacing();
        dx.min(dy).min(dz)
    }

    /// Total number of interior cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

/// One rank's axis-aligned block of the global grid.
///
/// `(ix0, iy0, iz0)` is the global index of the first interior cell;
/// `(nx, ny, nz)` is the interior extent. The allocated extent adds `halo`
/// ghost layers on every face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subdomain {
    pub rank: usize,
    pub ix0: usize,
    pub iy0: usize,
    pub iz0: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub halo: usize,
}

impl Subdomain {
    /// A single-rank subdomain covering the entire global grid.
    pub fn whole(grid: &GlobalGrid, halo: usize) -> Self {
        Self {
            rank: 0,
            ix0: 0,
            iy0: 0,
            iz0: 0,
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            halo,
        }
    }

    /// Allocated (halo-included) extents.
    #[inline]
    pub fn alloc_extent(&self) -> (usize, usize, usize) {
        (
            self.nx + 2 * self.halo,
            self.ny + 2 * self.halo,
            self.nz + 2 * self.halo,
        )
    }

    /// Interior extent along the given axis (0 = x, 1 = y, 2 = z).
    #[inline]
    pub fn extent_along(&self, axis: usize) -> usize {
        match axis {
            0 => self.nx,
            1 => self.ny,
            _ => self.nz,
        }
    }

    /// Number of allocated cells, ghosts included.
    #[inline]
    pub fn alloc_cells(&self) -> usize {
        let (ax, ay, az) = self.alloc_extent();
        ax * ay * az
    }

    /// Number of interior cells.
    #[inline]
    pub fn interior_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Interior index ranges in allocated (halo-inclusive) coordinates.
    #[inline]
    pub fn interior(&self) -> (std::ops::Range<usize>, std::ops::Range<usize>, std::ops::Range<usize>) {
        let ng = self.halo;
        (ng..ng + self.nx, ng..ng + self.ny, ng..ng + self.nz)
    }
}
