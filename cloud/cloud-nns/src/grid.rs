//! Uniform hash grid for fixed-radius queries.
//!
//! Points are bucketed into cubic cells whose edge equals the prepared
//! radius, so a query at that radius touches at most 27 cells. Queries at
//! other radii still work: they scan whichever cells overlap the query box,
//! or every occupied cell when that range would be larger.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::kdtree::{Neighbor, dist_sq};

type CellKey = [i64; 3];

/// Spatial hash of point indices keyed by integer cell coordinates.
#[derive(Debug, Clone)]
pub struct HashGrid {
    cell_size: f64,
    cells: HashMap<CellKey, SmallVec<[usize; 8]>>,
}

impl HashGrid {
    /// Bucket `points` into cells of edge `cell_size`.
    ///
    /// `cell_size` must be positive and finite.
    #[must_use]
    pub fn build(points: &[[f64; 3]], cell_size: f64) -> Self {
        let mut grid = Self {
            cell_size,
            cells: HashMap::new(),
        };
        for (i, p) in points.iter().enumerate() {
            let key = grid.cell_of(p);
            grid.cells.entry(key).or_default().push(i);
        }
        grid
    }

    /// Edge length of a cell.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_of(&self, p: &[f64; 3]) -> CellKey {
        [
            (p[0] / self.cell_size).floor() as i64,
            (p[1] / self.cell_size).floor() as i64,
            (p[2] / self.cell_size).floor() as i64,
        ]
    }

    /// Every point of `points` within `radius` of `query`, in cell order.
    ///
    /// `points` must be the slice the grid was built from.
    #[must_use]
    pub fn within(&self, points: &[[f64; 3]], query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        let radius_sq = radius * radius;
        let lo = self.cell_of(&[query[0] - radius, query[1] - radius, query[2] - radius]);
        let hi = self.cell_of(&[query[0] + radius, query[1] + radius, query[2] + radius]);

        let mut found = Vec::new();
        let mut visit = |indices: &SmallVec<[usize; 8]>| {
            for &i in indices {
                let d = dist_sq(&points[i], query);
                if d <= radius_sq {
                    found.push(Neighbor::new(i, d));
                }
            }
        };

        let span = (0..3).try_fold(1_u64, |acc, axis| {
            let extent = hi[axis].checked_sub(lo[axis])?.checked_add(1)?;
            acc.checked_mul(u64::try_from(extent).ok()?)
        });
        let scan_range = span.is_some_and(|cells| cells <= self.cells.len() as u64);

        if scan_range {
            for x in lo[0]..=hi[0] {
                for y in lo[1]..=hi[1] {
                    for z in lo[2]..=hi[2] {
                        if let Some(indices) = self.cells.get(&[x, y, z]) {
                            visit(indices);
                        }
                    }
                }
            }
        } else {
            for indices in self.cells.values() {
                visit(indices);
            }
        }
        found
    }
}
