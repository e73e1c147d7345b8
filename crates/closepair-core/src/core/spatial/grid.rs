use itertools::Itertools;
use nalgebra::Point3;
use rustc_hash::FxHashMap;

/// Integer coordinates of a grid cell: `floor(position / cell_size)` per axis.
pub type CellIndex = [i64; 3];

/// Relative padding applied to search radii so that floor rounding at cell
/// boundaries can never prune a cell holding a qualifying point.
const BOUNDARY_PADDING: f64 = 1e-6;

/// A sparse uniform hash grid over a fixed subset of objects.
///
/// The grid stores object indices, not positions. Insertion is a snapshot:
/// moving an object afterwards does not relocate it, so callers either rebuild
/// the grid or use [`insert`](Self::insert) and [`remove`](Self::remove)
/// explicitly.
#[derive(Debug, Clone)]
pub struct RadiusTieredGrid {
    cell_size: f64,
    inverse_cell_size: f64,
    cells: FxHashMap<CellIndex, Vec<usize>>,
    len: usize,
}

impl RadiusTieredGrid {
    /// Creates an empty grid. `cell_size` must be finite and positive.
    pub fn new(cell_size: f64) -> Self {
        debug_assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell size must be finite and positive"
        );
        Self {
            cell_size,
            inverse_cell_size: 1.0 / cell_size,
            cells: FxHashMap::default(),
            len: 0,
        }
    }

    /// Builds a grid holding every `(index, position)` pair of `objects`.
    pub fn build<I>(objects: I, cell_size: f64) -> Self
    where
        I: IntoIterator<Item = (usize, Point3<f64>)>,
    {
        let mut grid = Self::new(cell_size);
        for (index, position) in objects {
            grid.insert(index, &position);
        }
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of objects stored in the grid.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the cell containing `position`.
    ///
    /// Coordinates beyond the `i64` range saturate to the outermost cell.
    #[inline]
    pub fn cell_of(&self, position: &Point3<f64>) -> CellIndex {
        [
            (position.x * self.inverse_cell_size).floor() as i64,
            (position.y * self.inverse_cell_size).floor() as i64,
            (position.z * self.inverse_cell_size).floor() as i64,
        ]
    }

    pub fn insert(&mut self, index: usize, position: &Point3<f64>) {
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(index);
        self.len += 1;
    }

    /// Removes `index` from the cell containing `position`, which must be the
    /// position the object was inserted with. Returns false if it was not there.
    pub fn remove(&mut self, index: usize, position: &Point3<f64>) -> bool {
        let cell = self.cell_of(position);
        let Some(members) = self.cells.get_mut(&cell) else {
            return false;
        };
        let Some(slot) = members.iter().position(|&member| member == index) else {
            return false;
        };
        members.swap_remove(slot);
        if members.is_empty() {
            self.cells.remove(&cell);
        }
        self.len -= 1;
        true
    }

    /// Objects stored in `cell`; empty if the cell is unoccupied.
    pub fn members(&self, cell: &CellIndex) -> &[usize] {
        self.cells.get(cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = (&CellIndex, &[usize])> {
        self.cells
            .iter()
            .map(|(cell, members)| (cell, members.as_slice()))
    }

    /// Visits each unordered pair of objects sharing `cell` exactly once.
    pub fn for_each_cell_pair<F>(&self, cell: &CellIndex, mut visit: F)
    where
        F: FnMut(usize, usize),
    {
        for (&a, &b) in self.members(cell).iter().tuple_combinations() {
            visit(a, b);
        }
    }

    /// Visits every object in any cell that could hold a point within
    /// `search_radius` of some point of `origin`.
    ///
    /// This is a superset filter: callers perform the exact distance test.
    /// The origin cell itself is visited only if `include_self_cell` is set.
    /// The callback receives the cell of each visited object.
    pub fn for_each_near<F>(
        &self,
        origin: &CellIndex,
        search_radius: f64,
        include_self_cell: bool,
        mut visit: F,
    ) where
        F: FnMut(&CellIndex, usize),
    {
        if self.cells.is_empty() || search_radius.is_nan() || search_radius < 0.0 {
            return;
        }

        let padded = search_radius + self.cell_size * BOUNDARY_PADDING;
        let limit_squared = padded * padded;
        let reach = (padded * self.inverse_cell_size).ceil();
        let side = 2.0 * reach + 1.0;

        if side * side * side > self.cells.len() as f64 {
            for (cell, members) in &self.cells {
                if self.may_contain(origin, cell, limit_squared, include_self_cell) {
                    for &member in members {
                        visit(cell, member);
                    }
                }
            }
            return;
        }

        let reach = reach as i64;
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let cell = [
                        origin[0].saturating_add(dx),
                        origin[1].saturating_add(dy),
                        origin[2].saturating_add(dz),
                    ];
                    if !self.may_contain(origin, &cell, limit_squared, include_self_cell) {
                        continue;
                    }
                    if let Some(members) = self.cells.get(&cell) {
                        for &member in members {
                            visit(&cell, member);
                        }
                    }
                }
            }
        }
    }

    /// Lower bound test on the gap between any point of `origin` and any point of `cell`.
    fn may_contain(
        &self,
        origin: &CellIndex,
        cell: &CellIndex,
        limit_squared: f64,
        include_self_cell: bool,
    ) -> bool {
        if origin == cell {
            return include_self_cell;
        }
        let gap_squared: f64 = (0..3)
            .map(|axis| {
                let steps = origin[axis].abs_diff(cell[axis]).saturating_sub(1);
                let gap = steps as f64 * self.cell_size;
                gap * gap
            })
            .sum();
        gap_squared <= limit_squared
    }
}
