use super::{ClosePairFinder, PairSink};
use crate::core::models::object::Sphere;
use crate::core::spatial::bounds::BoundingBox;
use crate::core::spatial::distance::DistanceMode;
use crate::core::spatial::partition::{BandGrid, GridPartitioner, PartitionConfig};
use crate::core::spatial::periodic::PeriodicBox;
use crate::engine::pair_list::canonical;
use nalgebra::Point3;
use std::borrow::Cow;

/// Grid-accelerated pair search over radius bands.
///
/// Within a band, same-cell pairs come from `for_each_cell_pair` and
/// cross-cell pairs from a half neighbourhood: a pair of objects in cells
/// `c1 < c2` is only examined from `c1`. Between bands, the smaller band
/// queries the grid of the larger one.
///
/// With a periodic box, centers are wrapped into the primary cell and every
/// query near a face is repeated from the matching periodic images.
#[derive(Debug, Clone, Copy)]
pub struct GridFinder {
    partitioner: GridPartitioner,
    mode: DistanceMode,
    periodic: Option<PeriodicBox>,
}

impl GridFinder {
    pub fn new(config: PartitionConfig, mode: DistanceMode) -> Self {
        Self {
            partitioner: GridPartitioner::new(config, mode),
            mode,
            periodic: None,
        }
    }

    pub fn with_periodic_box(mut self, periodic: Option<PeriodicBox>) -> Self {
        self.periodic = periodic;
        self
    }

    #[inline]
    fn within(&self, a: &Sphere, b: &Sphere, threshold: f64) -> bool {
        self.mode.within_in(a, b, threshold, self.periodic.as_ref())
    }

    fn wrapped<'a>(&self, spheres: &'a [Sphere]) -> Cow<'a, [Sphere]> {
        match &self.periodic {
            None => Cow::Borrowed(spheres),
            Some(cell) => Cow::Owned(
                spheres
                    .iter()
                    .map(|sphere| Sphere {
                        center: cell.wrap(&sphere.center),
                        ..*sphere
                    })
                    .collect(),
            ),
        }
    }

    /// Calls `visit(j)` for every object of `target` stored in a cell that may
    /// hold a point within `search_radius` of `center` or of one of its images.
    fn for_each_candidate<F>(&self, center: &Point3<f64>, search_radius: f64, target: &BandGrid, mut visit: F)
    where
        F: FnMut(usize),
    {
        let grid = &target.grid;
        match &self.periodic {
            None => {
                grid.for_each_near(&grid.cell_of(center), search_radius, true, |_, j| visit(j));
            }
            Some(cell) => cell.for_each_image(center, search_radius, |image| {
                grid.for_each_near(&grid.cell_of(&image), search_radius, true, |_, j| visit(j));
            }),
        }
    }

    /// Calls `emit(j)` for every object `j` of `target` within `threshold` of `query`.
    fn query_band<F>(
        &self,
        query: &Sphere,
        target: &BandGrid,
        target_spheres: &[Sphere],
        threshold: f64,
        mut emit: F,
    ) where
        F: FnMut(usize),
    {
        let search_radius =
            threshold + self.mode.effective_radius(query.radius) + target.band.max_radius;
        self.for_each_candidate(&query.center, search_radius, target, |j| {
            if self.within(query, &target_spheres[j], threshold) {
                emit(j);
            }
        });
    }

    fn band_self_pairs(
        &self,
        spheres: &[Sphere],
        band_grid: &BandGrid,
        threshold: f64,
        sink: &mut PairSink,
    ) {
        let grid = &band_grid.grid;
        let max_radius = band_grid.band.max_radius;

        for (cell, members) in grid.occupied_cells() {
            if sink.is_exhausted() {
                return;
            }
            grid.for_each_cell_pair(cell, |i, j| {
                if self.mode.within(&spheres[i], &spheres[j], threshold) {
                    sink.push(canonical(i, j));
                }
            });

            for &i in members {
                let query = &spheres[i];
                let search_radius = threshold + self.mode.effective_radius(query.radius) + max_radius;
                grid.for_each_near(cell, search_radius, false, |other_cell, j| {
                    if other_cell > cell && self.mode.within(query, &spheres[j], threshold) {
                        sink.push(canonical(i, j));
                    }
                });
            }
        }
    }

    /// Self pairs under periodic boundaries. Images break the half-neighbourhood
    /// ordering, so each object queries its own band for higher indices and every
    /// later band in full.
    fn periodic_self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink) {
        let partition = self.partitioner.partition(spheres);
        for (k, band_grid) in partition.bands.iter().enumerate() {
            for &i in &band_grid.band.members {
                if sink.is_exhausted() {
                    return;
                }
                self.query_band(&spheres[i], band_grid, spheres, threshold, |j| {
                    if j > i {
                        sink.push((i, j));
                    }
                });
                for other in &partition.bands[k + 1..] {
                    self.query_band(&spheres[i], other, spheres, threshold, |j| {
                        sink.push(canonical(i, j));
                    });
                }
            }
        }
    }

    /// All pairs of `boxes` whose closest points are within `threshold`.
    ///
    /// Boxes are indexed by their enclosing spheres; candidates are confirmed
    /// with the exact box separation.
    pub fn box_pairs(&self, boxes: &[BoundingBox], threshold: f64, sink: &mut PairSink) {
        let index = self.box_index();
        let spheres: Vec<Sphere> = boxes.iter().map(BoundingBox::enclosing_sphere).collect();
        let spheres = index.wrapped(&spheres).into_owned();
        let partition = index.partitioner.partition(&spheres);
        for (k, band_grid) in partition.bands.iter().enumerate() {
            for &i in &band_grid.band.members {
                if sink.is_exhausted() {
                    return;
                }
                for (l, target) in partition.bands.iter().enumerate().skip(k) {
                    let search_radius = threshold + spheres[i].radius + target.band.max_radius;
                    index.for_each_candidate(&spheres[i].center, search_radius, target, |j| {
                        if (l > k || j > i) && self.boxes_within(&boxes[i], &boxes[j], threshold) {
                            sink.push(canonical(i, j));
                        }
                    });
                }
            }
        }
    }

    /// All pairs `(i, j)` with box `i` of `a` and box `j` of `b` within `threshold`.
    pub fn box_cross_pairs(
        &self,
        a: &[BoundingBox],
        b: &[BoundingBox],
        threshold: f64,
        sink: &mut PairSink,
    ) {
        let index = self.box_index();
        let spheres_a: Vec<Sphere> = a.iter().map(BoundingBox::enclosing_sphere).collect();
        let spheres_a = index.wrapped(&spheres_a).into_owned();
        let spheres_b: Vec<Sphere> = b.iter().map(BoundingBox::enclosing_sphere).collect();
        let spheres_b = index.wrapped(&spheres_b).into_owned();
        let partition_b = index.partitioner.partition(&spheres_b);
        for (i, query) in spheres_a.iter().enumerate() {
            if sink.is_exhausted() {
                return;
            }
            for target in &partition_b.bands {
                let search_radius = threshold + query.radius + target.band.max_radius;
                index.for_each_candidate(&query.center, search_radius, target, |j| {
                    if self.boxes_within(&a[i], &b[j], threshold) {
                        sink.push((i, j));
                    }
                });
            }
        }
    }

    /// A copy of this finder whose bands account for full box extents.
    fn box_index(&self) -> GridFinder {
        GridFinder::new(*self.partitioner.config(), DistanceMode::SphereSurface)
            .with_periodic_box(self.periodic)
    }

    fn boxes_within(&self, a: &BoundingBox, b: &BoundingBox, threshold: f64) -> bool {
        match &self.periodic {
            Some(cell) => a.within_periodic(b, threshold, cell),
            None => a.within(b, threshold),
        }
    }
}

impl ClosePairFinder for GridFinder {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn mode(&self) -> DistanceMode {
        self.mode
    }

    fn self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink) {
        if self.periodic.is_some() {
            let wrapped = self.wrapped(spheres);
            self.periodic_self_pairs(&wrapped, threshold, sink);
            return;
        }
        let partition = self.partitioner.partition(spheres);

        for (k, band_grid) in partition.bands.iter().enumerate() {
            self.band_self_pairs(spheres, band_grid, threshold, sink);

            for other in &partition.bands[k + 1..] {
                let (query, target) = if band_grid.band.members.len() <= other.band.members.len() {
                    (band_grid, other)
                } else {
                    (other, band_grid)
                };
                for &i in &query.band.members {
                    if sink.is_exhausted() {
                        return;
                    }
                    self.query_band(&spheres[i], target, spheres, threshold, |j| {
                        sink.push(canonical(i, j));
                    });
                }
            }
        }
    }

    fn cross_pairs(&self, a: &[Sphere], b: &[Sphere], threshold: f64, sink: &mut PairSink) {
        let (a, b) = (self.wrapped(a), self.wrapped(b));
        let (a, b) = (a.as_ref(), b.as_ref());
        let partition_a = self.partitioner.partition(a);
        let partition_b = self.partitioner.partition(b);

        for band_a in &partition_a.bands {
            for band_b in &partition_b.bands {
                if band_a.band.members.len() <= band_b.band.members.len() {
                    for &i in &band_a.band.members {
                        self.query_band(&a[i], band_b, b, threshold, |j| sink.push((i, j)));
                    }
                } else {
                    for &j in &band_b.band.members {
                        self.query_band(&b[j], band_a, a, threshold, |i| sink.push((i, j)));
                    }
                }
                if sink.is_exhausted() {
                    return;
                }
            }
        }
    }

    fn self_pairs_touching(
        &self,
        spheres: &[Sphere],
        subset: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    ) {
        if subset.is_empty() {
            return;
        }
        let spheres = self.wrapped(spheres);
        let spheres = spheres.as_ref();
        let partition = self.partitioner.partition(spheres);
        for &i in subset {
            if sink.is_exhausted() {
                return;
            }
            for band_grid in &partition.bands {
                self.query_band(&spheres[i], band_grid, spheres, threshold, |j| {
                    if j != i {
                        sink.push(canonical(i, j));
                    }
                });
            }
        }
    }

    fn cross_pairs_touching(
        &self,
        a: &[Sphere],
        b: &[Sphere],
        subset_a: &[usize],
        subset_b: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    ) {
        let (a, b) = (self.wrapped(a), self.wrapped(b));
        let (a, b) = (a.as_ref(), b.as_ref());
        if !subset_a.is_empty() {
            let partition_b = self.partitioner.partition(b);
            for &i in subset_a {
                for band_grid in &partition_b.bands {
                    self.query_band(&a[i], band_grid, b, threshold, |j| sink.push((i, j)));
                }
            }
        }
        if !subset_b.is_empty() {
            let partition_a = self.partitioner.partition(a);
            for &j in subset_b {
                for band_grid in &partition_a.bands {
                    self.query_band(&b[j], band_grid, a, threshold, |i| sink.push((i, j)));
                }
            }
        }
    }
}
