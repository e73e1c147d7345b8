use super::{ClosePairFinder, PairSink};
use crate::core::models::object::Sphere;
use crate::core::spatial::distance::DistanceMode;
use crate::core::spatial::periodic::PeriodicBox;
use crate::engine::pair_list::canonical;

#[cfg(any(feature = "parallel", test))]
use crate::engine::pair_list::IndexPair;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Rows evaluated per parallel block; bounds the pairs buffered before the
/// sink can stop the scan.
#[cfg(feature = "parallel")]
const ROW_BLOCK: usize = 64;

/// Tests every candidate pair. Used as the reference strategy and for small sets.
#[derive(Debug, Clone, Copy)]
pub struct QuadraticFinder {
    mode: DistanceMode,
    periodic: Option<PeriodicBox>,
}

impl QuadraticFinder {
    pub fn new(mode: DistanceMode) -> Self {
        Self {
            mode,
            periodic: None,
        }
    }

    /// Measures separations between nearest images in `periodic`.
    pub fn with_periodic_box(mut self, periodic: Option<PeriodicBox>) -> Self {
        self.periodic = periodic;
        self
    }

    #[inline]
    fn within(&self, a: &Sphere, b: &Sphere, threshold: f64) -> bool {
        self.mode.within_in(a, b, threshold, self.periodic.as_ref())
    }

    #[cfg(feature = "parallel")]
    fn row(&self, spheres: &[Sphere], i: usize, threshold: f64) -> Vec<IndexPair> {
        let query = &spheres[i];
        spheres[i + 1..]
            .iter()
            .enumerate()
            .filter(|(_, other)| self.within(query, other, threshold))
            .map(|(offset, _)| (i, i + 1 + offset))
            .collect()
    }
}

impl ClosePairFinder for QuadraticFinder {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn mode(&self) -> DistanceMode {
        self.mode
    }

    #[cfg(not(feature = "parallel"))]
    fn self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink) {
        for (i, query) in spheres.iter().enumerate() {
            if sink.is_exhausted() {
                return;
            }
            for (j, other) in spheres.iter().enumerate().skip(i + 1) {
                if self.within(query, other, threshold) {
                    sink.push((i, j));
                }
            }
        }
    }

    #[cfg(feature = "parallel")]
    fn self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink) {
        for start in (0..spheres.len()).step_by(ROW_BLOCK) {
            if sink.is_exhausted() {
                return;
            }
            let end = (start + ROW_BLOCK).min(spheres.len());
            let rows: Vec<Vec<IndexPair>> = (start..end)
                .into_par_iter()
                .map(|i| self.row(spheres, i, threshold))
                .collect();
            for pair in rows.into_iter().flatten() {
                sink.push(pair);
            }
        }
    }

    fn cross_pairs(&self, a: &[Sphere], b: &[Sphere], threshold: f64, sink: &mut PairSink) {
        for (i, sa) in a.iter().enumerate() {
            if sink.is_exhausted() {
                return;
            }
            for (j, sb) in b.iter().enumerate() {
                if self.within(sa, sb, threshold) {
                    sink.push((i, j));
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
        for &i in subset {
            if sink.is_exhausted() {
                return;
            }
            let query = &spheres[i];
            for (j, other) in spheres.iter().enumerate() {
                if j != i && self.within(query, other, threshold) {
                    sink.push(canonical(i, j));
                }
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
        for &i in subset_a {
            if sink.is_exhausted() {
                return;
            }
            for (j, sb) in b.iter().enumerate() {
                if self.within(&a[i], sb, threshold) {
                    sink.push((i, j));
                }
            }
        }
        for &j in subset_b {
            if sink.is_exhausted() {
                return;
            }
            for (i, sa) in a.iter().enumerate() {
                if self.within(sa, &b[j], threshold) {
                    sink.push((i, j));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn line(radius: f64, xs: &[f64]) -> Vec<Sphere> {
        xs.iter()
            .map(|&x| Sphere::new(Point3::new(x, 0.0, 0.0), radius))
            .collect()
    }

    fn self_pairs(finder: &QuadraticFinder, spheres: &[Sphere], threshold: f64) -> Vec<IndexPair> {
        let mut sink = PairSink::new(None);
        finder.self_pairs(spheres, threshold, &mut sink);
        let mut pairs = sink.finish().unwrap();
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn self_pairs_emits_canonical_pairs_including_the_boundary() {
        let spheres = line(1.0, &[0.0, 6.0, 12.5]);
        let finder = QuadraticFinder::new(DistanceMode::SphereSurface);
        assert_eq!(self_pairs(&finder, &spheres, 4.0), vec![(0, 1)]);
        assert_eq!(self_pairs(&finder, &spheres, 4.5), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn center_mode_uses_center_distances() {
        let spheres = line(1.0, &[0.0, 6.0]);
        let finder = QuadraticFinder::new(DistanceMode::Center);
        assert!(self_pairs(&finder, &spheres, 4.0).is_empty());
        assert_eq!(self_pairs(&finder, &spheres, 6.0), vec![(0, 1)]);
    }

    #[test]
    fn cross_pairs_keep_set_orientation() {
        let a = line(0.0, &[10.0]);
        let b = line(0.0, &[0.0, 9.0, 11.0]);
        let finder = QuadraticFinder::new(DistanceMode::Center);
        let mut sink = PairSink::new(None);
        finder.cross_pairs(&a, &b, 1.0, &mut sink);
        assert_eq!(sink.finish().unwrap(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn self_pairs_stop_scanning_once_the_limit_is_hit() {
        // Every pair of 20k coincident points qualifies; collecting them all
        // would need about two hundred million entries.
        let spheres = line(0.0, &vec![0.0; 20_000]);
        let finder = QuadraticFinder::new(DistanceMode::Center);
        let mut sink = PairSink::new(Some(10));
        finder.self_pairs(&spheres, 1.0, &mut sink);
        assert!(sink.is_exhausted());
        assert_eq!(sink.len(), 10);
        assert!(sink.finish().is_err());
    }

    #[test]
    fn periodic_box_pairs_across_the_boundary() {
        let spheres = line(0.0, &[0.5, 5.0, 9.8]);
        let cell = PeriodicBox::cubic(10.0).unwrap();
        let open = QuadraticFinder::new(DistanceMode::Center);
        let wrapped = open.with_periodic_box(Some(cell));
        assert!(self_pairs(&open, &spheres, 1.0).is_empty());
        assert_eq!(self_pairs(&wrapped, &spheres, 1.0), vec![(0, 2)]);
    }

    #[test]
    fn cross_pairs_stop_once_the_sink_is_exhausted() {
        let a = line(0.0, &[0.0, 0.0, 0.0]);
        let b = line(0.0, &[0.0, 0.0, 0.0]);
        let finder = QuadraticFinder::new(DistanceMode::Center);
        let mut sink = PairSink::new(Some(4));
        finder.cross_pairs(&a, &b, 1.0, &mut sink);
        assert!(sink.finish().is_err());
    }
}
