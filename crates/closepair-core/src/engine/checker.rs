use super::filter::{PairFilter, PairFilterChain};
use super::finder::{ClosePairFinder, PairSink, QuadraticFinder};
use super::pair_list::{IndexPair, PairList};
use crate::core::models::ids::ObjectId;
use crate::core::models::object::{Sphere, TrackedObject};
use crate::core::models::point_set::PointSet;
use crate::core::spatial::distance::DistanceMode;
use crate::core::spatial::periodic::PeriodicBox;
use itertools::Itertools;
use thiserror::Error;

/// Safety factor applied to the radius a list is checked against, absorbing
/// rounding at the exact envelope boundary.
const CHECK_FACTOR: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("Pair {pair:?} is listed more than once")]
    Duplicate { pair: IndexPair },
    #[error("Pair {pair:?} pairs an object with itself")]
    SelfPair { pair: IndexPair },
    #[error("Pair {pair:?} is not in canonical order")]
    NonCanonical { pair: IndexPair },
    #[error("Pair {pair:?} is out of sorted order")]
    Unsorted { pair: IndexPair },
    #[error("Pair {pair:?} references an object outside the point set")]
    OutOfRange { pair: IndexPair },
    #[error("Pair {pair:?} is excluded by filter '{filter}'")]
    Filtered { pair: IndexPair, filter: String },
    #[error("Pair {pair:?} at separation {separation} is missing (checked up to {threshold})")]
    Missing {
        pair: IndexPair,
        separation: f64,
        threshold: f64,
    },
    #[error("Filter '{filter}' gives different verdicts for ({a}, {b}) and ({b}, {a})")]
    AsymmetricFilter {
        filter: String,
        a: ObjectId,
        b: ObjectId,
    },
}

/// Exhaustive validator for maintained pair lists.
///
/// Recomputes the brute-force answer at `0.9 * (distance + 2 * slack - drift)`,
/// where `drift` is the largest motion since the list's snapshot, and checks
/// that every such pair is listed. It also checks the structural invariants of
/// the list itself.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker {
    mode: DistanceMode,
    distance: f64,
    slack: f64,
    periodic: Option<PeriodicBox>,
}

impl ConsistencyChecker {
    pub fn new(mode: DistanceMode, distance: f64, slack: f64) -> Self {
        Self {
            mode,
            distance,
            slack,
            periodic: None,
        }
    }

    pub fn with_periodic_box(mut self, periodic: Option<PeriodicBox>) -> Self {
        self.periodic = periodic;
        self
    }

    fn reference(&self) -> QuadraticFinder {
        QuadraticFinder::new(self.mode).with_periodic_box(self.periodic)
    }

    fn separation(&self, a: &Sphere, b: &Sphere) -> f64 {
        match &self.periodic {
            Some(cell) => self.mode.distance_periodic(a, b, cell),
            None => self.mode.distance(a, b),
        }
    }

    /// The separation up to which every pair must be listed.
    pub fn check_threshold(&self, drift: f64) -> f64 {
        CHECK_FACTOR * (self.distance + 2.0 * self.slack - drift)
    }

    pub fn check_self(
        &self,
        points: &PointSet,
        list: &PairList,
        filters: &PairFilterChain,
        max_displacement: f64,
    ) -> Result<(), InvariantViolation> {
        check_order(list)?;
        let objects = points.objects();
        for &pair in list {
            let (i, j) = pair;
            if i == j {
                return Err(InvariantViolation::SelfPair { pair });
            }
            if i > j {
                return Err(InvariantViolation::NonCanonical { pair });
            }
            if j >= objects.len() {
                return Err(InvariantViolation::OutOfRange { pair });
            }
            check_not_filtered(pair, &objects[i], &objects[j], filters)?;
        }

        let threshold = self.check_threshold(2.0 * max_displacement);
        if !(threshold >= 0.0) {
            return Ok(());
        }
        let spheres = points.spheres();
        let mut sink = PairSink::new(None);
        self.reference().self_pairs(&spheres, threshold, &mut sink);
        for pair in sink.finish().unwrap_or_default() {
            let (i, j) = pair;
            if filters.excludes(&objects[i], &objects[j]) || list.contains(&pair) {
                continue;
            }
            return Err(InvariantViolation::Missing {
                pair,
                separation: self.separation(&spheres[i], &spheres[j]),
                threshold,
            });
        }
        Ok(())
    }

    pub fn check_bipartite(
        &self,
        a: &PointSet,
        b: &PointSet,
        list: &PairList,
        filters: &PairFilterChain,
        max_displacement: f64,
    ) -> Result<(), InvariantViolation> {
        check_order(list)?;
        let (objects_a, objects_b) = (a.objects(), b.objects());
        for &pair in list {
            let (i, j) = pair;
            if i >= objects_a.len() || j >= objects_b.len() {
                return Err(InvariantViolation::OutOfRange { pair });
            }
            check_not_filtered(pair, &objects_a[i], &objects_b[j], filters)?;
        }

        let threshold = self.check_threshold(max_displacement);
        if !(threshold >= 0.0) {
            return Ok(());
        }
        let (spheres_a, spheres_b) = (a.spheres(), b.spheres());
        let mut sink = PairSink::new(None);
        self.reference().cross_pairs(&spheres_a, &spheres_b, threshold, &mut sink);
        for pair in sink.finish().unwrap_or_default() {
            let (i, j) = pair;
            if filters.excludes(&objects_a[i], &objects_b[j]) || list.contains(&pair) {
                continue;
            }
            return Err(InvariantViolation::Missing {
                pair,
                separation: self.separation(&spheres_a[i], &spheres_b[j]),
                threshold,
            });
        }
        Ok(())
    }
}

/// Checks that `filter` gives the same verdict for every pair in both orders.
pub fn check_filter_symmetry(
    filter: &dyn PairFilter,
    points: &PointSet,
) -> Result<(), InvariantViolation> {
    for (a, b) in points.objects().iter().tuple_combinations() {
        if filter.excludes(a, b) != filter.excludes(b, a) {
            return Err(InvariantViolation::AsymmetricFilter {
                filter: filter.name().to_string(),
                a: a.id,
                b: b.id,
            });
        }
    }
    Ok(())
}

fn check_order(list: &PairList) -> Result<(), InvariantViolation> {
    for (&previous, &pair) in list.as_slice().iter().tuple_windows() {
        if previous == pair {
            return Err(InvariantViolation::Duplicate { pair });
        }
        if previous > pair {
            return Err(InvariantViolation::Unsorted { pair });
        }
    }
    Ok(())
}

fn check_not_filtered(
    pair: IndexPair,
    a: &TrackedObject,
    b: &TrackedObject,
    filters: &PairFilterChain,
) -> Result<(), InvariantViolation> {
    match filters.filters().iter().find(|filter| filter.excludes(a, b)) {
        Some(filter) => Err(InvariantViolation::Filtered {
            pair,
            filter: filter.name().to_string(),
        }),
        None => Ok(()),
    }
}
