//! Exact pair search strategies.
//!
//! Every strategy implements [`ClosePairFinder`] and must report the same pair
//! set for the same input; the quadratic strategy serves as the reference the
//! grid and rigid-body strategies are checked against.

mod grid;
mod quadratic;
mod rigid;

pub use grid::GridFinder;
pub use quadratic::QuadraticFinder;
pub use rigid::RigidFinder;

use super::config::{FinderStrategy, ProximityConfig};
use super::error::EngineError;
use super::pair_list::IndexPair;
use crate::core::models::object::Sphere;
use crate::core::spatial::distance::DistanceMode;
use std::fmt;

/// Collects candidate pairs, enforcing an optional size limit and reporting
/// allocation failure instead of aborting.
///
/// After the first failure the sink ignores further pairs; the error is
/// returned by [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct PairSink {
    pairs: Vec<IndexPair>,
    limit: Option<usize>,
    error: Option<EngineError>,
}

impl PairSink {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            pairs: Vec::new(),
            limit,
            error: None,
        }
    }

    #[inline]
    pub fn push(&mut self, pair: IndexPair) {
        if self.error.is_some() {
            return;
        }
        if self.limit.is_some_and(|limit| self.pairs.len() >= limit) {
            self.error = Some(EngineError::exhausted(self.pairs.len() + 1));
            return;
        }
        if self.pairs.len() == self.pairs.capacity() {
            let additional = self.pairs.capacity().max(64);
            if self.pairs.try_reserve(additional).is_err() {
                self.error = Some(EngineError::exhausted(self.pairs.len() + additional));
                return;
            }
        }
        self.pairs.push(pair);
    }

    /// Records a failure from a nested search; the first error wins.
    pub fn fail(&mut self, error: EngineError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// True once a push has failed; finders use this to stop early.
    pub fn is_exhausted(&self) -> bool {
        self.error.is_some()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn finish(self) -> Result<Vec<IndexPair>, EngineError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.pairs),
        }
    }
}

/// A strategy that finds every pair within a threshold.
///
/// Self-join pairs are emitted as `(i, j)` with `i < j`; bipartite pairs as
/// `(index in a, index in b)`. Pairs may be emitted more than once and in any
/// order; callers sort and deduplicate.
pub trait ClosePairFinder: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn mode(&self) -> DistanceMode;

    /// All pairs of distinct objects of `spheres` within `threshold`.
    fn self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink);

    /// All pairs `(i, j)` with `i` from `a` and `j` from `b` within `threshold`.
    fn cross_pairs(&self, a: &[Sphere], b: &[Sphere], threshold: f64, sink: &mut PairSink);

    /// All self-join pairs within `threshold` that involve at least one index of `subset`.
    fn self_pairs_touching(
        &self,
        spheres: &[Sphere],
        subset: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    );

    /// All bipartite pairs within `threshold` whose `a` side is in `subset_a`
    /// or whose `b` side is in `subset_b`.
    fn cross_pairs_touching(
        &self,
        a: &[Sphere],
        b: &[Sphere],
        subset_a: &[usize],
        subset_b: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    );
}

/// Instantiates the strategy selected by `config`.
pub fn finder_for(config: &ProximityConfig) -> Box<dyn ClosePairFinder> {
    match config.strategy {
        FinderStrategy::Quadratic => {
            Box::new(QuadraticFinder::new(config.mode).with_periodic_box(config.periodic_box))
        }
        FinderStrategy::Grid => Box::new(
            GridFinder::new(config.partition, config.mode).with_periodic_box(config.periodic_box),
        ),
        FinderStrategy::Rigid => Box::new(RigidFinder::new(config.partition, config.mode)),
    }
}
