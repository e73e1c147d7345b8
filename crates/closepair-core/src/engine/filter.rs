use crate::core::models::ids::ObjectId;
use crate::core::models::object::TrackedObject;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A non-geometric exclusion rule applied to candidate pairs.
///
/// Implementations must be symmetric (`excludes(a, b) == excludes(b, a)`) and
/// stable: the verdict for a pair may only change together with a structural
/// change of the point set. An unstable filter makes incremental updates
/// diverge from a rebuild.
pub trait PairFilter: Send + Sync {
    fn name(&self) -> &str;

    fn excludes(&self, a: &TrackedObject, b: &TrackedObject) -> bool;
}

/// Excludes explicitly listed pairs of objects, such as bonded neighbours.
#[derive(Debug, Clone, Default)]
pub struct BondedPairFilter {
    pairs: HashSet<(ObjectId, ObjectId)>,
}

impl BondedPairFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I: IntoIterator<Item = (ObjectId, ObjectId)>>(pairs: I) -> Self {
        let mut filter = Self::new();
        for (a, b) in pairs {
            filter.insert(a, b);
        }
        filter
    }

    pub fn insert(&mut self, a: ObjectId, b: ObjectId) {
        self.pairs.insert(ordered(a, b));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PairFilter for BondedPairFilter {
    fn name(&self) -> &str {
        "bonded"
    }

    fn excludes(&self, a: &TrackedObject, b: &TrackedObject) -> bool {
        self.pairs.contains(&ordered(a.id, b.id))
    }
}

/// Excludes pairs carried by the same rigid body, whose separation never changes.
///
/// Rigid body ids are only meaningful within one point set, so this filter is
/// intended for self-join controllers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameRigidBodyFilter;

impl PairFilter for SameRigidBodyFilter {
    fn name(&self) -> &str {
        "same-rigid-body"
    }

    fn excludes(&self, a: &TrackedObject, b: &TrackedObject) -> bool {
        matches!((a.rigid_body(), b.rigid_body()), (Some(x), Some(y)) if x == y)
    }
}

/// Adapts a closure into a filter. The closure must itself be symmetric.
pub struct FnPairFilter<F> {
    name: String,
    predicate: F,
}

impl<F> FnPairFilter<F>
where
    F: Fn(&TrackedObject, &TrackedObject) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> PairFilter for FnPairFilter<F>
where
    F: Fn(&TrackedObject, &TrackedObject) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn excludes(&self, a: &TrackedObject, b: &TrackedObject) -> bool {
        (self.predicate)(a, b)
    }
}

/// An ordered list of shared filters. A pair is excluded if any filter excludes it.
#[derive(Clone, Default)]
pub struct PairFilterChain {
    filters: Vec<Arc<dyn PairFilter>>,
}

impl fmt::Debug for PairFilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}

impl PairFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Arc<dyn PairFilter>) {
        self.filters.push(filter);
    }

    /// Removes every filter with the given name, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.name() != name);
        before - self.filters.len()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Arc<dyn PairFilter>] {
        &self.filters
    }

    pub fn excludes(&self, a: &TrackedObject, b: &TrackedObject) -> bool {
        self.filters.iter().any(|filter| filter.excludes(a, b))
    }

    /// Like [`excludes`](Self::excludes) but only consults filters from `start` on.
    pub(crate) fn excludes_from(&self, start: usize, a: &TrackedObject, b: &TrackedObject) -> bool {
        self.filters
            .iter()
            .skip(start)
            .any(|filter| filter.excludes(a, b))
    }
}

fn ordered(a: ObjectId, b: ObjectId) -> (ObjectId, ObjectId) {
    if a <= b { (a, b) } else { (b, a) }
}
