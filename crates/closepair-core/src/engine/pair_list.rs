/// An index pair. Self-join lists store `(i, j)` with `i < j`; bipartite
/// lists store `(index in A, index in B)`.
pub type IndexPair = (usize, usize);

/// A sorted, duplicate-free list of index pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairList {
    pairs: Vec<IndexPair>,
}

impl PairList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts and deduplicates `pairs` into a list. Orientation is kept as given.
    pub fn from_unsorted(mut pairs: Vec<IndexPair>) -> Self {
        pairs.sort_unstable();
        pairs.dedup();
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexPair> {
        self.pairs.iter()
    }

    pub fn as_slice(&self) -> &[IndexPair] {
        &self.pairs
    }

    pub fn contains(&self, pair: &IndexPair) -> bool {
        self.pairs.binary_search(pair).is_ok()
    }

    pub fn into_vec(self) -> Vec<IndexPair> {
        self.pairs
    }
}

impl<'a> IntoIterator for &'a PairList {
    type Item = &'a IndexPair;
    type IntoIter = std::slice::Iter<'a, IndexPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// Orders a self-join pair so that the smaller index comes first.
#[inline]
pub fn canonical(i: usize, j: usize) -> IndexPair {
    if i < j { (i, j) } else { (j, i) }
}
