use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    pub struct RigidBodyId;
}

/// Stable identity of an object within a [`PointSet`](super::point_set::PointSet).
///
/// Ids are handed out monotonically and are never reused while the owning set
/// is alive, so they survive removals that shift storage indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
