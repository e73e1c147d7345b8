use crate::core::models::ids::RigidBodyId;
use crate::core::models::point_set::PointSet;
use nalgebra::{Isometry3, Point3};
use slotmap::SecondaryMap;

/// Objects and rigid bodies found to have moved beyond the slack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovedSet {
    /// Moved object indices, ascending and unique.
    pub indices: Vec<usize>,
    /// Rigid bodies whose frame moved far enough to flag all of their members.
    pub bodies: Vec<RigidBodyId>,
}

impl MovedSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
enum Baseline {
    #[default]
    Empty,
    Snapshot {
        positions: Vec<Point3<f64>>,
        frames: SecondaryMap<RigidBodyId, Isometry3<f64>>,
    },
}

/// Remembers where every object (and rigid frame) was when the pair list was
/// last known to be valid, and reports which ones have since moved too far.
#[derive(Debug, Clone, Default)]
pub struct MovedObjectTracker {
    baseline: Baseline,
}

impl MovedObjectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_snapshot(&self) -> bool {
        matches!(self.baseline, Baseline::Snapshot { .. })
    }

    /// Snapshot positions, if a snapshot has been taken.
    pub fn snapshot_positions(&self) -> Option<&[Point3<f64>]> {
        match &self.baseline {
            Baseline::Snapshot { positions, .. } => Some(positions),
            Baseline::Empty => None,
        }
    }

    /// Re-snapshots every object and frame.
    pub fn reset(&mut self, points: &PointSet) {
        let positions = points.iter().map(|o| o.position).collect();
        let frames = points
            .rigid_bodies()
            .map(|(id, body)| (id, body.frame))
            .collect();
        self.baseline = Baseline::Snapshot { positions, frames };
    }

    /// Folds the moved objects and frames back into the snapshot, leaving
    /// every other stored position untouched.
    pub fn reset_moved(&mut self, points: &PointSet, moved: &MovedSet) {
        let Baseline::Snapshot { positions, frames } = &mut self.baseline else {
            self.reset(points);
            return;
        };
        if positions.len() != points.len() {
            self.reset(points);
            return;
        }
        for &index in &moved.indices {
            if let Some(object) = points.get(index) {
                positions[index] = object.position;
            }
        }
        for &body in &moved.bodies {
            if let Some(rigid_body) = points.rigid_body(body) {
                frames.insert(body, rigid_body.frame);
            }
        }
    }

    /// Drops the snapshot. The next `get_moved` reports every object.
    pub fn clear(&mut self) {
        self.baseline = Baseline::Empty;
    }

    /// Reports every object displaced by strictly more than `slack` since its
    /// snapshot, plus every member of a rigid body whose frame moved so far
    /// that some member could have.
    ///
    /// A frame's motion is bounded by `|dt| + 2 sin(theta / 2) * extent`, the
    /// largest displacement any point within `extent` of the frame origin can
    /// undergo under translation `dt` and rotation angle `theta`.
    pub fn get_moved(&self, points: &PointSet, slack: f64) -> MovedSet {
        let Baseline::Snapshot { positions, frames } = &self.baseline else {
            return everything(points);
        };
        if positions.len() != points.len() {
            return everything(points);
        }

        let slack_squared = slack * slack;
        let mut flagged: Vec<bool> = points
            .iter()
            .zip(positions)
            .map(|(object, old)| (object.position - old).norm_squared() > slack_squared)
            .collect();

        let mut bodies = Vec::new();
        for (id, body) in points.rigid_bodies() {
            let Some(old) = frames.get(id) else {
                bodies.push(id);
                continue;
            };
            if frame_motion_bound(old, &body.frame, body.extent) > slack {
                bodies.push(id);
            }
        }
        for &id in &bodies {
            if let Some(body) = points.rigid_body(id) {
                for member in &body.members {
                    if let Some(index) = points.index_of(*member) {
                        flagged[index] = true;
                    }
                }
            }
        }

        let indices = flagged
            .iter()
            .enumerate()
            .filter_map(|(index, &moved)| moved.then_some(index))
            .collect();
        MovedSet { indices, bodies }
    }

    /// Largest displacement of any object from its snapshot; infinite without a snapshot.
    pub fn max_displacement(&self, points: &PointSet) -> f64 {
        match &self.baseline {
            Baseline::Snapshot { positions, .. } if positions.len() == points.len() => points
                .iter()
                .zip(positions)
                .map(|(object, old)| (object.position - old).norm())
                .fold(0.0, f64::max),
            _ => f64::INFINITY,
        }
    }
}

fn everything(points: &PointSet) -> MovedSet {
    MovedSet {
        indices: (0..points.len()).collect(),
        bodies: points.rigid_bodies().map(|(id, _)| id).collect(),
    }
}

fn frame_motion_bound(old: &Isometry3<f64>, new: &Isometry3<f64>, extent: f64) -> f64 {
    let translation = (new.translation.vector - old.translation.vector).norm();
    let angle = old.rotation.angle_to(&new.rotation);
    translation + 2.0 * (angle / 2.0).sin() * extent
}
