use super::ids::{ObjectId, RigidBodyId};
use nalgebra::{Isometry3, Point3};

/// A sphere view of an object: center and interaction radius.
///
/// Pair finders operate on slices of spheres rather than on [`TrackedObject`]s so
/// that the same search can run against live positions or against a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center of the sphere in world coordinates.
    pub center: Point3<f64>,
    /// Interaction radius; always finite and non-negative.
    pub radius: f64,
    /// Rigid body carrying the object, used by body-aware finders to group members.
    pub body: Option<RigidBodyId>,
}

impl Sphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self {
            center,
            radius,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Option<RigidBodyId>) -> Self {
        self.body = body;
        self
    }
}

/// Links an object to the rigid body that carries it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidMembership {
    /// The owning body, looked up by id in the point set's body table.
    pub body: RigidBodyId,
    /// Position of the member expressed in the body's frame.
    pub local_position: Point3<f64>,
}

/// One object tracked by the proximity engine.
///
/// The `position` field always holds the world position. For rigid members it
/// is kept equal to `frame * local_position` by the owning
/// [`PointSet`](super::point_set::PointSet).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// Stable identity of the object.
    pub id: ObjectId,
    /// Current world position.
    pub position: Point3<f64>,
    /// Interaction radius.
    pub radius: f64,
    /// Rigid body membership, if the object moves with a rigid frame.
    pub membership: Option<RigidMembership>,
}

impl TrackedObject {
    pub fn sphere(&self) -> Sphere {
        Sphere::new(self.position, self.radius).with_body(self.rigid_body())
    }

    pub fn rigid_body(&self) -> Option<RigidBodyId> {
        self.membership.map(|m| m.body)
    }
}

/// A rigid reference frame that moves a group of member objects together.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    /// Current body-to-world transformation.
    pub frame: Isometry3<f64>,
    /// Ids of the member objects, in insertion order.
    pub members: Vec<ObjectId>,
    /// Largest distance of any member from the frame origin, in body coordinates.
    pub extent: f64,
}

impl RigidBody {
    pub fn new(frame: Isometry3<f64>) -> Self {
        Self {
            frame,
            members: Vec::new(),
            extent: 0.0,
        }
    }
}
