use super::ids::{ObjectId, RigidBodyId};
use super::object::{RigidBody, RigidMembership, Sphere, TrackedObject};
use nalgebra::{Isometry3, Point3, Vector3};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_INSTANCE_KEY: AtomicU64 = AtomicU64::new(1);

fn next_instance_key() -> u64 {
    NEXT_INSTANCE_KEY.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Error, PartialEq)]
pub enum PointSetError {
    #[error("Position {position:?} has a non-finite coordinate")]
    NonFinitePosition { position: [f64; 3] },
    #[error("Radius {0} is not a finite, non-negative number")]
    InvalidRadius(f64),
    #[error("Object {0} not found in the point set")]
    ObjectNotFound(ObjectId),
    #[error("Index {index} is out of bounds for a point set of {len} objects")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("Rigid body {0:?} not found in the point set")]
    RigidBodyNotFound(RigidBodyId),
    #[error("Rigid frame contains non-finite values")]
    NonFiniteFrame,
}

/// An ordered collection of objects with positions and interaction radii.
///
/// The set is owned by the caller and borrowed by the proximity engine for
/// the duration of each update. Storage order defines the object indices used
/// in pair lists; identity is carried by the stable [`ObjectId`].
///
/// Every operation that changes membership or radii bumps the structure
/// version, which controllers use to detect that their cached list must be
/// rebuilt from scratch. Moving objects does not.
///
/// Each set (including every clone) also carries a process-unique instance
/// key so that a controller notices when it is handed a different set.
#[derive(Debug)]
pub struct PointSet {
    /// Objects in index order.
    objects: Vec<TrackedObject>,
    /// Lookup map from stable id to current storage index.
    index_map: HashMap<ObjectId, usize>,
    /// Rigid bodies carrying some of the objects.
    rigid_bodies: SlotMap<RigidBodyId, RigidBody>,
    /// Next id to hand out; ids are never reused.
    next_id: u64,
    /// Incremented on every structural change.
    structure_version: u64,
    instance_key: u64,
}

impl Default for PointSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PointSet {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            index_map: self.index_map.clone(),
            rigid_bodies: self.rigid_bodies.clone(),
            next_id: self.next_id,
            structure_version: self.structure_version,
            instance_key: next_instance_key(),
        }
    }
}

impl PointSet {
    /// Creates a new, empty point set.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            index_map: HashMap::new(),
            rigid_bodies: SlotMap::with_key(),
            next_id: 0,
            structure_version: 0,
            instance_key: next_instance_key(),
        }
    }

    /// Adds a free object and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is not finite or the radius is
    /// negative, NaN or infinite.
    pub fn add(&mut self, position: Point3<f64>, radius: f64) -> Result<ObjectId, PointSetError> {
        validate_position(&position)?;
        validate_radius(radius)?;
        Ok(self.push_object(position, radius, None))
    }

    /// Adds a rigid body with the given frame and no members.
    pub fn add_rigid_body(&mut self, frame: Isometry3<f64>) -> Result<RigidBodyId, PointSetError> {
        validate_frame(&frame)?;
        self.structure_version += 1;
        Ok(self.rigid_bodies.insert(RigidBody::new(frame)))
    }

    /// Adds an object carried by `body`, placed at `local_position` in the body frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not exist or the inputs are not finite.
    pub fn add_rigid_member(
        &mut self,
        body: RigidBodyId,
        local_position: Point3<f64>,
        radius: f64,
    ) -> Result<ObjectId, PointSetError> {
        validate_position(&local_position)?;
        validate_radius(radius)?;
        let frame = self
            .rigid_bodies
            .get(body)
            .ok_or(PointSetError::RigidBodyNotFound(body))?
            .frame;

        let world = frame * local_position;
        let id = self.push_object(
            world,
            radius,
            Some(RigidMembership {
                body,
                local_position,
            }),
        );

        if let Some(rigid_body) = self.rigid_bodies.get_mut(body) {
            rigid_body.members.push(id);
            rigid_body.extent = rigid_body.extent.max(local_position.coords.norm());
        }
        Ok(id)
    }

    /// Removes an object, shifting the indices of every later object down by one.
    pub fn remove(&mut self, id: ObjectId) -> Result<TrackedObject, PointSetError> {
        let index = self
            .index_of(id)
            .ok_or(PointSetError::ObjectNotFound(id))?;
        let removed = self.objects.remove(index);
        self.index_map.remove(&id);
        for (offset, object) in self.objects[index..].iter().enumerate() {
            self.index_map.insert(object.id, index + offset);
        }

        if let Some(membership) = removed.membership {
            if let Some(body) = self.rigid_bodies.get_mut(membership.body) {
                body.members.retain(|&member| member != id);
            }
            self.recompute_extent(membership.body);
        }

        self.structure_version += 1;
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns the object stored at `index`.
    pub fn get(&self, index: usize) -> Option<&TrackedObject> {
        self.objects.get(index)
    }

    /// Returns the object with the given id.
    pub fn object(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.index_of(id).map(|index| &self.objects[index])
    }

    /// Returns the current storage index of the object with the given id.
    pub fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.index_map.get(&id).copied()
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    pub fn rigid_body(&self, id: RigidBodyId) -> Option<&RigidBody> {
        self.rigid_bodies.get(id)
    }

    pub fn rigid_bodies(&self) -> impl Iterator<Item = (RigidBodyId, &RigidBody)> {
        self.rigid_bodies.iter()
    }

    /// Version counter bumped on every add, remove or radius change.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// Process-unique key of this set instance; clones receive a fresh key.
    pub fn instance_key(&self) -> u64 {
        self.instance_key
    }

    /// Returns a sphere view of every object, in index order.
    pub fn spheres(&self) -> Vec<Sphere> {
        self.objects.iter().map(TrackedObject::sphere).collect()
    }

    /// Moves the object at `index` to a new world position.
    ///
    /// For a rigid member the member-local coordinates are updated so that the
    /// new world position is consistent with the unchanged body frame.
    pub fn set_position(&mut self, index: usize, position: Point3<f64>) -> Result<(), PointSetError> {
        validate_position(&position)?;
        let len = self.objects.len();
        let object = self
            .objects
            .get_mut(index)
            .ok_or(PointSetError::IndexOutOfBounds { index, len })?;
        object.position = position;

        if let Some(membership) = object.membership.as_mut() {
            let body = self
                .rigid_bodies
                .get_mut(membership.body)
                .ok_or(PointSetError::RigidBodyNotFound(membership.body))?;
            membership.local_position = body.frame.inverse_transform_point(&position);
            body.extent = body.extent.max(membership.local_position.coords.norm());
        }
        Ok(())
    }

    /// Displaces the object at `index` by `delta`.
    pub fn translate(&mut self, index: usize, delta: &Vector3<f64>) -> Result<(), PointSetError> {
        let len = self.objects.len();
        let current = self
            .objects
            .get(index)
            .ok_or(PointSetError::IndexOutOfBounds { index, len })?
            .position;
        self.set_position(index, current + delta)
    }

    /// Changes the interaction radius of the object at `index`.
    ///
    /// Radii decide band membership, so this counts as a structural change.
    pub fn set_radius(&mut self, index: usize, radius: f64) -> Result<(), PointSetError> {
        validate_radius(radius)?;
        let len = self.objects.len();
        let object = self
            .objects
            .get_mut(index)
            .ok_or(PointSetError::IndexOutOfBounds { index, len })?;
        object.radius = radius;
        self.structure_version += 1;
        Ok(())
    }

    /// Replaces the frame of a rigid body and moves all of its members with it.
    pub fn set_rigid_body_frame(
        &mut self,
        id: RigidBodyId,
        frame: Isometry3<f64>,
    ) -> Result<(), PointSetError> {
        validate_frame(&frame)?;
        let body = self
            .rigid_bodies
            .get_mut(id)
            .ok_or(PointSetError::RigidBodyNotFound(id))?;
        body.frame = frame;

        for member in &body.members {
            let Some(&index) = self.index_map.get(member) else {
                continue;
            };
            let object = &mut self.objects[index];
            if let Some(membership) = object.membership {
                object.position = frame * membership.local_position;
            }
        }
        Ok(())
    }

    fn push_object(
        &mut self,
        position: Point3<f64>,
        radius: f64,
        membership: Option<RigidMembership>,
    ) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.index_map.insert(id, self.objects.len());
        self.objects.push(TrackedObject {
            id,
            position,
            radius,
            membership,
        });
        self.structure_version += 1;
        id
    }

    fn recompute_extent(&mut self, id: RigidBodyId) {
        let Some(body) = self.rigid_bodies.get(id) else {
            return;
        };
        let extent = body
            .members
            .iter()
            .filter_map(|member| self.index_map.get(member))
            .filter_map(|&index| self.objects[index].membership)
            .map(|membership| membership.local_position.coords.norm())
            .fold(0.0, f64::max);
        if let Some(body) = self.rigid_bodies.get_mut(id) {
            body.extent = extent;
        }
    }
}

fn validate_position(position: &Point3<f64>) -> Result<(), PointSetError> {
    if position.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(PointSetError::NonFinitePosition {
            position: [position.x, position.y, position.z],
        })
    }
}

fn validate_radius(radius: f64) -> Result<(), PointSetError> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(())
    } else {
        Err(PointSetError::InvalidRadius(radius))
    }
}

fn validate_frame(frame: &Isometry3<f64>) -> Result<(), PointSetError> {
    let translation_ok = frame.translation.vector.iter().all(|c| c.is_finite());
    let rotation_ok = frame.rotation.coords.iter().all(|c| c.is_finite());
    if translation_ok && rotation_ok {
        Ok(())
    } else {
        Err(PointSetError::NonFiniteFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f64::consts::FRAC_PI_2;

    fn approx_eq(a: &Point3<f64>, b: &Point3<f64>) -> bool {
        (a - b).norm() < 1e-9
    }

    #[test]
    fn add_assigns_sequential_ids_and_indices() {
        let mut points = PointSet::new();
        let a = points.add(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
        let b = points.add(Point3::new(1.0, 0.0, 0.0), 2.0).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points.index_of(a), Some(0));
        assert_eq!(points.index_of(b), Some(1));
        assert_eq!(points.get(1).unwrap().radius, 2.0);
    }

    #[test]
    fn add_rejects_non_finite_positions_and_bad_radii() {
        let mut points = PointSet::new();
        assert!(matches!(
            points.add(Point3::new(f64::NAN, 0.0, 0.0), 1.0),
            Err(PointSetError::NonFinitePosition { .. })
        ));
        assert!(matches!(
            points.add(Point3::new(f64::INFINITY, 0.0, 0.0), 1.0),
            Err(PointSetError::NonFinitePosition { .. })
        ));
        assert!(matches!(
            points.add(Point3::origin(), -1.0),
            Err(PointSetError::InvalidRadius(_))
        ));
        assert!(matches!(
            points.add(Point3::origin(), f64::NAN),
            Err(PointSetError::InvalidRadius(_))
        ));
        assert!(points.is_empty());
    }

    #[test]
    fn remove_shifts_indices_and_never_reuses_ids() {
        let mut points = PointSet::new();
        let a = points.add(Point3::new(0.0, 0.0, 0.0), 1.0).unwrap();
        let b = points.add(Point3::new(1.0, 0.0, 0.0), 1.0).unwrap();
        let c = points.add(Point3::new(2.0, 0.0, 0.0), 1.0).unwrap();

        let removed = points.remove(a).unwrap();
        assert_eq!(removed.id, a);
        assert_eq!(points.index_of(b), Some(0));
        assert_eq!(points.index_of(c), Some(1));
        assert_eq!(points.index_of(a), None);

        let d = points.add(Point3::origin(), 1.0).unwrap();
        assert!(d > c);
        assert_eq!(points.remove(a), Err(PointSetError::ObjectNotFound(a)));
    }

    #[test]
    fn structural_changes_bump_version_but_moves_do_not() {
        let mut points = PointSet::new();
        let v0 = points.structure_version();
        points.add(Point3::origin(), 1.0).unwrap();
        let v1 = points.structure_version();
        assert!(v1 > v0);

        points.translate(0, &Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(points.structure_version(), v1);

        points.set_radius(0, 2.0).unwrap();
        assert!(points.structure_version() > v1);
    }

    #[test]
    fn rigid_members_follow_their_frame() {
        let mut points = PointSet::new();
        let body = points.add_rigid_body(Isometry3::identity()).unwrap();
        let member = points
            .add_rigid_member(body, Point3::new(1.0, 0.0, 0.0), 0.5)
            .unwrap();
        let index = points.index_of(member).unwrap();

        let frame = Isometry3::from_parts(
            Translation3::new(10.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );
        points.set_rigid_body_frame(body, frame).unwrap();

        assert!(approx_eq(
            &points.get(index).unwrap().position,
            &Point3::new(10.0, 1.0, 0.0)
        ));
        assert_eq!(points.rigid_body(body).unwrap().extent, 1.0);
    }

    #[test]
    fn set_position_on_member_updates_local_coordinates() {
        let mut points = PointSet::new();
        let frame = Isometry3::translation(5.0, 0.0, 0.0);
        let body = points.add_rigid_body(frame).unwrap();
        let member = points.add_rigid_member(body, Point3::origin(), 0.5).unwrap();
        let index = points.index_of(member).unwrap();

        points.set_position(index, Point3::new(5.0, 3.0, 0.0)).unwrap();
        let membership = points.get(index).unwrap().membership.unwrap();
        assert!(approx_eq(&membership.local_position, &Point3::new(0.0, 3.0, 0.0)));
        assert_eq!(points.rigid_body(body).unwrap().extent, 3.0);
    }

    #[test]
    fn removing_a_member_shrinks_the_body_extent() {
        let mut points = PointSet::new();
        let body = points.add_rigid_body(Isometry3::identity()).unwrap();
        let near = points.add_rigid_member(body, Point3::new(1.0, 0.0, 0.0), 0.1).unwrap();
        let far = points.add_rigid_member(body, Point3::new(4.0, 0.0, 0.0), 0.1).unwrap();
        assert_eq!(points.rigid_body(body).unwrap().extent, 4.0);

        points.remove(far).unwrap();
        let rigid_body = points.rigid_body(body).unwrap();
        assert_eq!(rigid_body.members, vec![near]);
        assert_eq!(rigid_body.extent, 1.0);
    }

    #[test]
    fn clones_receive_a_fresh_instance_key() {
        let mut points = PointSet::new();
        points.add(Point3::origin(), 1.0).unwrap();
        let copy = points.clone();
        assert_ne!(points.instance_key(), copy.instance_key());
        assert_eq!(points.structure_version(), copy.structure_version());
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn out_of_bounds_updates_are_rejected() {
        let mut points = PointSet::new();
        assert_eq!(
            points.set_position(3, Point3::origin()),
            Err(PointSetError::IndexOutOfBounds { index: 3, len: 0 })
        );
        assert!(points.set_radius(0, 1.0).is_err());
    }
}
