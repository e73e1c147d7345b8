use super::periodic::PeriodicBox;
use crate::core::models::object::Sphere;
use nalgebra::{Point3, Vector3};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    /// Creates a box from two opposite corners in any order.
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    pub fn from_sphere(sphere: &Sphere) -> Self {
        let half = Vector3::repeat(sphere.radius);
        Self {
            min: sphere.center - half,
            max: sphere.center + half,
        }
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn half_diagonal(&self) -> f64 {
        (self.max - self.min).norm() * 0.5
    }

    /// Smallest sphere around the box's center that contains the whole box.
    pub fn enclosing_sphere(&self) -> Sphere {
        Sphere::new(self.center(), self.half_diagonal())
    }

    /// Per-axis gap between the boxes; zero along axes where they overlap.
    fn gap(&self, other: &BoundingBox) -> Vector3<f64> {
        Vector3::from_fn(|axis, _| {
            (other.min[axis] - self.max[axis])
                .max(self.min[axis] - other.max[axis])
                .max(0.0)
        })
    }

    /// Euclidean distance between the closest points of the two boxes.
    pub fn distance(&self, other: &BoundingBox) -> f64 {
        self.gap(other).norm()
    }

    pub fn within(&self, other: &BoundingBox, threshold: f64) -> bool {
        threshold >= 0.0 && self.gap(other).norm_squared() <= threshold * threshold
    }

    /// Like [`within`](Self::within), with `other` translated to its nearest
    /// periodic image relative to `self`.
    pub fn within_periodic(&self, other: &BoundingBox, threshold: f64, cell: &PeriodicBox) -> bool {
        let shift = cell.minimum_image(&(other.center() - self.center())) - (other.center() - self.center());
        let moved = BoundingBox {
            min: other.min + shift,
            max: other.max + shift,
        };
        self.within(&moved, threshold)
    }
}
