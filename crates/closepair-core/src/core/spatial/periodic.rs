use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum PeriodicBoxError {
    #[error("Periodic box length along axis {axis} must be finite and positive, got {value}")]
    InvalidLength { axis: usize, value: f64 },
}

/// An axis-aligned box with periodic boundaries, spanning `[0, L)` per axis.
///
/// Separations are measured between nearest images. Positions outside the box
/// are accepted; they are wrapped before being placed in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "[f64; 3]")]
pub struct PeriodicBox {
    lengths: Vector3<f64>,
}

impl PeriodicBox {
    pub fn new(lengths: Vector3<f64>) -> Result<Self, PeriodicBoxError> {
        for (axis, &value) in lengths.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(PeriodicBoxError::InvalidLength { axis, value });
            }
        }
        Ok(Self { lengths })
    }

    pub fn cubic(length: f64) -> Result<Self, PeriodicBoxError> {
        Self::new(Vector3::repeat(length))
    }

    pub fn lengths(&self) -> &Vector3<f64> {
        &self.lengths
    }

    /// Maps `position` into the primary cell `[0, L)`.
    pub fn wrap(&self, position: &Point3<f64>) -> Point3<f64> {
        Point3::from(Vector3::from_fn(|axis, _| {
            let length = self.lengths[axis];
            let wrapped = position[axis].rem_euclid(length);
            // rem_euclid may round up to `length` for tiny negative inputs.
            if wrapped >= length { 0.0 } else { wrapped }
        }))
    }

    /// The shortest displacement equivalent to `delta` under the periodic boundaries.
    #[inline]
    pub fn minimum_image(&self, delta: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|axis, _| {
            let length = self.lengths[axis];
            delta[axis] - length * (delta[axis] / length).round()
        })
    }

    /// Calls `visit` with `wrapped` and with each periodic image of it that may
    /// lie within `reach` of a point inside the primary cell.
    ///
    /// `wrapped` must already be inside the primary cell. An image is shifted
    /// by `+L` along an axis when the point is within `reach` of the lower face
    /// and by `-L` when it is within `reach` of the upper face.
    pub fn for_each_image<F>(&self, wrapped: &Point3<f64>, reach: f64, mut visit: F)
    where
        F: FnMut(Point3<f64>),
    {
        let axis_shifts = |axis: usize| -> ([f64; 3], usize) {
            let length = self.lengths[axis];
            let mut shifts = [0.0; 3];
            let mut count = 1;
            if wrapped[axis] <= reach {
                shifts[count] = length;
                count += 1;
            }
            if wrapped[axis] >= length - reach {
                shifts[count] = -length;
                count += 1;
            }
            (shifts, count)
        };
        let (sx, nx) = axis_shifts(0);
        let (sy, ny) = axis_shifts(1);
        let (sz, nz) = axis_shifts(2);
        for &dx in &sx[..nx] {
            for &dy in &sy[..ny] {
                for &dz in &sz[..nz] {
                    visit(wrapped + Vector3::new(dx, dy, dz));
                }
            }
        }
    }
}

impl TryFrom<[f64; 3]> for PeriodicBox {
    type Error = PeriodicBoxError;

    fn try_from(lengths: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(Vector3::from(lengths))
    }
}
