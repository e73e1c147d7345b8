use super::periodic::PeriodicBox;
use crate::core::models::object::Sphere;
use serde::Deserialize;

/// How the separation between two objects is measured.
///
/// A controller fixes one mode for its lifetime; every finder and the
/// consistency checker evaluate pairs through [`DistanceMode::within`] so that
/// all strategies agree on boundary cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMode {
    /// Gap between sphere surfaces: `|ci - cj| - ri - rj`.
    #[default]
    SphereSurface,
    /// Center-to-center distance; radii are ignored.
    Center,
}

impl DistanceMode {
    /// The radius that contributes to separation under this mode.
    #[inline]
    pub fn effective_radius(self, radius: f64) -> f64 {
        match self {
            DistanceMode::SphereSurface => radius,
            DistanceMode::Center => 0.0,
        }
    }

    /// Signed separation of two spheres. Overlapping spheres give negative values.
    pub fn distance(self, a: &Sphere, b: &Sphere) -> f64 {
        let centers = (a.center - b.center).norm();
        centers - self.effective_radius(a.radius) - self.effective_radius(b.radius)
    }

    /// Returns true if the separation of `a` and `b` is at most `threshold`.
    ///
    /// Evaluated on squared center distances so that no square root is taken.
    #[inline]
    pub fn within(self, a: &Sphere, b: &Sphere, threshold: f64) -> bool {
        let reach = threshold + self.effective_radius(a.radius) + self.effective_radius(b.radius);
        reach >= 0.0 && (a.center - b.center).norm_squared() <= reach * reach
    }

    /// Like [`within`](Self::within), measured between nearest periodic images.
    #[inline]
    pub fn within_periodic(self, a: &Sphere, b: &Sphere, threshold: f64, cell: &PeriodicBox) -> bool {
        let reach = threshold + self.effective_radius(a.radius) + self.effective_radius(b.radius);
        reach >= 0.0 && cell.minimum_image(&(a.center - b.center)).norm_squared() <= reach * reach
    }

    pub fn distance_periodic(self, a: &Sphere, b: &Sphere, cell: &PeriodicBox) -> f64 {
        let centers = cell.minimum_image(&(a.center - b.center)).norm();
        centers - self.effective_radius(a.radius) - self.effective_radius(b.radius)
    }

    /// Dispatches to the periodic or the open-space predicate.
    #[inline]
    pub fn within_in(
        self,
        a: &Sphere,
        b: &Sphere,
        threshold: f64,
        periodic: Option<&PeriodicBox>,
    ) -> bool {
        match periodic {
            Some(cell) => self.within_periodic(a, b, threshold, cell),
            None => self.within(a, b, threshold),
        }
    }
}
