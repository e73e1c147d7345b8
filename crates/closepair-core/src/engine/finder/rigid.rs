use super::{ClosePairFinder, GridFinder, PairSink};
use crate::core::models::ids::RigidBodyId;
use crate::core::models::object::Sphere;
use crate::core::spatial::distance::DistanceMode;
use crate::core::spatial::partition::PartitionConfig;
use crate::engine::pair_list::{IndexPair, canonical};
use itertools::Itertools;
use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

/// Relative growth of body bounding radii, covering rounding in the centroid.
const BOUND_PADDING: f64 = 1e-9;

/// Objects grouped by rigid body. Free objects form singleton groups.
#[derive(Debug, Default)]
struct Grouping {
    /// One bounding sphere per group, radii already in effective form.
    bounds: Vec<Sphere>,
    members: Vec<Vec<usize>>,
    /// Group of each object.
    owner: Vec<usize>,
}

impl Grouping {
    fn touched_by(&self, subset: &[usize]) -> Vec<usize> {
        subset.iter().map(|&i| self.owner[i]).sorted_unstable().dedup().collect()
    }
}

/// Body-first pair search.
///
/// Each rigid body is summarised by a sphere bounding all of its members.
/// Bounding spheres are paired with a grid search, and only the members of
/// nearby groups are tested against each other. A member is skipped early
/// when it is out of reach of the other group's bounding sphere. Pairs inside
/// one body are always reported; filter them with a same-body filter if they
/// are not wanted.
#[derive(Debug, Clone, Copy)]
pub struct RigidFinder {
    bounds_finder: GridFinder,
    mode: DistanceMode,
}

impl RigidFinder {
    pub fn new(config: PartitionConfig, mode: DistanceMode) -> Self {
        Self {
            // Bounding radii already include the member radii the mode counts.
            bounds_finder: GridFinder::new(config, DistanceMode::SphereSurface),
            mode,
        }
    }

    fn group(&self, spheres: &[Sphere]) -> Grouping {
        let mut by_body: FxHashMap<RigidBodyId, usize> = FxHashMap::default();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut owner = Vec::with_capacity(spheres.len());

        for (i, sphere) in spheres.iter().enumerate() {
            let group = match sphere.body {
                Some(body) => *by_body.entry(body).or_insert_with(|| {
                    members.push(Vec::new());
                    members.len() - 1
                }),
                None => {
                    members.push(Vec::new());
                    members.len() - 1
                }
            };
            members[group].push(i);
            owner.push(group);
        }

        let bounds = members
            .iter()
            .map(|group| self.bounding_sphere(spheres, group))
            .collect();
        Grouping {
            bounds,
            members,
            owner,
        }
    }

    fn bounding_sphere(&self, spheres: &[Sphere], group: &[usize]) -> Sphere {
        if let [single] = group {
            let sphere = &spheres[*single];
            return Sphere::new(sphere.center, self.mode.effective_radius(sphere.radius));
        }
        let sum = group
            .iter()
            .fold(Vector3::zeros(), |acc, &i| acc + spheres[i].center.coords);
        let center = Point3::from(sum / group.len() as f64);
        let radius = group
            .iter()
            .map(|&i| (spheres[i].center - center).norm() + self.mode.effective_radius(spheres[i].radius))
            .fold(0.0, f64::max);
        Sphere::new(center, radius * (1.0 + BOUND_PADDING))
    }

    /// Tests members of group `pa` against members of group `pb`.
    fn expand<F>(
        &self,
        a: &[Sphere],
        b: &[Sphere],
        pa: &[usize],
        pb: &[usize],
        bound_b: &Sphere,
        threshold: f64,
        mut emit: F,
    ) where
        F: FnMut(usize, usize),
    {
        for &i in pa {
            let query = &a[i];
            if pb.len() > 1 {
                let reach = Sphere::new(query.center, self.mode.effective_radius(query.radius));
                if !DistanceMode::SphereSurface.within(&reach, bound_b, threshold) {
                    continue;
                }
            }
            for &j in pb {
                if self.mode.within(query, &b[j], threshold) {
                    emit(i, j);
                }
            }
        }
    }

    /// Pairs of members within one group.
    fn intra_pairs<F>(&self, spheres: &[Sphere], group: &[usize], threshold: f64, mut emit: F)
    where
        F: FnMut(usize, usize),
    {
        for (&i, &j) in group.iter().tuple_combinations() {
            if self.mode.within(&spheres[i], &spheres[j], threshold) {
                emit(i, j);
            }
        }
    }

    /// Runs `search` for group pairs and unwraps the result into `sink`.
    fn group_pairs<S>(sink: &mut PairSink, search: S) -> Option<Vec<IndexPair>>
    where
        S: FnOnce(&mut PairSink),
    {
        let mut group_sink = PairSink::new(None);
        search(&mut group_sink);
        match group_sink.finish() {
            Ok(pairs) => Some(pairs),
            Err(error) => {
                sink.fail(error);
                None
            }
        }
    }
}

impl ClosePairFinder for RigidFinder {
    fn name(&self) -> &'static str {
        "rigid"
    }

    fn mode(&self) -> DistanceMode {
        self.mode
    }

    fn self_pairs(&self, spheres: &[Sphere], threshold: f64, sink: &mut PairSink) {
        let grouping = self.group(spheres);
        for group in &grouping.members {
            if sink.is_exhausted() {
                return;
            }
            self.intra_pairs(spheres, group, threshold, |i, j| sink.push(canonical(i, j)));
        }

        let Some(group_pairs) = Self::group_pairs(sink, |group_sink| {
            self.bounds_finder
                .self_pairs(&grouping.bounds, threshold, group_sink)
        }) else {
            return;
        };
        for (p, q) in group_pairs {
            if sink.is_exhausted() {
                return;
            }
            self.expand(
                spheres,
                spheres,
                &grouping.members[p],
                &grouping.members[q],
                &grouping.bounds[q],
                threshold,
                |i, j| sink.push(canonical(i, j)),
            );
        }
    }

    fn cross_pairs(&self, a: &[Sphere], b: &[Sphere], threshold: f64, sink: &mut PairSink) {
        let (grouping_a, grouping_b) = (self.group(a), self.group(b));
        let Some(group_pairs) = Self::group_pairs(sink, |group_sink| {
            self.bounds_finder
                .cross_pairs(&grouping_a.bounds, &grouping_b.bounds, threshold, group_sink)
        }) else {
            return;
        };
        for (p, q) in group_pairs {
            if sink.is_exhausted() {
                return;
            }
            self.expand(
                a,
                b,
                &grouping_a.members[p],
                &grouping_b.members[q],
                &grouping_b.bounds[q],
                threshold,
                |i, j| sink.push((i, j)),
            );
        }
    }

    fn self_pairs_touching(
        &self,
        spheres: &[Sphere],
        subset: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    ) {
        if subset.is_empty() {
            return;
        }
        let grouping = self.group(spheres);
        let mut in_subset = vec![false; spheres.len()];
        for &i in subset {
            in_subset[i] = true;
        }
        let touched = grouping.touched_by(subset);

        for &group in &touched {
            self.intra_pairs(spheres, &grouping.members[group], threshold, |i, j| {
                if in_subset[i] || in_subset[j] {
                    sink.push(canonical(i, j));
                }
            });
        }

        let Some(group_pairs) = Self::group_pairs(sink, |group_sink| {
            self.bounds_finder
                .self_pairs_touching(&grouping.bounds, &touched, threshold, group_sink)
        }) else {
            return;
        };
        for (p, q) in group_pairs {
            if sink.is_exhausted() {
                return;
            }
            self.expand(
                spheres,
                spheres,
                &grouping.members[p],
                &grouping.members[q],
                &grouping.bounds[q],
                threshold,
                |i, j| {
                    if in_subset[i] || in_subset[j] {
                        sink.push(canonical(i, j));
                    }
                },
            );
        }
    }

    fn cross_pairs_touching(
        &self,
        a: &[Sphere],
        b: &[Sphere],
        subset_a: &[usize],
        subset_b: &[usize],
        threshold: f64,
        sink: &mut PairSink,
    ) {
        if subset_a.is_empty() && subset_b.is_empty() {
            return;
        }
        let (grouping_a, grouping_b) = (self.group(a), self.group(b));
        let mut in_a = vec![false; a.len()];
        for &i in subset_a {
            in_a[i] = true;
        }
        let mut in_b = vec![false; b.len()];
        for &j in subset_b {
            in_b[j] = true;
        }
        let (touched_a, touched_b) = (grouping_a.touched_by(subset_a), grouping_b.touched_by(subset_b));

        let Some(group_pairs) = Self::group_pairs(sink, |group_sink| {
            self.bounds_finder.cross_pairs_touching(
                &grouping_a.bounds,
                &grouping_b.bounds,
                &touched_a,
                &touched_b,
                threshold,
                group_sink,
            )
        }) else {
            return;
        };
        for (p, q) in group_pairs {
            if sink.is_exhausted() {
                return;
            }
            self.expand(
                a,
                b,
                &grouping_a.members[p],
                &grouping_b.members[q],
                &grouping_b.bounds[q],
                threshold,
                |i, j| {
                    if in_a[i] || in_b[j] {
                        sink.push((i, j));
                    }
                },
            );
        }
    }
}
