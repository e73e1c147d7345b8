use super::checker::ConsistencyChecker;
use super::config::{ProximityConfig, validate_cutoff};
use super::error::EngineError;
use super::filter::{PairFilter, PairFilterChain};
use super::finder::{ClosePairFinder, PairSink, finder_for};
use super::pair_list::{IndexPair, PairList};
use super::tracker::{MovedObjectTracker, MovedSet};
use crate::core::models::object::Sphere;
use crate::core::models::point_set::PointSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Whether a controller pairs one set with itself or two sets with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    SelfJoin,
    Bipartite,
}

impl Scope {
    fn label(self) -> &'static str {
        match self {
            Scope::SelfJoin => "self-join",
            Scope::Bipartite => "bipartite",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why an update rebuilt the list from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    FirstCall,
    StructureChanged,
    ParametersChanged,
    FiltersRemoved,
    Requested,
    TooManyMoved,
}

/// What a successful update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Rebuilt(RebuildReason),
    Incremental { moved: usize },
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub update_count: u64,
    pub full_rebuild_count: u64,
    pub partial_rebuild_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    FirstCall,
    Stale(RebuildReason),
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SetSignature {
    instance: u64,
    version: u64,
}

impl SetSignature {
    fn of(points: &PointSet) -> Self {
        Self {
            instance: points.instance_key(),
            version: points.structure_version(),
        }
    }
}

/// Maintains the list of object pairs within `distance` across updates.
///
/// The list is exact for `distance + 2 * slack` measured at the tracker's
/// snapshot positions, so it stays a superset of the pairs within `distance`
/// while no object has moved more than `slack` since its snapshot. Each
/// [`update`](Self::update) either keeps the list, patches the pairs of the
/// objects that moved too far, or rebuilds it.
///
/// The controller borrows the point sets only for the duration of an update
/// and never mutates them.
#[derive(Debug)]
pub struct ProximityListController {
    config: ProximityConfig,
    scope: Scope,
    finder: Box<dyn ClosePairFinder>,
    filters: PairFilterChain,
    /// Number of leading filters already applied to `pairs`.
    applied_filters: usize,
    pairs: PairList,
    tracker_a: MovedObjectTracker,
    tracker_b: MovedObjectTracker,
    signatures: Option<(SetSignature, Option<SetSignature>)>,
    state: ListState,
    stats: UpdateStats,
}

impl ProximityListController {
    /// Creates a controller pairing one point set with itself.
    pub fn new(config: ProximityConfig) -> Result<Self, EngineError> {
        Self::with_scope(config, Scope::SelfJoin)
    }

    /// Creates a controller pairing the objects of one set with those of another.
    pub fn bipartite(config: ProximityConfig) -> Result<Self, EngineError> {
        Self::with_scope(config, Scope::Bipartite)
    }

    fn with_scope(config: ProximityConfig, scope: Scope) -> Result<Self, EngineError> {
        config.validate()?;
        if config.slack == 0.0 {
            warn!("Slack is zero; any motion will trigger pair list work.");
        }
        if config.incremental_threshold == 0 {
            warn!("Incremental threshold is zero; every change will rebuild the pair list.");
        }
        Ok(Self {
            finder: finder_for(&config),
            config,
            scope,
            filters: PairFilterChain::new(),
            applied_filters: 0,
            pairs: PairList::new(),
            tracker_a: MovedObjectTracker::new(),
            tracker_b: MovedObjectTracker::new(),
            signatures: None,
            state: ListState::FirstCall,
            stats: UpdateStats::default(),
        })
    }

    pub fn with_filters(mut self, filters: PairFilterChain) -> Self {
        self.filters = filters;
        self.applied_filters = 0;
        if self.state == ListState::Current {
            self.state = ListState::Stale(RebuildReason::FiltersRemoved);
        }
        self
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn stats(&self) -> UpdateStats {
        self.stats
    }

    pub fn filters(&self) -> &PairFilterChain {
        &self.filters
    }

    /// The current list. Valid until the next update.
    pub fn pairs(&self) -> &PairList {
        &self.pairs
    }

    /// Adds a filter. It is applied to the existing list on the next update.
    pub fn add_filter(&mut self, filter: Arc<dyn PairFilter>) {
        self.filters.push(filter);
    }

    /// Removes filters by name. Pairs they excluded may now qualify, so the
    /// next update rebuilds.
    pub fn remove_filter(&mut self, name: &str) -> usize {
        let removed = self.filters.remove(name);
        if removed > 0 {
            self.applied_filters = self.applied_filters.min(self.filters.len());
            self.mark_stale(RebuildReason::FiltersRemoved);
        }
        removed
    }

    pub fn set_distance(&mut self, distance: f64) -> Result<(), EngineError> {
        validate_cutoff("distance", distance)?;
        self.config.distance = distance;
        self.invalidate_snapshots();
        Ok(())
    }

    pub fn set_slack(&mut self, slack: f64) -> Result<(), EngineError> {
        validate_cutoff("slack", slack)?;
        self.config.slack = slack;
        self.invalidate_snapshots();
        Ok(())
    }

    /// Forces the next update to rebuild, e.g. after the inputs of a filter changed.
    pub fn invalidate(&mut self) {
        self.mark_stale(RebuildReason::Requested);
    }

    /// Brings the list up to date with the current positions of `points`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ScopeMismatch`] on a bipartite controller and
    /// [`EngineError::ResourceExhausted`] if the candidate pairs do not fit.
    /// On error the list and snapshots are left as they were.
    #[instrument(skip_all, name = "proximity_update", fields(objects = points.len()))]
    pub fn update(&mut self, points: &PointSet) -> Result<UpdateOutcome, EngineError> {
        self.expect_scope(Scope::SelfJoin)?;
        self.run_update(points, None)
    }

    /// Brings a bipartite list up to date with the current positions of `a` and `b`.
    #[instrument(skip_all, name = "proximity_update_bipartite", fields(objects_a = a.len(), objects_b = b.len()))]
    pub fn update_bipartite(
        &mut self,
        a: &PointSet,
        b: &PointSet,
    ) -> Result<UpdateOutcome, EngineError> {
        self.expect_scope(Scope::Bipartite)?;
        self.run_update(a, Some(b))
    }

    fn expect_scope(&self, actual: Scope) -> Result<(), EngineError> {
        if self.scope == actual {
            Ok(())
        } else {
            Err(EngineError::ScopeMismatch {
                expected: self.scope.label(),
                actual: actual.label(),
            })
        }
    }

    fn mark_stale(&mut self, reason: RebuildReason) {
        if self.state != ListState::FirstCall {
            self.state = ListState::Stale(reason);
        }
    }

    fn invalidate_snapshots(&mut self) {
        self.tracker_a.clear();
        self.tracker_b.clear();
        self.mark_stale(RebuildReason::ParametersChanged);
    }

    fn run_update(&mut self, a: &PointSet, b: Option<&PointSet>) -> Result<UpdateOutcome, EngineError> {
        let signatures = (SetSignature::of(a), b.map(SetSignature::of));
        let forced = match self.state {
            ListState::FirstCall => Some(RebuildReason::FirstCall),
            ListState::Stale(reason) => Some(reason),
            ListState::Current if self.signatures != Some(signatures) => {
                Some(RebuildReason::StructureChanged)
            }
            ListState::Current => None,
        };

        let outcome = match forced {
            Some(reason) => self.rebuild(a, b, reason)?,
            None => {
                let slack = self.config.slack;
                let moved_a = self.tracker_a.get_moved(a, slack);
                let moved_b = match b {
                    Some(b) => self.tracker_b.get_moved(b, slack),
                    None => MovedSet::default(),
                };
                let moved = moved_a.len() + moved_b.len();

                if moved == 0 {
                    self.apply_new_filters(a, b);
                    trace!(pairs = self.pairs.len(), "No object moved beyond the slack.");
                    UpdateOutcome::Unchanged
                } else if moved < self.config.incremental_threshold {
                    self.incremental(a, b, &moved_a, &moved_b)?
                } else {
                    self.rebuild(a, b, RebuildReason::TooManyMoved)?
                }
            }
        };

        self.signatures = Some(signatures);
        self.state = ListState::Current;
        self.stats.update_count += 1;
        match outcome {
            UpdateOutcome::Rebuilt(_) => self.stats.full_rebuild_count += 1,
            UpdateOutcome::Incremental { .. } => self.stats.partial_rebuild_count += 1,
            UpdateOutcome::Unchanged => {}
        }

        if self.config.verify {
            self.verify(a, b);
        }
        Ok(outcome)
    }

    fn rebuild(
        &mut self,
        a: &PointSet,
        b: Option<&PointSet>,
        reason: RebuildReason,
    ) -> Result<UpdateOutcome, EngineError> {
        let envelope = self.config.envelope();
        let spheres_a = a.spheres();
        let mut sink = PairSink::new(self.config.max_pairs);
        match b {
            None => self.finder.self_pairs(&spheres_a, envelope, &mut sink),
            Some(b) => self
                .finder
                .cross_pairs(&spheres_a, &b.spheres(), envelope, &mut sink),
        }
        let candidates = sink.finish()?;
        let candidate_count = candidates.len();

        let (objects_a, objects_b) = (a.objects(), b.unwrap_or(a).objects());
        let kept: Vec<IndexPair> = candidates
            .into_iter()
            .filter(|&(i, j)| !self.filters.excludes(&objects_a[i], &objects_b[j]))
            .collect();
        let pairs = PairList::from_unsorted(kept);
        self.check_limit(pairs.len())?;

        self.pairs = pairs;
        self.applied_filters = self.filters.len();
        self.tracker_a.reset(a);
        if let Some(b) = b {
            self.tracker_b.reset(b);
        }

        info!(
            ?reason,
            finder = self.finder.name(),
            candidates = candidate_count,
            pairs = self.pairs.len(),
            envelope,
            "Rebuilt proximity list."
        );
        Ok(UpdateOutcome::Rebuilt(reason))
    }

    fn incremental(
        &mut self,
        a: &PointSet,
        b: Option<&PointSet>,
        moved_a: &MovedSet,
        moved_b: &MovedSet,
    ) -> Result<UpdateOutcome, EngineError> {
        let envelope = self.config.envelope();
        let spheres_a = effective_spheres(a, &self.tracker_a, moved_a)?;
        let mut sink = PairSink::new(self.config.max_pairs);
        match b {
            None => {
                self.finder
                    .self_pairs_touching(&spheres_a, &moved_a.indices, envelope, &mut sink);
            }
            Some(b) => {
                let spheres_b = effective_spheres(b, &self.tracker_b, moved_b)?;
                self.finder.cross_pairs_touching(
                    &spheres_a,
                    &spheres_b,
                    &moved_a.indices,
                    &moved_b.indices,
                    envelope,
                    &mut sink,
                );
            }
        }
        let fresh = sink.finish()?;

        let mask_a = moved_mask(a.len(), moved_a);
        let mask_b = match b {
            Some(b) => moved_mask(b.len(), moved_b),
            None => mask_a.clone(),
        };
        let (objects_a, objects_b) = (a.objects(), b.unwrap_or(a).objects());

        let mut merged: Vec<IndexPair> = Vec::new();
        let needed = self.pairs.len() + fresh.len();
        merged
            .try_reserve(needed)
            .map_err(|_| EngineError::exhausted(needed))?;
        merged.extend(self.pairs.iter().copied().filter(|&(i, j)| {
            !mask_a[i]
                && !mask_b[j]
                && !self
                    .filters
                    .excludes_from(self.applied_filters, &objects_a[i], &objects_b[j])
        }));
        let retained = merged.len();
        merged.extend(
            fresh
                .into_iter()
                .filter(|&(i, j)| !self.filters.excludes(&objects_a[i], &objects_b[j])),
        );
        let pairs = PairList::from_unsorted(merged);
        self.check_limit(pairs.len())?;

        let moved = moved_a.len() + moved_b.len();
        debug!(
            moved,
            retained,
            pairs = pairs.len(),
            "Patched proximity list for moved objects."
        );

        self.pairs = pairs;
        self.applied_filters = self.filters.len();
        self.tracker_a.reset_moved(a, moved_a);
        if let Some(b) = b {
            self.tracker_b.reset_moved(b, moved_b);
        }
        Ok(UpdateOutcome::Incremental { moved })
    }

    /// Applies filters added since the list was last built.
    fn apply_new_filters(&mut self, a: &PointSet, b: Option<&PointSet>) {
        if self.applied_filters >= self.filters.len() {
            return;
        }
        let (objects_a, objects_b) = (a.objects(), b.unwrap_or(a).objects());
        let start = self.applied_filters;
        let before = self.pairs.len();
        let kept: Vec<IndexPair> = self
            .pairs
            .iter()
            .copied()
            .filter(|&(i, j)| !self.filters.excludes_from(start, &objects_a[i], &objects_b[j]))
            .collect();
        self.pairs = PairList::from_unsorted(kept);
        self.applied_filters = self.filters.len();
        debug!(
            removed = before - self.pairs.len(),
            "Applied newly added filters."
        );
    }

    fn check_limit(&self, len: usize) -> Result<(), EngineError> {
        match self.config.max_pairs {
            Some(limit) if len > limit => Err(EngineError::exhausted(len)),
            _ => Ok(()),
        }
    }

    fn verify(&self, a: &PointSet, b: Option<&PointSet>) {
        let checker = ConsistencyChecker::new(self.config.mode, self.config.distance, self.config.slack)
            .with_periodic_box(self.config.periodic_box);
        let result = match b {
            None => checker.check_self(
                a,
                &self.pairs,
                &self.filters,
                self.tracker_a.max_displacement(a),
            ),
            Some(b) => checker.check_bipartite(
                a,
                b,
                &self.pairs,
                &self.filters,
                self.tracker_a.max_displacement(a) + self.tracker_b.max_displacement(b),
            ),
        };
        if let Err(violation) = result {
            panic!("proximity list invariant violated: {violation}");
        }
    }
}

/// Spheres at snapshot positions, except for moved objects which are placed at
/// their current positions. These are the positions the list is exact for
/// after an incremental update.
fn effective_spheres(
    points: &PointSet,
    tracker: &MovedObjectTracker,
    moved: &MovedSet,
) -> Result<Vec<Sphere>, EngineError> {
    let snapshot = tracker
        .snapshot_positions()
        .filter(|positions| positions.len() == points.len())
        .ok_or_else(|| EngineError::Internal("incremental update without a valid snapshot".into()))?;
    let objects = points.objects();
    let mut spheres: Vec<Sphere> = objects
        .iter()
        .zip(snapshot)
        .map(|(object, &center)| Sphere {
            center,
            ..object.sphere()
        })
        .collect();
    for &index in &moved.indices {
        spheres[index].center = objects[index].position;
    }
    Ok(spheres)
}

fn moved_mask(len: usize, moved: &MovedSet) -> Vec<bool> {
    let mut mask = vec![false; len];
    for &index in &moved.indices {
        mask[index] = true;
    }
    mask
}
