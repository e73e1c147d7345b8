//! End-to-end behaviour of the proximity list controller.

use closepair::core::models::object::TrackedObject;
use closepair::core::models::point_set::PointSet;
use closepair::core::spatial::distance::DistanceMode;
use closepair::core::spatial::periodic::PeriodicBox;
use closepair::engine::checker::check_filter_symmetry;
use closepair::engine::config::{FinderStrategy, ProximityConfig, ProximityConfigBuilder};
use closepair::engine::controller::{ProximityListController, RebuildReason, UpdateOutcome};
use closepair::engine::filter::{
    BondedPairFilter, FnPairFilter, PairFilterChain, SameRigidBodyFilter,
};
use closepair::engine::finder::{ClosePairFinder, PairSink, QuadraticFinder};
use closepair::engine::pair_list::{IndexPair, PairList};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::Arc;

const DISTANCE: f64 = 4.0;
const SLACK: f64 = 1.0;
const ENVELOPE: f64 = DISTANCE + 2.0 * SLACK;

fn builder() -> ProximityConfigBuilder {
    ProximityConfigBuilder::new()
        .distance(DISTANCE)
        .slack(SLACK)
        .verify(true)
}

fn config() -> ProximityConfig {
    builder().build().unwrap()
}

/// Objects on integer coordinates so that displacements are exact.
fn integer_box(count: usize, extent: i32, radius: f64, seed: u64) -> PointSet {
    let mut points = PointSet::new();
    fill_box(&mut points, count, extent, Vector3::zeros(), radius, seed);
    points
}

fn fill_box(
    points: &mut PointSet,
    count: usize,
    extent: i32,
    offset: Vector3<f64>,
    radius: f64,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..count {
        let position = Point3::new(
            rng.gen_range(0..extent) as f64,
            rng.gen_range(0..extent) as f64,
            rng.gen_range(0..extent) as f64,
        );
        points.add(position + offset, radius).unwrap();
    }
}

fn brute_force(points: &PointSet, threshold: f64) -> PairList {
    let mut sink = PairSink::new(None);
    QuadraticFinder::new(DistanceMode::SphereSurface).self_pairs(
        &points.spheres(),
        threshold,
        &mut sink,
    );
    PairList::from_unsorted(sink.finish().unwrap())
}

fn brute_force_cross(a: &PointSet, b: &PointSet, threshold: f64) -> PairList {
    let mut sink = PairSink::new(None);
    QuadraticFinder::new(DistanceMode::SphereSurface).cross_pairs(
        &a.spheres(),
        &b.spheres(),
        threshold,
        &mut sink,
    );
    PairList::from_unsorted(sink.finish().unwrap())
}

fn without(list: &PairList, excluded: &[IndexPair]) -> PairList {
    PairList::from_unsorted(
        list.iter()
            .copied()
            .filter(|pair| !excluded.contains(pair))
            .collect(),
    )
}

fn fresh_list(points: &PointSet, config: &ProximityConfig, filters: &PairFilterChain) -> PairList {
    let mut controller = ProximityListController::new(config.clone())
        .unwrap()
        .with_filters(filters.clone());
    controller.update(points).unwrap();
    controller.pairs().clone()
}

fn symmetric_difference(a: &PairList, b: &PairList) -> BTreeSet<IndexPair> {
    let a: BTreeSet<IndexPair> = a.iter().copied().collect();
    let b: BTreeSet<IndexPair> = b.iter().copied().collect();
    a.symmetric_difference(&b).copied().collect()
}

fn random_direction(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm = v.norm();
        if norm > 0.1 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn pick_distinct(rng: &mut StdRng, len: usize, count: usize) -> Vec<usize> {
    let mut picked = BTreeSet::new();
    while picked.len() < count {
        picked.insert(rng.gen_range(0..len));
    }
    picked.into_iter().collect()
}

#[test]
fn first_update_rebuilds_and_matches_brute_force() {
    let points = integer_box(100, 100, 1.0, 1);
    let mut controller = ProximityListController::new(config()).unwrap();

    assert_eq!(
        controller.update(&points).unwrap(),
        UpdateOutcome::Rebuilt(RebuildReason::FirstCall)
    );
    assert_eq!(controller.pairs(), &brute_force(&points, ENVELOPE));

    let spheres = points.spheres();
    let within_cutoff: Vec<IndexPair> = controller
        .pairs()
        .iter()
        .copied()
        .filter(|&(i, j)| DistanceMode::SphereSurface.within(&spheres[i], &spheres[j], DISTANCE))
        .collect();
    assert_eq!(
        within_cutoff.as_slice(),
        brute_force(&points, DISTANCE).as_slice()
    );
}

#[test]
fn second_update_without_motion_is_idempotent() {
    let points = integer_box(200, 40, 1.0, 2);
    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();
    let before = controller.pairs().clone();

    assert_eq!(controller.update(&points).unwrap(), UpdateOutcome::Unchanged);
    assert_eq!(controller.update(&points).unwrap(), UpdateOutcome::Unchanged);
    assert_eq!(controller.pairs(), &before);

    let stats = controller.stats();
    assert_eq!(stats.update_count, 3);
    assert_eq!(stats.full_rebuild_count, 1);
    assert_eq!(stats.partial_rebuild_count, 0);
}

#[test]
fn moving_exactly_the_slack_keeps_the_list() {
    let mut points = integer_box(100, 100, 1.0, 1);
    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();
    let before = controller.pairs().clone();

    points.translate(0, &Vector3::new(SLACK, 0.0, 0.0)).unwrap();

    assert_eq!(controller.update(&points).unwrap(), UpdateOutcome::Unchanged);
    assert_eq!(controller.pairs(), &before);
}

#[test]
fn moving_just_beyond_the_slack_patches_only_that_object() {
    let mut points = integer_box(150, 30, 1.0, 3);
    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();
    let before = controller.pairs().clone();

    points
        .translate(0, &Vector3::new(SLACK + 1e-3, 0.0, 0.0))
        .unwrap();

    assert_eq!(
        controller.update(&points).unwrap(),
        UpdateOutcome::Incremental { moved: 1 }
    );
    assert_eq!(controller.pairs(), &brute_force(&points, ENVELOPE));
    for (i, j) in symmetric_difference(&before, controller.pairs()) {
        assert!(i == 0 || j == 0, "pair ({i}, {j}) changed without moving");
    }
    assert_eq!(controller.stats().partial_rebuild_count, 1);
}

#[test]
fn moving_most_objects_triggers_a_full_rebuild() {
    let mut points = integer_box(2000, 200, 1.0, 4);
    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();

    for index in 0..1500 {
        points
            .translate(index, &Vector3::new(0.0, 3.0, 0.0))
            .unwrap();
    }

    assert_eq!(
        controller.update(&points).unwrap(),
        UpdateOutcome::Rebuilt(RebuildReason::TooManyMoved)
    );
    assert_eq!(controller.pairs(), &brute_force(&points, ENVELOPE));
    assert_eq!(controller.stats().full_rebuild_count, 2);
}

#[test]
fn distant_clusters_never_pair_across() {
    let mut points = PointSet::new();
    fill_box(&mut points, 50, 5, Vector3::zeros(), 0.5, 5);
    fill_box(&mut points, 50, 5, Vector3::new(10.0 * DISTANCE, 0.0, 0.0), 0.5, 6);

    let mut controller = ProximityListController::new(config()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5 {
        controller.update(&points).unwrap();
        assert!(!controller.pairs().is_empty());
        assert!(controller.pairs().iter().all(|&(i, j)| (i < 50) == (j < 50)));

        for index in pick_distinct(&mut rng, points.len(), 10) {
            let delta = random_direction(&mut rng) * 1.5;
            points.translate(index, &delta).unwrap();
        }
    }
}

#[test]
fn bonded_pairs_never_appear() {
    let mut points = integer_box(100, 20, 1.0, 8);
    let (i, j) = brute_force(&points, DISTANCE).as_slice()[0];
    let bonded = BondedPairFilter::from_pairs([(
        points.get(j).unwrap().id,
        points.get(i).unwrap().id,
    )]);

    let mut filters = PairFilterChain::new();
    filters.push(Arc::new(bonded));
    let mut controller = ProximityListController::new(config())
        .unwrap()
        .with_filters(filters);

    controller.update(&points).unwrap();
    assert!(!controller.pairs().contains(&(i, j)));
    assert_eq!(
        controller.pairs(),
        &without(&brute_force(&points, ENVELOPE), &[(i, j)])
    );

    // Patch the list around one end of the excluded pair.
    points.translate(j, &Vector3::new(0.0, 2.0, 0.0)).unwrap();
    assert_eq!(
        controller.update(&points).unwrap(),
        UpdateOutcome::Incremental { moved: 1 }
    );
    assert!(!controller.pairs().contains(&(i, j)));
}

#[test]
fn filters_added_later_apply_without_a_rebuild() {
    let points = integer_box(100, 20, 1.0, 9);
    let (i, j) = brute_force(&points, DISTANCE).as_slice()[0];
    let (id_i, id_j) = (points.get(i).unwrap().id, points.get(j).unwrap().id);

    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();
    assert!(controller.pairs().contains(&(i, j)));

    controller.add_filter(Arc::new(BondedPairFilter::from_pairs([(id_i, id_j)])));
    assert_eq!(controller.update(&points).unwrap(), UpdateOutcome::Unchanged);
    assert!(!controller.pairs().contains(&(i, j)));
    assert_eq!(controller.stats().full_rebuild_count, 1);

    assert_eq!(controller.remove_filter("bonded"), 1);
    assert_eq!(
        controller.update(&points).unwrap(),
        UpdateOutcome::Rebuilt(RebuildReason::FiltersRemoved)
    );
    assert!(controller.pairs().contains(&(i, j)));
}

#[test]
fn list_contains_every_close_pair_under_small_random_motion() {
    let mut points = integer_box(300, 25, 0.5, 10);
    let mut controller = ProximityListController::new(config()).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..30 {
        controller.update(&points).unwrap();
        for pair in &brute_force(&points, DISTANCE) {
            assert!(controller.pairs().contains(pair), "missing {pair:?}");
        }

        for index in 0..points.len() {
            let delta = random_direction(&mut rng) * rng.gen_range(0.0..0.3);
            points.translate(index, &delta).unwrap();
        }
    }

    let stats = controller.stats();
    assert_eq!(stats.update_count, 30);
    assert!(stats.partial_rebuild_count + stats.full_rebuild_count > 1);
}

#[test]
fn incremental_updates_match_a_fresh_rebuild() {
    for threshold in [1, 5, 1000] {
        for min_grid_size in [1, 20, 500] {
            let config = builder()
                .incremental_threshold(threshold)
                .min_grid_size(min_grid_size)
                .build()
                .unwrap();
            let mut points = PointSet::new();
            let mut rng = StdRng::seed_from_u64(12);
            for _ in 0..250 {
                let position = Point3::new(
                    rng.gen_range(0.0..30.0),
                    rng.gen_range(0.0..30.0),
                    rng.gen_range(0.0..30.0),
                );
                points.add(position, rng.gen_range(0.1..2.5)).unwrap();
            }

            let mut controller = ProximityListController::new(config.clone()).unwrap();
            for _ in 0..12 {
                controller.update(&points).unwrap();
                assert_eq!(
                    controller.pairs(),
                    &fresh_list(&points, &config, &PairFilterChain::new()),
                    "threshold {threshold}, min grid size {min_grid_size}"
                );

                let jumpers = rng.gen_range(1..12);
                for index in pick_distinct(&mut rng, points.len(), jumpers) {
                    let delta = random_direction(&mut rng) * 5.0;
                    points.translate(index, &delta).unwrap();
                }
            }
        }
    }
}

#[test]
fn strategies_agree_over_an_update_sequence() {
    let grid = builder().build().unwrap();
    let quadratic = builder().strategy(FinderStrategy::Quadratic).build().unwrap();
    let mut points = integer_box(200, 25, 1.0, 13);
    let mut by_grid = ProximityListController::new(grid).unwrap();
    let mut by_quadratic = ProximityListController::new(quadratic).unwrap();
    let mut rng = StdRng::seed_from_u64(14);

    for _ in 0..10 {
        assert_eq!(
            by_grid.update(&points).unwrap(),
            by_quadratic.update(&points).unwrap()
        );
        assert_eq!(by_grid.pairs(), by_quadratic.pairs());

        for index in pick_distinct(&mut rng, points.len(), 8) {
            points
                .translate(index, &(random_direction(&mut rng) * 3.0))
                .unwrap();
        }
    }
}

#[test]
fn rotated_rigid_body_is_tracked_as_a_whole() {
    let mut points = integer_box(80, 20, 0.5, 15);
    let frame = Isometry3::from_parts(
        Translation3::new(10.0, 10.0, 10.0),
        UnitQuaternion::identity(),
    );
    let body = points.add_rigid_body(frame).unwrap();
    for k in 0..8 {
        let angle = k as f64 * std::f64::consts::FRAC_PI_4;
        let local = Point3::new(3.0 * angle.cos(), 3.0 * angle.sin(), 0.5 * k as f64 - 2.0);
        points.add_rigid_member(body, local, 0.5).unwrap();
    }

    let mut filters = PairFilterChain::new();
    filters.push(Arc::new(SameRigidBodyFilter));
    let mut controller = ProximityListController::new(config())
        .unwrap()
        .with_filters(filters.clone());
    controller.update(&points).unwrap();

    let step = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
    let mut rotation = UnitQuaternion::identity();
    for _ in 0..4 {
        rotation = step * rotation;
        points
            .set_rigid_body_frame(
                body,
                Isometry3::from_parts(Translation3::new(10.0, 10.0, 10.0), rotation),
            )
            .unwrap();

        assert_eq!(
            controller.update(&points).unwrap(),
            UpdateOutcome::Incremental { moved: 8 }
        );
        assert_eq!(controller.pairs(), &fresh_list(&points, &config(), &filters));

        let members: BTreeSet<usize> = (80..88).collect();
        assert!(
            controller
                .pairs()
                .iter()
                .all(|(i, j)| !(members.contains(i) && members.contains(j)))
        );
    }
}

#[test]
fn rigid_strategy_tracks_moving_bodies_like_the_grid() {
    let mut points = integer_box(150, 30, 0.5, 40);
    let mut rng = StdRng::seed_from_u64(41);
    let mut bodies = Vec::new();
    for b in 0..6 {
        let origin = Vector3::new(5.0 * b as f64, 15.0, 15.0);
        let body = points
            .add_rigid_body(Isometry3::translation(origin.x, origin.y, origin.z))
            .unwrap();
        for _ in 0..7 {
            let local = Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            );
            points.add_rigid_member(body, local, 0.7).unwrap();
        }
        bodies.push((body, origin));
    }

    let mut filters = PairFilterChain::new();
    filters.push(Arc::new(SameRigidBodyFilter));
    let rigid = builder()
        .strategy(FinderStrategy::Rigid)
        .incremental_threshold(30)
        .build()
        .unwrap();
    let grid = builder().incremental_threshold(30).build().unwrap();
    let mut by_rigid = ProximityListController::new(rigid)
        .unwrap()
        .with_filters(filters.clone());
    let mut by_grid = ProximityListController::new(grid)
        .unwrap()
        .with_filters(filters);

    for step in 0..12 {
        assert_eq!(by_rigid.update(&points).unwrap(), by_grid.update(&points).unwrap());
        assert_eq!(by_rigid.pairs(), by_grid.pairs(), "step {step}");

        let (body, origin) = bodies[step % bodies.len()];
        let angle = 0.4 * (step + 1) as f64;
        let shift = random_direction(&mut rng) * 1.5;
        let frame = Isometry3::from_parts(
            Translation3::from(origin + shift),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle),
        );
        points.set_rigid_body_frame(body, frame).unwrap();
        for index in pick_distinct(&mut rng, 150, 4) {
            points
                .translate(index, &(random_direction(&mut rng) * 2.5))
                .unwrap();
        }
    }
}

#[test]
fn periodic_box_lists_pairs_across_the_boundary() {
    let cell = PeriodicBox::cubic(20.0).unwrap();
    let mut points = integer_box(120, 20, 0.5, 50);
    let left = points.add(Point3::new(0.25, 10.5, 10.5), 0.5).unwrap();
    let right = points.add(Point3::new(19.75, 10.5, 10.5), 0.5).unwrap();
    let (left, right) = (points.index_of(left).unwrap(), points.index_of(right).unwrap());

    let periodic_grid = builder().periodic_box(cell).build().unwrap();
    let periodic_quadratic = builder()
        .periodic_box(cell)
        .strategy(FinderStrategy::Quadratic)
        .build()
        .unwrap();
    let mut by_grid = ProximityListController::new(periodic_grid).unwrap();
    let mut by_quadratic = ProximityListController::new(periodic_quadratic).unwrap();
    let mut open = ProximityListController::new(config()).unwrap();

    by_grid.update(&points).unwrap();
    by_quadratic.update(&points).unwrap();
    open.update(&points).unwrap();
    assert!(by_grid.pairs().contains(&(left, right)));
    assert!(!open.pairs().contains(&(left, right)));

    let mut rng = StdRng::seed_from_u64(51);
    for _ in 0..10 {
        // Some objects leave the primary cell; separations still wrap.
        for index in pick_distinct(&mut rng, points.len(), 6) {
            points
                .translate(index, &(random_direction(&mut rng) * 4.0))
                .unwrap();
        }
        assert_eq!(
            by_grid.update(&points).unwrap(),
            by_quadratic.update(&points).unwrap()
        );
        assert_eq!(by_grid.pairs(), by_quadratic.pairs());
    }
}

#[test]
fn small_rigid_rotation_stays_within_the_slack() {
    let mut points = PointSet::new();
    let body = points.add_rigid_body(Isometry3::identity()).unwrap();
    for x in [-1.0, 1.0] {
        points.add_rigid_member(body, Point3::new(x, 0.0, 0.0), 0.2).unwrap();
    }
    points.add(Point3::new(0.0, 3.0, 0.0), 0.2).unwrap();

    let mut controller = ProximityListController::new(config()).unwrap();
    controller.update(&points).unwrap();

    // A 0.1 rad turn moves a member at radius 1 by about 0.1.
    let frame = Isometry3::rotation(Vector3::new(0.0, 0.0, 0.1));
    points.set_rigid_body_frame(body, frame).unwrap();
    assert_eq!(controller.update(&points).unwrap(), UpdateOutcome::Unchanged);
}

#[test]
fn built_in_filters_are_symmetric() {
    let mut points = integer_box(30, 10, 1.0, 16);
    let body = points.add_rigid_body(Isometry3::identity()).unwrap();
    for k in 0..4 {
        points
            .add_rigid_member(body, Point3::new(k as f64, 0.0, 0.0), 0.5)
            .unwrap();
    }

    let ids: Vec<_> = points.iter().map(|object| object.id).collect();
    let bonded = BondedPairFilter::from_pairs(ids.iter().copied().zip(ids.iter().copied().skip(1)));
    assert!(check_filter_symmetry(&bonded, &points).is_ok());
    assert!(check_filter_symmetry(&SameRigidBodyFilter, &points).is_ok());

    let lopsided = FnPairFilter::new("lopsided", |a: &TrackedObject, b: &TrackedObject| {
        a.id < b.id
    });
    assert!(check_filter_symmetry(&lopsided, &points).is_err());
}

#[test]
fn bipartite_updates_match_brute_force() {
    let mut a = integer_box(60, 25, 1.0, 17);
    let mut b = integer_box(80, 25, 0.5, 18);
    let mut controller = ProximityListController::bipartite(config()).unwrap();
    let mut rng = StdRng::seed_from_u64(19);

    assert_eq!(
        controller.update_bipartite(&a, &b).unwrap(),
        UpdateOutcome::Rebuilt(RebuildReason::FirstCall)
    );
    for _ in 0..10 {
        assert_eq!(controller.pairs(), &brute_force_cross(&a, &b, ENVELOPE));

        for index in pick_distinct(&mut rng, a.len(), 3) {
            a.translate(index, &(random_direction(&mut rng) * 4.0)).unwrap();
        }
        for index in pick_distinct(&mut rng, b.len(), 2) {
            b.translate(index, &(random_direction(&mut rng) * 4.0)).unwrap();
        }
        assert_eq!(
            controller.update_bipartite(&a, &b).unwrap(),
            UpdateOutcome::Incremental { moved: 5 }
        );
    }
    assert_eq!(controller.pairs(), &brute_force_cross(&a, &b, ENVELOPE));
}

#[test]
fn self_join_controller_rejects_bipartite_updates() {
    let points = integer_box(10, 10, 1.0, 20);
    let mut controller = ProximityListController::new(config()).unwrap();
    assert!(controller.update_bipartite(&points, &points).is_err());
    assert!(controller.update(&points).is_ok());
}
