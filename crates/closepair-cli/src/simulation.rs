use closepair::core::models::ids::RigidBodyId;
use closepair::core::models::point_set::{PointSet, PointSetError};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Shape of the simulated system.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    /// Free objects, not counting rigid-body members.
    pub objects: usize,
    /// Edge length of the cubic box objects are confined to.
    pub box_size: f64,
    pub min_radius: f64,
    pub max_radius: f64,
    pub rigid_bodies: usize,
    pub members_per_body: usize,
    /// Members are placed within this distance of their body's origin.
    pub body_radius: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            objects: 1000,
            box_size: 40.0,
            min_radius: 0.5,
            max_radius: 1.5,
            rigid_bodies: 0,
            members_per_body: 8,
            body_radius: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub steps: usize,
    /// Largest displacement of a single step.
    pub step_size: f64,
    /// Probability that a given free object moves in a given step.
    pub moving_fraction: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps: 200,
            step_size: 0.3,
            moving_fraction: 1.0,
            seed: 42,
        }
    }
}

/// Fills a box with randomly placed free objects and rigid bodies.
pub fn build_system(
    system: &SystemConfig,
    seed: u64,
) -> Result<(PointSet, Vec<RigidBodyId>), PointSetError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = PointSet::new();

    for _ in 0..system.objects {
        let position = random_point_in_box(&mut rng, system.box_size);
        let radius = random_radius(&mut rng, system);
        points.add(position, radius)?;
    }

    let mut bodies = Vec::with_capacity(system.rigid_bodies);
    for _ in 0..system.rigid_bodies {
        let origin = random_point_in_box(&mut rng, system.box_size);
        let rotation = random_rotation(&mut rng, std::f64::consts::PI);
        let frame = Isometry3::from_parts(Translation3::from(origin.coords), rotation);
        let body = points.add_rigid_body(frame)?;
        for _ in 0..system.members_per_body {
            let reach = system.body_radius * rng.r#gen::<f64>().cbrt();
            let local = Point3::from(random_unit_vector(&mut rng) * reach);
            let radius = random_radius(&mut rng, system);
            points.add_rigid_member(body, local, radius)?;
        }
        bodies.push(body);
    }

    debug!(
        objects = points.len(),
        rigid_bodies = bodies.len(),
        "Built simulated system."
    );
    Ok((points, bodies))
}

/// A reproducible random walk confined to a box.
///
/// The motion of step `k` depends only on the seed and `k`, so replaying the
/// same steps on copies of the same system yields identical trajectories.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    step_size: f64,
    moving_fraction: f64,
    seed: u64,
    box_size: f64,
    body_radius: f64,
    bodies: Vec<RigidBodyId>,
}

impl RandomWalk {
    pub fn new(
        simulation: &SimulationConfig,
        system: &SystemConfig,
        bodies: Vec<RigidBodyId>,
    ) -> Self {
        Self {
            step_size: simulation.step_size,
            moving_fraction: simulation.moving_fraction,
            seed: simulation.seed,
            box_size: system.box_size,
            body_radius: system.body_radius,
            bodies,
        }
    }

    pub fn bodies(&self) -> &[RigidBodyId] {
        &self.bodies
    }

    pub fn advance(&self, points: &mut PointSet, step: usize) -> Result<(), PointSetError> {
        let mut rng = StdRng::seed_from_u64(self.step_seed(step));

        for index in 0..points.len() {
            let Some(object) = points.get(index) else {
                continue;
            };
            if object.membership.is_some() || !rng.gen_bool(self.moving_fraction) {
                continue;
            }
            let delta = random_unit_vector(&mut rng) * self.step_size * rng.r#gen::<f64>();
            let target = reflect_into_box(object.position + delta, self.box_size);
            points.set_position(index, target)?;
        }

        let max_angle = if self.body_radius > 0.0 {
            self.step_size / self.body_radius
        } else {
            0.0
        };
        for &id in &self.bodies {
            let Some(body) = points.rigid_body(id) else {
                continue;
            };
            let shift = random_unit_vector(&mut rng) * self.step_size * rng.r#gen::<f64>();
            let origin = reflect_into_box(
                Point3::from(body.frame.translation.vector) + shift,
                self.box_size,
            );
            let rotation = random_rotation(&mut rng, max_angle) * body.frame.rotation;
            let frame = Isometry3::from_parts(Translation3::from(origin.coords), rotation);
            points.set_rigid_body_frame(id, frame)?;
        }
        Ok(())
    }

    fn step_seed(&self, step: usize) -> u64 {
        self.seed ^ (step as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

fn random_point_in_box(rng: &mut StdRng, size: f64) -> Point3<f64> {
    Point3::new(
        rng.gen_range(0.0..size),
        rng.gen_range(0.0..size),
        rng.gen_range(0.0..size),
    )
}

fn random_radius(rng: &mut StdRng, system: &SystemConfig) -> f64 {
    if system.max_radius > system.min_radius {
        rng.gen_range(system.min_radius..system.max_radius)
    } else {
        system.min_radius
    }
}

fn random_unit_vector(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let norm_squared: f64 = v.norm_squared();
        if norm_squared > 1e-4 && norm_squared <= 1.0 {
            return v / norm_squared.sqrt();
        }
    }
}

fn random_rotation(rng: &mut StdRng, max_angle: f64) -> UnitQuaternion<f64> {
    let angle = max_angle * rng.r#gen::<f64>();
    UnitQuaternion::from_scaled_axis(random_unit_vector(rng) * angle)
}

fn reflect_into_box(point: Point3<f64>, size: f64) -> Point3<f64> {
    point.map(|x| {
        let x = x.abs();
        let x = if x > size { 2.0 * size - x } else { x };
        x.clamp(0.0, size)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_system() -> SystemConfig {
        SystemConfig {
            objects: 50,
            box_size: 10.0,
            rigid_bodies: 2,
            members_per_body: 4,
            ..SystemConfig::default()
        }
    }

    #[test]
    fn build_system_counts_free_objects_and_members() {
        let (points, bodies) = build_system(&small_system(), 1).unwrap();
        assert_eq!(points.len(), 58);
        assert_eq!(bodies.len(), 2);
        for &body in &bodies {
            assert_eq!(points.rigid_body(body).unwrap().members.len(), 4);
        }
    }

    #[test]
    fn build_system_is_reproducible_for_a_seed() {
        let (a, _) = build_system(&small_system(), 7).unwrap();
        let (b, _) = build_system(&small_system(), 7).unwrap();
        let positions = |p: &PointSet| p.iter().map(|o| o.position).collect::<Vec<_>>();
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn advance_replays_identically_on_copies() {
        let system = small_system();
        let (mut a, bodies) = build_system(&system, 3).unwrap();
        let mut b = a.clone();
        let walk = RandomWalk::new(&SimulationConfig::default(), &system, bodies);

        for step in 0..5 {
            walk.advance(&mut a, step).unwrap();
            walk.advance(&mut b, step).unwrap();
        }
        let positions = |p: &PointSet| p.iter().map(|o| o.position).collect::<Vec<_>>();
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn advance_keeps_free_objects_in_the_box_and_bounds_each_step() {
        let system = SystemConfig {
            rigid_bodies: 0,
            ..small_system()
        };
        let simulation = SimulationConfig {
            step_size: 2.0,
            ..SimulationConfig::default()
        };
        let (mut points, bodies) = build_system(&system, 4).unwrap();
        let walk = RandomWalk::new(&simulation, &system, bodies);

        for step in 0..20 {
            let before: Vec<_> = points.iter().map(|o| o.position).collect();
            walk.advance(&mut points, step).unwrap();
            for (object, old) in points.iter().zip(&before) {
                assert!((object.position - old).norm() <= 2.0 + 1e-12);
                assert!(object.position.iter().all(|&x| (0.0..=10.0).contains(&x)));
            }
        }
    }

    #[test]
    fn zero_moving_fraction_leaves_free_objects_still() {
        let system = SystemConfig {
            rigid_bodies: 0,
            ..small_system()
        };
        let simulation = SimulationConfig {
            moving_fraction: 0.0,
            ..SimulationConfig::default()
        };
        let (mut points, bodies) = build_system(&system, 5).unwrap();
        let before: Vec<_> = points.iter().map(|o| o.position).collect();
        RandomWalk::new(&simulation, &system, bodies)
            .advance(&mut points, 0)
            .unwrap();
        let after: Vec<_> = points.iter().map(|o| o.position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reflect_into_box_mirrors_at_both_walls() {
        let p = reflect_into_box(Point3::new(-0.5, 10.5, 3.0), 10.0);
        assert!((p - Point3::new(0.5, 9.5, 3.0)).norm() < 1e-12);
    }
}
