use crate::core::models::point_set::PointSet;
use crate::engine::config::{ConfigError, ProximityConfig, validate_cutoff};
use crate::engine::controller::ProximityListController;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use std::time::Instant;
use tracing::{info, instrument};

/// Measurements of one candidate slack.
#[derive(Debug, Clone, PartialEq)]
pub struct SlackTrial {
    pub slack: f64,
    /// Mean wall-clock seconds spent in `update` per step.
    pub update_seconds: f64,
    /// Mean list length per step.
    pub mean_pairs: f64,
    /// Update time plus the charged evaluation cost, per step.
    pub cost_per_step: f64,
    pub full_rebuilds: u64,
    pub partial_rebuilds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlackEstimate {
    /// The cheapest candidate.
    pub slack: f64,
    pub cost_per_step: f64,
    /// One entry per candidate, in the order given.
    pub trials: Vec<SlackTrial>,
}

/// Picks the slack with the lowest per-step cost for a given motion pattern.
///
/// A larger slack makes updates rarer but the list longer, and every listed
/// pair costs something downstream. For each candidate this replays `steps`
/// steps of `advance` on a private copy of `points`, updating a fresh
/// controller after each step, and charges `pair_cost` seconds per listed
/// pair on top of the measured update time.
///
/// `advance(points, step)` must move the objects the same way for every
/// candidate, typically by reseeding its random source from `step`.
#[instrument(skip_all, name = "slack_estimation_workflow")]
pub fn estimate_slack<F>(
    points: &PointSet,
    base: &ProximityConfig,
    candidates: &[f64],
    steps: usize,
    pair_cost: f64,
    mut advance: F,
    reporter: &ProgressReporter,
) -> Result<SlackEstimate, EngineError>
where
    F: FnMut(&mut PointSet, usize),
{
    if candidates.is_empty() {
        return Err(ConfigError::Empty("candidates").into());
    }
    if steps == 0 {
        return Err(ConfigError::Empty("steps").into());
    }
    validate_cutoff("pair_cost", pair_cost)?;
    for &slack in candidates {
        validate_cutoff("slack", slack)?;
    }

    info!(
        candidates = candidates.len(),
        steps,
        objects = points.len(),
        "Estimating slack."
    );

    let mut trials = Vec::with_capacity(candidates.len());
    for &slack in candidates {
        reporter.report(Progress::TrialStart {
            slack,
            steps: steps as u64,
        });
        let trial = run_trial(points, base, slack, steps, pair_cost, &mut advance, reporter)?;
        reporter.report(Progress::TrialFinish {
            cost_per_step: trial.cost_per_step,
        });
        info!(
            slack,
            cost_per_step = trial.cost_per_step,
            mean_pairs = trial.mean_pairs,
            full_rebuilds = trial.full_rebuilds,
            "Slack trial complete."
        );
        trials.push(trial);
    }

    let (slack, cost_per_step) = trials
        .iter()
        .min_by(|a, b| a.cost_per_step.total_cmp(&b.cost_per_step))
        .map(|best| (best.slack, best.cost_per_step))
        .ok_or_else(|| EngineError::Internal("no slack trials were run".into()))?;

    Ok(SlackEstimate {
        slack,
        cost_per_step,
        trials,
    })
}

fn run_trial<F>(
    points: &PointSet,
    base: &ProximityConfig,
    slack: f64,
    steps: usize,
    pair_cost: f64,
    advance: &mut F,
    reporter: &ProgressReporter,
) -> Result<SlackTrial, EngineError>
where
    F: FnMut(&mut PointSet, usize),
{
    let config = ProximityConfig {
        slack,
        ..base.clone()
    };
    let mut controller = ProximityListController::new(config)?;
    let mut working = points.clone();

    let mut update_seconds = 0.0;
    let mut total_pairs = 0usize;
    for step in 0..steps {
        advance(&mut working, step);
        let started = Instant::now();
        controller.update(&working)?;
        update_seconds += started.elapsed().as_secs_f64();

        let pairs = controller.pairs().len();
        total_pairs += pairs;
        reporter.report(Progress::StepCompleted { pairs });
    }

    let steps = steps as f64;
    let mean_pairs = total_pairs as f64 / steps;
    let stats = controller.stats();
    Ok(SlackTrial {
        slack,
        update_seconds: update_seconds / steps,
        mean_pairs,
        cost_per_step: update_seconds / steps + pair_cost * mean_pairs,
        full_rebuilds: stats.full_rebuild_count,
        partial_rebuilds: stats.partial_rebuild_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::ProximityConfigBuilder;
    use nalgebra::{Point3, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    fn cloud(count: usize, extent: f64, seed: u64) -> PointSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = PointSet::new();
        for _ in 0..count {
            let position = Point3::new(
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
                rng.gen_range(0.0..extent),
            );
            points.add(position, 0.5).unwrap();
        }
        points
    }

    fn jiggle(points: &mut PointSet, step: usize) {
        let mut rng = StdRng::seed_from_u64(step as u64);
        for index in 0..points.len() {
            let delta = Vector3::new(
                rng.gen_range(-0.2..0.2),
                rng.gen_range(-0.2..0.2),
                rng.gen_range(-0.2..0.2),
            );
            points.translate(index, &delta).unwrap();
        }
    }

    #[test]
    fn expensive_pairs_favour_the_smallest_slack() {
        let points = cloud(150, 20.0, 3);
        let base = ProximityConfigBuilder::new().distance(1.0).build().unwrap();
        let estimate = estimate_slack(
            &points,
            &base,
            &[0.1, 4.0],
            5,
            1.0,
            jiggle,
            &ProgressReporter::new(),
        )
        .unwrap();

        assert_eq!(estimate.slack, 0.1);
        assert_eq!(estimate.trials.len(), 2);
        assert!(estimate.trials[1].mean_pairs > estimate.trials[0].mean_pairs);
        assert!(estimate.trials[0].full_rebuilds >= 1);
    }

    #[test]
    fn original_points_are_not_modified() {
        let points = cloud(20, 10.0, 4);
        let before: Vec<_> = points.iter().map(|o| o.position).collect();
        let base = ProximityConfigBuilder::new().distance(1.0).build().unwrap();
        estimate_slack(&points, &base, &[0.5], 3, 0.0, jiggle, &ProgressReporter::new()).unwrap();
        let after: Vec<_> = points.iter().map(|o| o.position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn reports_progress_for_every_trial_and_step() {
        let points = cloud(10, 5.0, 5);
        let base = ProximityConfigBuilder::new().distance(1.0).build().unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        estimate_slack(&points, &base, &[0.2, 0.4], 4, 0.0, jiggle, &reporter).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        let steps = events
            .iter()
            .filter(|e| matches!(e, Progress::StepCompleted { .. }))
            .count();
        assert_eq!(steps, 8);
        assert!(matches!(events[0], Progress::TrialStart { slack, steps: 4 } if slack == 0.2));
    }

    #[test]
    fn rejects_empty_candidates_and_zero_steps() {
        let points = cloud(5, 5.0, 6);
        let base = ProximityConfigBuilder::new().distance(1.0).build().unwrap();
        let reporter = ProgressReporter::new();
        assert!(matches!(
            estimate_slack(&points, &base, &[], 3, 0.0, jiggle, &reporter),
            Err(EngineError::Config {
                source: ConfigError::Empty("candidates")
            })
        ));
        assert!(matches!(
            estimate_slack(&points, &base, &[0.5], 0, 0.0, jiggle, &reporter),
            Err(EngineError::Config {
                source: ConfigError::Empty("steps")
            })
        ));
        assert!(matches!(
            estimate_slack(&points, &base, &[-0.5], 3, 0.0, jiggle, &reporter),
            Err(EngineError::Config { .. })
        ));
    }
}
