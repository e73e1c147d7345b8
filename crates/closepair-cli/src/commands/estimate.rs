use super::resolve_config;
use crate::cli::EstimateArgs;
use crate::error::Result;
use crate::simulation::{RandomWalk, build_system};
use crate::utils::progress::CliProgressHandler;
use closepair::engine::error::EngineError;
use closepair::engine::progress::ProgressReporter;
use closepair::workflows::slack::{SlackEstimate, estimate_slack};
use tracing::{info, warn};

pub fn run(args: EstimateArgs) -> Result<()> {
    let config = resolve_config(&args.run, None)?;
    let (points, bodies) =
        build_system(&config.system, config.simulation.seed).map_err(EngineError::from)?;
    let walk = RandomWalk::new(&config.simulation, &config.system, bodies);

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Comparing {} slack candidates on {} objects over {} steps...",
        args.candidates.len(),
        points.len(),
        config.simulation.steps
    );
    info!("Invoking the slack estimation workflow...");

    let estimate = estimate_slack(
        &points,
        &config.engine,
        &args.candidates,
        config.simulation.steps,
        args.pair_cost,
        |points, step| {
            if let Err(e) = walk.advance(points, step) {
                warn!("Simulation step {} could not be applied: {}", step, e);
            }
        },
        &reporter,
    )?;

    print_estimate(&estimate);
    Ok(())
}

fn print_estimate(estimate: &SlackEstimate) {
    println!(
        "{:>10} {:>14} {:>12} {:>10} {:>10}",
        "slack", "cost/step (s)", "mean pairs", "rebuilds", "patches"
    );
    for trial in &estimate.trials {
        let marker = if trial.slack == estimate.slack { "*" } else { " " };
        println!(
            "{:>10.4} {:>14.3e} {:>12.1} {:>10} {:>10} {}",
            trial.slack,
            trial.cost_per_step,
            trial.mean_pairs,
            trial.full_rebuilds,
            trial.partial_rebuilds,
            marker
        );
    }
    println!(
        "✓ Best slack: {} ({:.3e} s/step)",
        estimate.slack, estimate.cost_per_step
    );
}
