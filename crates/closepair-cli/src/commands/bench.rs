use super::resolve_config;
use crate::cli::BenchArgs;
use crate::config::RunConfig;
use crate::error::Result;
use crate::simulation::{RandomWalk, build_system};
use crate::utils::progress::CliProgressHandler;
use closepair::engine::controller::{ProximityListController, UpdateOutcome};
use closepair::engine::error::EngineError;
use closepair::engine::filter::SameRigidBodyFilter;
use closepair::engine::progress::{Progress, ProgressReporter};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Counters gathered over one simulated run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchReport {
    pub objects: usize,
    pub steps: usize,
    pub unchanged: u64,
    pub incremental: u64,
    pub rebuilds: u64,
    /// Objects re-searched by incremental updates, summed over the run.
    pub moved_total: u64,
    pub mean_pairs: f64,
    pub peak_pairs: usize,
    pub update_seconds: f64,
}

pub fn run(args: BenchArgs) -> Result<()> {
    let config = resolve_config(&args.run, args.slack)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Benchmarking {} objects over {} steps (distance {}, slack {})...",
        config.system.objects, config.simulation.steps, config.engine.distance, config.engine.slack
    );
    let report = run_bench(&config, &reporter)?;
    print_report(&report);
    Ok(())
}

#[instrument(skip_all, name = "bench_command")]
pub fn run_bench(config: &RunConfig, reporter: &ProgressReporter) -> Result<BenchReport> {
    let (mut points, bodies) =
        build_system(&config.system, config.simulation.seed).map_err(EngineError::from)?;
    let walk = RandomWalk::new(&config.simulation, &config.system, bodies);

    let mut controller = ProximityListController::new(config.engine.clone())?;
    if !walk.bodies().is_empty() {
        controller.add_filter(Arc::new(SameRigidBodyFilter));
    }

    let steps = config.simulation.steps;
    let mut report = BenchReport {
        objects: points.len(),
        steps,
        ..BenchReport::default()
    };
    let mut total_pairs = 0usize;

    reporter.report(Progress::TrialStart {
        slack: config.engine.slack,
        steps: steps as u64,
    });
    for step in 0..steps {
        walk.advance(&mut points, step).map_err(EngineError::from)?;

        let started = Instant::now();
        let outcome = controller.update(&points)?;
        report.update_seconds += started.elapsed().as_secs_f64();

        match outcome {
            UpdateOutcome::Unchanged => report.unchanged += 1,
            UpdateOutcome::Incremental { moved } => {
                report.incremental += 1;
                report.moved_total += moved as u64;
            }
            UpdateOutcome::Rebuilt(_) => report.rebuilds += 1,
        }

        let pairs = controller.pairs().len();
        total_pairs += pairs;
        report.peak_pairs = report.peak_pairs.max(pairs);
        reporter.report(Progress::StepCompleted { pairs });
    }
    report.mean_pairs = total_pairs as f64 / steps as f64;
    reporter.report(Progress::TrialFinish {
        cost_per_step: report.update_seconds / steps as f64,
    });

    info!(
        rebuilds = report.rebuilds,
        incremental = report.incremental,
        unchanged = report.unchanged,
        mean_pairs = report.mean_pairs,
        "Benchmark finished."
    );
    Ok(report)
}

fn print_report(report: &BenchReport) {
    let per_step = report.update_seconds / report.steps as f64;
    println!("Objects:              {}", report.objects);
    println!("Steps:                {}", report.steps);
    println!("Full rebuilds:        {}", report.rebuilds);
    println!("Incremental updates:  {}", report.incremental);
    println!("Unchanged updates:    {}", report.unchanged);
    if report.incremental > 0 {
        println!(
            "Moved per patch:      {:.1}",
            report.moved_total as f64 / report.incremental as f64
        );
    }
    println!("Mean pairs:           {:.1}", report.mean_pairs);
    println!("Peak pairs:           {}", report.peak_pairs);
    println!("Update time:          {:.3e} s/step", per_step);
}
