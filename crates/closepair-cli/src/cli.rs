use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "closepair - Benchmark and tune incremental close-pair list maintenance on simulated particle systems.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel pair searches.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a random-walk simulation and report how the pair list was maintained.
    Bench(BenchArgs),
    /// Compare candidate slack values on the same simulated motion.
    EstimateSlack(EstimateArgs),
}

/// Settings shared by every subcommand that drives a simulation.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to a run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the cutoff distance.
    #[arg(short = 'd', long, value_name = "FLOAT")]
    pub distance: Option<f64>,

    /// Override the number of simulated objects.
    #[arg(short = 'n', long, value_name = "INT")]
    pub objects: Option<usize>,

    /// Override the number of simulation steps.
    #[arg(long, value_name = "INT")]
    pub steps: Option<usize>,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S engine.incremental-threshold=200
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `bench` subcommand.
#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Override the slack.
    #[arg(short, long, value_name = "FLOAT")]
    pub slack: Option<f64>,
}

/// Arguments for the `estimate-slack` subcommand.
#[derive(Args, Debug)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Candidate slack values, comma separated.
    #[arg(
        long,
        value_name = "FLOATS",
        value_delimiter = ',',
        default_values_t = [0.25, 0.5, 1.0, 2.0]
    )]
    pub candidates: Vec<f64>,

    /// Seconds charged per listed pair and step, standing in for the cost of
    /// evaluating the pairs downstream.
    #[arg(long, value_name = "SECONDS", default_value_t = 1e-7)]
    pub pair_cost: f64,
}
