pub mod bench;
pub mod estimate;

use crate::cli::RunArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::Result;
use tracing::info;

fn resolve_config(args: &RunArgs, slack: Option<f64>) -> Result<RunConfig> {
    let partial = PartialRunConfig::load(args)?;
    info!("Merging configuration from file and CLI arguments...");
    partial.merge_with_cli(args, slack)
}
