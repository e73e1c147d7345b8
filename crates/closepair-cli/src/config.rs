use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::simulation::{SimulationConfig, SystemConfig};
use closepair::core::spatial::distance::DistanceMode;
use closepair::core::spatial::periodic::PeriodicBox;
use closepair::engine::config::{FinderStrategy, ProximityConfig, ProximityConfigBuilder};
use closepair::engine::error::EngineError;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IntoDeserializer};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_DISTANCE: f64 = 4.0;
const DEFAULT_SLACK: f64 = 1.0;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialEngineConfig {
    distance: Option<f64>,
    slack: Option<f64>,
    mode: Option<DistanceMode>,
    strategy: Option<FinderStrategy>,
    incremental_threshold: Option<usize>,
    min_grid_size: Option<usize>,
    max_pairs: Option<usize>,
    /// Wraps the simulation box periodically.
    periodic: Option<bool>,
    verify: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSystemConfig {
    objects: Option<usize>,
    box_size: Option<f64>,
    min_radius: Option<f64>,
    max_radius: Option<f64>,
    rigid_bodies: Option<usize>,
    members_per_body: Option<usize>,
    body_radius: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSimulationConfig {
    steps: Option<usize>,
    step_size: Option<f64>,
    moving_fraction: Option<f64>,
    seed: Option<u64>,
}

/// The run configuration as read from a file, before command-line overrides.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    engine: Option<PartialEngineConfig>,
    system: Option<PartialSystemConfig>,
    simulation: Option<PartialSimulationConfig>,
}

/// Everything a simulation run needs, fully resolved and validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub engine: ProximityConfig,
    pub system: SystemConfig,
    pub simulation: SimulationConfig,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Reads the file named by `--config`, or starts from defaults without one.
    pub fn load(args: &RunArgs) -> Result<Self> {
        match &args.config {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Applies `-S` setters, then explicit flags, then defaults.
    pub fn merge_with_cli(mut self, args: &RunArgs, slack: Option<f64>) -> Result<RunConfig> {
        self.apply_set_values(&args.set_values)?;

        let engine = self.engine.take().unwrap_or_default();
        let system = self.system.take().unwrap_or_default();
        let simulation = self.simulation.take().unwrap_or_default();

        let defaults = SystemConfig::default();
        let system = SystemConfig {
            objects: args.objects.or(system.objects).unwrap_or(defaults.objects),
            box_size: system.box_size.unwrap_or(defaults.box_size),
            min_radius: system.min_radius.unwrap_or(defaults.min_radius),
            max_radius: system.max_radius.unwrap_or(defaults.max_radius),
            rigid_bodies: system.rigid_bodies.unwrap_or(defaults.rigid_bodies),
            members_per_body: system.members_per_body.unwrap_or(defaults.members_per_body),
            body_radius: system.body_radius.unwrap_or(defaults.body_radius),
        };
        validate_system(&system)?;

        let mut builder = ProximityConfigBuilder::new()
            .distance(args.distance.or(engine.distance).unwrap_or(DEFAULT_DISTANCE))
            .slack(slack.or(engine.slack).unwrap_or(DEFAULT_SLACK));
        if let Some(mode) = engine.mode {
            builder = builder.mode(mode);
        }
        if let Some(strategy) = engine.strategy {
            builder = builder.strategy(strategy);
        }
        if let Some(threshold) = engine.incremental_threshold {
            builder = builder.incremental_threshold(threshold);
        }
        if let Some(size) = engine.min_grid_size {
            builder = builder.min_grid_size(size);
        }
        if let Some(limit) = engine.max_pairs {
            builder = builder.max_pairs(limit);
        }
        if engine.periodic == Some(true) {
            let periodic = PeriodicBox::cubic(system.box_size)
                .map_err(|e| CliError::Config(format!("Invalid periodic box: {}", e)))?;
            builder = builder.periodic_box(periodic);
        }
        if let Some(verify) = engine.verify {
            builder = builder.verify(verify);
        }
        let engine = builder.build().map_err(EngineError::from)?;

        let defaults = SimulationConfig::default();
        let simulation = SimulationConfig {
            steps: args.steps.or(simulation.steps).unwrap_or(defaults.steps),
            step_size: simulation.step_size.unwrap_or(defaults.step_size),
            moving_fraction: simulation.moving_fraction.unwrap_or(defaults.moving_fraction),
            seed: args.seed.or(simulation.seed).unwrap_or(defaults.seed),
        };
        validate_simulation(&simulation)?;

        Ok(RunConfig {
            engine,
            system,
            simulation,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            let applied = match key.split_once('.') {
                Some(("engine", field)) => self
                    .engine
                    .get_or_insert_with(Default::default)
                    .set(field, key, value)?,
                Some(("system", field)) => self
                    .system
                    .get_or_insert_with(Default::default)
                    .set(field, key, value)?,
                Some(("simulation", field)) => self
                    .simulation
                    .get_or_insert_with(Default::default)
                    .set(field, key, value)?,
                _ => false,
            };
            if !applied {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl PartialEngineConfig {
    fn set(&mut self, field: &str, key: &str, value: &str) -> Result<bool> {
        match field {
            "distance" => self.distance = Some(parse(key, value)?),
            "slack" => self.slack = Some(parse(key, value)?),
            "mode" => self.mode = Some(parse_enum(key, value)?),
            "strategy" => self.strategy = Some(parse_enum(key, value)?),
            "incremental-threshold" => self.incremental_threshold = Some(parse(key, value)?),
            "min-grid-size" => self.min_grid_size = Some(parse(key, value)?),
            "max-pairs" => self.max_pairs = Some(parse(key, value)?),
            "periodic" => self.periodic = Some(parse(key, value)?),
            "verify" => self.verify = Some(parse(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl PartialSystemConfig {
    fn set(&mut self, field: &str, key: &str, value: &str) -> Result<bool> {
        match field {
            "objects" => self.objects = Some(parse(key, value)?),
            "box-size" => self.box_size = Some(parse(key, value)?),
            "min-radius" => self.min_radius = Some(parse(key, value)?),
            "max-radius" => self.max_radius = Some(parse(key, value)?),
            "rigid-bodies" => self.rigid_bodies = Some(parse(key, value)?),
            "members-per-body" => self.members_per_body = Some(parse(key, value)?),
            "body-radius" => self.body_radius = Some(parse(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl PartialSimulationConfig {
    fn set(&mut self, field: &str, key: &str, value: &str) -> Result<bool> {
        match field {
            "steps" => self.steps = Some(parse(key, value)?),
            "step-size" => self.step_size = Some(parse(key, value)?),
            "moving-fraction" => self.moving_fraction = Some(parse(key, value)?),
            "seed" => self.seed = Some(parse(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!("Invalid value for {}: {}", key, value))
    })
}

fn parse_enum<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    T::deserialize(value.trim().into_deserializer()).map_err(|e: serde::de::value::Error| {
        CliError::Config(format!("Invalid value for {}: {}", key, e))
    })
}

fn validate_system(system: &SystemConfig) -> Result<()> {
    if system.objects + system.rigid_bodies * system.members_per_body == 0 {
        return Err(CliError::Config("The system must contain at least one object.".into()));
    }
    if !(system.box_size.is_finite() && system.box_size > 0.0) {
        return Err(CliError::Config(format!(
            "`system.box-size` must be positive, got {}",
            system.box_size
        )));
    }
    if !(system.min_radius >= 0.0 && system.max_radius >= system.min_radius)
        || !system.max_radius.is_finite()
    {
        return Err(CliError::Config(format!(
            "Radii must satisfy 0 <= min-radius <= max-radius, got {} and {}",
            system.min_radius, system.max_radius
        )));
    }
    if !(system.body_radius.is_finite() && system.body_radius >= 0.0) {
        return Err(CliError::Config(format!(
            "`system.body-radius` must be non-negative, got {}",
            system.body_radius
        )));
    }
    Ok(())
}

fn validate_simulation(simulation: &SimulationConfig) -> Result<()> {
    if simulation.steps == 0 {
        return Err(CliError::Config("`simulation.steps` must be at least 1.".into()));
    }
    if !(simulation.step_size.is_finite() && simulation.step_size >= 0.0) {
        return Err(CliError::Config(format!(
            "`simulation.step-size` must be non-negative, got {}",
            simulation.step_size
        )));
    }
    if !(0.0..=1.0).contains(&simulation.moving_fraction) {
        return Err(CliError::Config(format!(
            "`simulation.moving-fraction` must lie in [0, 1], got {}",
            simulation.moving_fraction
        )));
    }
    Ok(())
}
