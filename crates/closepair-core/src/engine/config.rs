use crate::core::spatial::distance::DistanceMode;
use crate::core::spatial::partition::PartitionConfig;
use crate::core::spatial::periodic::PeriodicBox;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_INCREMENTAL_THRESHOLD: usize = 1000;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Parameter '{name}' must be finite and non-negative, got {value}")]
    InvalidCutoff { name: &'static str, value: f64 },

    #[error("Partition parameter '{name}' must be finite and positive, got {value}")]
    InvalidPartition { name: &'static str, value: f64 },

    #[error("Parameter '{0}' must not be empty or zero")]
    Empty(&'static str),

    #[error("Unsupported combination: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid configuration in '{path}': {source}")]
    Invalid { path: String, source: ConfigError },
}

/// Which pair search implementation a controller uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinderStrategy {
    /// Tests every pair; O(N²) but free of any setup cost.
    Quadratic,
    /// Radius-banded spatial hashing.
    #[default]
    Grid,
    /// Pairs rigid-body bounding spheres first, then descends to members.
    Rigid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProximityConfig {
    /// Cutoff below which a pair must be listed.
    pub distance: f64,
    /// Motion margin added on both sides of every pair.
    #[serde(default)]
    pub slack: f64,
    #[serde(default)]
    pub mode: DistanceMode,
    #[serde(default)]
    pub strategy: FinderStrategy,
    /// Moved-object count at or above which an update rebuilds from scratch.
    #[serde(default = "default_incremental_threshold")]
    pub incremental_threshold: usize,
    #[serde(default)]
    pub partition: PartitionConfig,
    /// Upper bound on the number of candidate pairs a single search may produce.
    #[serde(default)]
    pub max_pairs: Option<usize>,
    /// Periodic boundaries; separations are taken between nearest images.
    #[serde(default)]
    pub periodic_box: Option<PeriodicBox>,
    /// Cross-check the list against a brute-force search after every update.
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_incremental_threshold() -> usize {
    DEFAULT_INCREMENTAL_THRESHOLD
}

fn default_verify() -> bool {
    cfg!(feature = "consistency-checks")
}

impl ProximityConfig {
    /// The radius the maintained list is exact for: `distance + 2 * slack`.
    pub fn envelope(&self) -> f64 {
        self.distance + 2.0 * self.slack
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cutoff("distance", self.distance)?;
        validate_cutoff("slack", self.slack)?;
        validate_positive("cell_scale", self.partition.cell_scale)?;
        validate_positive("min_cell_size", self.partition.min_cell_size)?;
        if self.strategy == FinderStrategy::Rigid && self.periodic_box.is_some() {
            return Err(ConfigError::Unsupported(
                "the rigid strategy does not support a periodic box",
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigLoadError> {
        Self::parse(content, "<inline>")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let display = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: display.clone(),
            source: e,
        })?;
        Self::parse(&content, &display)
    }

    fn parse(content: &str, path: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigLoadError::Toml {
            path: path.to_string(),
            source: e,
        })?;
        config.validate().map_err(|e| ConfigLoadError::Invalid {
            path: path.to_string(),
            source: e,
        })?;
        Ok(config)
    }
}

pub(crate) fn validate_cutoff(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCutoff { name, value })
    }
}

fn validate_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidPartition { name, value })
    }
}

#[derive(Default)]
pub struct ProximityConfigBuilder {
    distance: Option<f64>,
    slack: Option<f64>,
    mode: Option<DistanceMode>,
    strategy: Option<FinderStrategy>,
    incremental_threshold: Option<usize>,
    partition: Option<PartitionConfig>,
    max_pairs: Option<usize>,
    periodic_box: Option<PeriodicBox>,
    verify: Option<bool>,
}

impl ProximityConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
    pub fn slack(mut self, slack: f64) -> Self {
        self.slack = Some(slack);
        self
    }
    pub fn mode(mut self, mode: DistanceMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn strategy(mut self, strategy: FinderStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
    pub fn incremental_threshold(mut self, threshold: usize) -> Self {
        self.incremental_threshold = Some(threshold);
        self
    }
    pub fn partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = Some(partition);
        self
    }
    pub fn min_grid_size(mut self, size: usize) -> Self {
        let mut partition = self.partition.unwrap_or_default();
        partition.min_grid_size = size;
        self.partition = Some(partition);
        self
    }
    pub fn max_pairs(mut self, limit: usize) -> Self {
        self.max_pairs = Some(limit);
        self
    }
    pub fn periodic_box(mut self, periodic_box: PeriodicBox) -> Self {
        self.periodic_box = Some(periodic_box);
        self
    }
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    pub fn build(self) -> Result<ProximityConfig, ConfigError> {
        let config = ProximityConfig {
            distance: self
                .distance
                .ok_or(ConfigError::MissingParameter("distance"))?,
            slack: self.slack.unwrap_or(0.0),
            mode: self.mode.unwrap_or_default(),
            strategy: self.strategy.unwrap_or_default(),
            incremental_threshold: self
                .incremental_threshold
                .unwrap_or(DEFAULT_INCREMENTAL_THRESHOLD),
            partition: self.partition.unwrap_or_default(),
            max_pairs: self.max_pairs,
            periodic_box: self.periodic_box,
            verify: self.verify.unwrap_or_else(default_verify),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builder_fails_if_distance_is_missing() {
        let result = ProximityConfigBuilder::new().slack(1.0).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("distance")));
    }

    #[test]
    fn builder_applies_defaults_for_optional_parameters() {
        let config = ProximityConfigBuilder::new().distance(4.0).build().unwrap();
        assert_eq!(config.slack, 0.0);
        assert_eq!(config.mode, DistanceMode::SphereSurface);
        assert_eq!(config.strategy, FinderStrategy::Grid);
        assert_eq!(config.incremental_threshold, DEFAULT_INCREMENTAL_THRESHOLD);
        assert_eq!(config.partition, PartitionConfig::default());
        assert_eq!(config.max_pairs, None);
        assert_eq!(config.periodic_box, None);
        assert_eq!(config.envelope(), 4.0);
    }

    #[test]
    fn builder_rejects_negative_or_non_finite_cutoffs() {
        assert!(matches!(
            ProximityConfigBuilder::new().distance(-1.0).build(),
            Err(ConfigError::InvalidCutoff { name: "distance", .. })
        ));
        assert!(matches!(
            ProximityConfigBuilder::new().distance(1.0).slack(f64::NAN).build(),
            Err(ConfigError::InvalidCutoff { name: "slack", .. })
        ));
        assert!(matches!(
            ProximityConfigBuilder::new().distance(f64::INFINITY).build(),
            Err(ConfigError::InvalidCutoff { name: "distance", .. })
        ));
    }

    #[test]
    fn builder_rejects_degenerate_partition_tuning() {
        let partition = PartitionConfig {
            cell_scale: 0.0,
            ..PartitionConfig::default()
        };
        assert!(matches!(
            ProximityConfigBuilder::new().distance(1.0).partition(partition).build(),
            Err(ConfigError::InvalidPartition { name: "cell_scale", .. })
        ));
    }

    #[test]
    fn min_grid_size_setter_keeps_other_partition_defaults() {
        let config = ProximityConfigBuilder::new()
            .distance(2.0)
            .min_grid_size(5)
            .build()
            .unwrap();
        assert_eq!(config.partition.min_grid_size, 5);
        assert_eq!(config.partition.cell_scale, 1.6);
    }

    #[test]
    fn from_toml_str_parses_kebab_case_keys() {
        let content = r#"
            distance = 4.0
            slack = 1.0
            mode = "center"
            strategy = "quadratic"
            incremental-threshold = 50
            max-pairs = 100000
            verify = true

            [partition]
            min-grid-size = 8
        "#;
        let config = ProximityConfig::from_toml_str(content).unwrap();
        assert_eq!(config.distance, 4.0);
        assert_eq!(config.slack, 1.0);
        assert_eq!(config.mode, DistanceMode::Center);
        assert_eq!(config.strategy, FinderStrategy::Quadratic);
        assert_eq!(config.incremental_threshold, 50);
        assert_eq!(config.max_pairs, Some(100_000));
        assert!(config.verify);
        assert_eq!(config.partition.min_grid_size, 8);
        assert_eq!(config.partition.min_cell_size, 1.0);
    }

    #[test]
    fn from_toml_str_reads_a_periodic_box() {
        let config =
            ProximityConfig::from_toml_str("distance = 2.0\nperiodic-box = [10.0, 12.0, 14.0]").unwrap();
        let cell = config.periodic_box.unwrap();
        assert_eq!(cell.lengths().y, 12.0);

        let degenerate = ProximityConfig::from_toml_str("distance = 2.0\nperiodic-box = [10.0, 0.0, 14.0]");
        assert!(matches!(degenerate, Err(ConfigLoadError::Toml { .. })));
    }

    #[test]
    fn rigid_strategy_rejects_a_periodic_box() {
        let result = ProximityConfigBuilder::new()
            .distance(2.0)
            .strategy(FinderStrategy::Rigid)
            .periodic_box(PeriodicBox::cubic(10.0).unwrap())
            .build();
        assert!(matches!(result, Err(ConfigError::Unsupported(_))));

        let rigid = ProximityConfig::from_toml_str("distance = 2.0\nstrategy = \"rigid\"").unwrap();
        assert_eq!(rigid.strategy, FinderStrategy::Rigid);
    }

    #[test]
    fn from_toml_str_rejects_unknown_fields() {
        let result = ProximityConfig::from_toml_str("distance = 1.0\ncutoff = 2.0");
        assert!(matches!(result, Err(ConfigLoadError::Toml { .. })));
    }

    #[test]
    fn from_toml_str_validates_values() {
        let result = ProximityConfig::from_toml_str("distance = 1.0\nslack = -0.5");
        assert!(matches!(
            result,
            Err(ConfigLoadError::Invalid {
                source: ConfigError::InvalidCutoff { name: "slack", .. },
                ..
            })
        ));
    }

    #[test]
    fn load_reads_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proximity.toml");
        fs::write(&path, "distance = 6.0\nslack = 0.5\n").unwrap();

        let config = ProximityConfig::load(&path).unwrap();
        assert_eq!(config.distance, 6.0);
        assert_eq!(config.envelope(), 7.0);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let result = ProximityConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigLoadError::Io { .. })));
    }
}
