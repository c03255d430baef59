//! Simulation configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{ExecutionMode, ParallelConfig};
use crate::error::{LifeError, Result};
use crate::spawn::Pattern;

/// What happens when the requested work-group exceeds the device limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityPolicy {
    /// Setup fails.
    #[default]
    Abort,
    /// Setup continues with the sequential engine only.
    FallbackToSequential,
}

/// Source of the starting population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum PopulationConfig {
    Random { density: f32 },
    Pattern(Pattern),
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self::Random { density: 0.25 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: usize,
    pub height: usize,
    /// Rule string (`"2,3/3"`) or preset name (`"highlife"`).
    pub rule: String,
    pub population: PopulationConfig,
    /// Fixed spawn seed; `None` derives one from the clock once per process.
    pub seed: Option<u64>,
    pub mode: ExecutionMode,
    /// Build the parallel engine at setup.
    pub enable_parallel: bool,
    pub capability_policy: CapabilityPolicy,
    pub parallel: ParallelConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            rule: "2,3/3".to_owned(),
            population: PopulationConfig::default(),
            seed: None,
            mode: ExecutionMode::Sequential,
            enable_parallel: true,
            capability_policy: CapabilityPolicy::Abort,
            parallel: ParallelConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            LifeError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| LifeError::InvalidConfig(err.to_string()))
    }

    pub fn size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    pub fn density(mut self, density: f32) -> Self {
        self.population = PopulationConfig::Random { density };
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.population = PopulationConfig::Pattern(pattern);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sequential_only(mut self) -> Self {
        self.enable_parallel = false;
        self.mode = ExecutionMode::Sequential;
        self
    }

    pub fn capability_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.capability_policy = policy;
        self
    }

    pub fn parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{CapabilityPolicy, PopulationConfig, SimConfig};
    use crate::engine::{ExecutionMode, ReadMode};

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = SimConfig::from_json_str(
            r#"{
                "width": 64,
                "height": 48,
                "rule": "highlife",
                "population": { "kind": "random", "density": 0.3 },
                "seed": 7,
                "mode": "parallel",
                "capability_policy": "fallback-to-sequential",
                "parallel": { "work_group": [8, 8], "read_mode": "deferred" }
            }"#,
        )
        .unwrap();
        assert_eq!((config.width, config.height), (64, 48));
        assert_eq!(config.population, PopulationConfig::Random { density: 0.3 });
        assert_eq!(config.mode, ExecutionMode::Parallel);
        assert_eq!(config.capability_policy, CapabilityPolicy::FallbackToSequential);
        assert_eq!(config.parallel.work_group, [8, 8]);
        assert_eq!(config.parallel.read_mode, ReadMode::Deferred);
        assert_eq!(config.parallel.generations_per_copy, 1);
        assert!(config.enable_parallel);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(SimConfig::from_json_str("{ width: }").is_err());
    }
}
