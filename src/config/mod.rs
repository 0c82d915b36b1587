//! Sweep configuration.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`GROUPCAST_*`)
//!
//! One config defines the full cartesian experiment sweep
//! (`group_limits × group_sizes × broadcast_freqs`) plus one baseline
//! experiment per frequency with a single population-wide group.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::sim::{Experiment, ExperimentId};

fn default_seed() -> u64 {
    42
}

fn default_workers() -> usize {
    7
}

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Candidate values for max groups per node.
    pub group_limits: Vec<u32>,

    /// Candidate values for max members per group.
    pub group_sizes: Vec<u32>,

    /// Candidate broadcast periods in seconds.
    pub broadcast_freqs: Vec<u64>,

    /// Population size; the baseline group spans this many nodes.
    pub node_count: u32,

    /// Simulation horizon in seconds.
    pub total_time: u64,

    /// Master seed; everything randomized derives from it.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Max experiments simulated concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_limits: vec![1, 2, 3],
            group_sizes: vec![2, 4, 8],
            broadcast_freqs: vec![600],
            node_count: 0,
            total_time: 48 * 3600,
            seed: default_seed(),
            workers: default_workers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| SimError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides to this config
    pub fn apply_env(mut self) -> Self {
        if let Ok(seed) = std::env::var("GROUPCAST_SEED") {
            if let Ok(seed) = seed.parse() {
                self.seed = seed;
            }
        }
        if let Ok(workers) = std::env::var("GROUPCAST_WORKERS") {
            if let Ok(workers) = workers.parse() {
                self.workers = workers;
            }
        }
        if let Ok(total_time) = std::env::var("GROUPCAST_TOTAL_TIME") {
            if let Ok(total_time) = total_time.parse() {
                self.total_time = total_time;
            }
        }
        self
    }

    /// Reject configs the sweep cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.group_limits.is_empty() || self.group_sizes.is_empty() {
            return Err(SimError::Config(
                "group_limits and group_sizes must be non-empty".to_string(),
            ));
        }
        if self.broadcast_freqs.is_empty() {
            return Err(SimError::Config(
                "broadcast_freqs must be non-empty".to_string(),
            ));
        }
        if self.group_limits.iter().any(|&l| l == 0) {
            return Err(SimError::Config("group_limits must be >= 1".to_string()));
        }
        if self.group_sizes.iter().any(|&s| s < 2) {
            return Err(SimError::Config(
                "group_sizes must be >= 2 (singleton groups are never formed)".to_string(),
            ));
        }
        if self.broadcast_freqs.iter().any(|&f| f == 0) {
            return Err(SimError::Config("broadcast_freqs must be >= 1".to_string()));
        }
        if self.node_count < 2 {
            return Err(SimError::Config("node_count must be >= 2".to_string()));
        }
        if self.total_time == 0 {
            return Err(SimError::Config("total_time must be >= 1".to_string()));
        }
        if self.workers == 0 {
            return Err(SimError::Config("workers must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Expand the sweep into its experiment set.
    ///
    /// Per frequency: one baseline experiment (`group_limit = 1`,
    /// `group_size_limit = node_count`) followed by the full
    /// `group_limits × group_sizes` cartesian product. Ids are
    /// sequential in that order.
    pub fn experiments(&self) -> Vec<Experiment> {
        let mut experiments: Vec<Experiment> = Vec::new();

        for &frequency in &self.broadcast_freqs {
            experiments.push(Experiment {
                id: ExperimentId::new(experiments.len() as u64),
                group_limit: 1,
                group_size_limit: self.node_count,
                broadcast_frequency: frequency,
                baseline: true,
            });
            for &group_limit in &self.group_limits {
                for &group_size in &self.group_sizes {
                    experiments.push(Experiment {
                        id: ExperimentId::new(experiments.len() as u64),
                        group_limit,
                        group_size_limit: group_size,
                        broadcast_frequency: frequency,
                        baseline: false,
                    });
                }
            }
        }
        experiments
    }
}
