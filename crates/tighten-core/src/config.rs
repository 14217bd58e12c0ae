//! Analysis configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Ceiling on outer fixed-point passes before the run is declared divergent
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Order in which the solver replays queued scopes within a pass.
///
/// The converged result does not depend on it; only the number of passes does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorklistOrder {
    /// Scopes in the order they were first queued
    #[default]
    Discovery,
    /// Most recently queued scopes first
    Reverse,
}

impl FromStr for WorklistOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discovery" => Ok(WorklistOrder::Discovery),
            "reverse" => Ok(WorklistOrder::Reverse),
            other => Err(format!("unknown worklist order `{other}` (expected `discovery` or `reverse`)")),
        }
    }
}

/// Tuning knobs for one analysis run, loadable from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Ceiling on outer fixed-point passes
    pub max_iterations: usize,
    /// Replay order within a pass
    pub worklist_order: WorklistOrder,
    /// Cache declared-type intersections between allocation-set changes
    pub memoize_intersections: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            worklist_order: WorklistOrder::Discovery,
            memoize_intersections: true,
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override the pass ceiling
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the replay order
    pub fn with_order(mut self, order: WorklistOrder) -> Self {
        self.worklist_order = order;
        self
    }
}
