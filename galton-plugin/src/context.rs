//! Evaluation context and engine configuration

use crate::PluginRegistry;
use galton_core::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunable thresholds shared by the profiler, auditor and plugins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Significance level for the normality and homogeneity verdicts
    pub alpha: f64,
    /// Default IQR fence multiplier
    pub iqr_threshold: f64,
    /// Grid size for density evaluation
    pub kde_grid_points: usize,
    /// Sample size at which Shapiro-Wilk gets a sensitivity warning
    pub large_sample_warning: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            iqr_threshold: 1.5,
            kde_grid_points: 1000,
            large_sample_warning: 5000,
        }
    }
}

impl AdvisorConfig {
    /// Defaults overridden by `GALTON_ALPHA` when it parses to a value in (0, 1)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(alpha) = std::env::var("GALTON_ALPHA")
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|a| *a > 0.0 && *a < 1.0)
        {
            config.alpha = alpha;
        }
        config
    }
}

/// Evaluation context passed to plugins
pub struct EvalContext {
    pub config: AdvisorConfig,
    pub registry: Arc<PluginRegistry>,
}

impl EvalContext {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            config: AdvisorConfig::default(),
            registry,
        }
    }

    pub fn with_config(mut self, config: AdvisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Call another registered function by name
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        self.registry.call_function(name, args, self)
    }
}
