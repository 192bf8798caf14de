//! Homogeneity of variance across groups

use crate::profiler::is_degenerate;
use galton_core::{GaltonError, Table};
use galton_plugin::AdvisorConfig;
use galton_stats::levene::{levene, Center};
use serde::Serialize;
use tracing::debug;

/// `None` in both fields means the check did not apply
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HomogeneityVerdict {
    pub levene_p: Option<f64>,
    pub is_homogeneous: Option<bool>,
}

impl HomogeneityVerdict {
    pub fn not_applicable() -> Self {
        Self::default()
    }

    /// Reading used by the selector: an inapplicable check counts as
    /// homogeneous
    pub fn assume_homogeneous(&self) -> bool {
        self.is_homogeneous.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VarianceAuditor {
    config: AdvisorConfig,
    center: Center,
}

impl VarianceAuditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AdvisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_center(mut self, center: Center) -> Self {
        self.center = center;
        self
    }

    /// Levene's test of `value_col` across the labels of `group_col`.
    ///
    /// Without a group column nothing is inspected and the verdict is
    /// [`HomogeneityVerdict::not_applicable`]. Once a group column is named,
    /// missing columns are errors, while fewer than two usable groups or no
    /// spread at all still yield the not-applicable verdict.
    pub fn check_homogeneity(
        &self,
        table: &Table,
        value_col: &str,
        group_col: Option<&str>,
    ) -> Result<HomogeneityVerdict, GaltonError> {
        let Some(group_col) = group_col else {
            return Ok(HomogeneityVerdict::not_applicable());
        };
        table.numeric(value_col)?;

        let groups: Vec<Vec<f64>> = table
            .partition(value_col, group_col)?
            .into_values()
            .filter(|g| !g.is_empty())
            .collect();
        if groups.len() < 2 {
            debug!(group_col, groups = groups.len(), "homogeneity check not applicable");
            return Ok(HomogeneityVerdict::not_applicable());
        }

        match levene(&groups, self.center) {
            Ok(result) => {
                debug!(group_col, levene_p = result.p_value, "homogeneity checked");
                Ok(HomogeneityVerdict {
                    levene_p: Some(result.p_value),
                    is_homogeneous: Some(result.p_value > self.config.alpha),
                })
            }
            Err(e) if is_degenerate(&e) => {
                debug!(group_col, reason = %e.message, "homogeneity check not applicable");
                Ok(HomogeneityVerdict::not_applicable())
            }
            Err(e) => Err(e),
        }
    }
}
