//! Galton Statistics Plugin
//!
//! Statistical kernels over `f64` samples: moments, outliers, density,
//! normality, variance homogeneity, group comparisons and mixed models.
//! Kernels return `Result<_, GaltonError>`; their plugin wrappers follow
//! the never-panic philosophy and return `Value::Error` on failure.

pub mod density;
pub mod distributions;
pub mod goodness;
pub mod helpers;
pub mod hypothesis;
pub mod levene;
pub mod mixed;
pub mod nonparametric;
pub mod outliers;
pub mod shape;

pub use helpers::TestResult;
pub use mixed::{fit_lmm, FixedEffect, Formula, MixedFit};

use galton_plugin::PluginRegistry;

/// Load statistics functions into registry
pub fn load_stats_library(registry: PluginRegistry) -> PluginRegistry {
    registry
        // Shape
        .with_function(shape::Skewness)
        .with_function(shape::Kurtosis)
        .with_function(shape::MomentsFn)

        // Outliers and density
        .with_function(outliers::OutliersIqr)
        .with_function(outliers::OutliersZscore)
        .with_function(density::KdePeaks)

        // Normality
        .with_function(goodness::ShapiroWilk)
        .with_function(goodness::Lilliefors)
        .with_function(goodness::JarqueBera)

        // Variance
        .with_function(levene::Levene)

        // Parametric tests
        .with_function(hypothesis::TTest1)
        .with_function(hypothesis::TTest2)
        .with_function(hypothesis::TTestPaired)
        .with_function(hypothesis::Anova)
        .with_function(hypothesis::WelchAnova)

        // Rank tests
        .with_function(nonparametric::MannWhitney)
        .with_function(nonparametric::Wilcoxon)
        .with_function(nonparametric::Wilcoxon1)
        .with_function(nonparametric::Kruskal)
}
