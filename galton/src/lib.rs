//! Galton - exploratory diagnosis and statistical test selection
//!
//! The pipeline is linear: profile the value column, audit variance across
//! groups when there are groups, pick a test family from the verdicts and
//! the design, then hand the pick to an [`Executor`].

pub mod auditor;
pub mod execute;
pub mod plugins;
pub mod profiler;
pub mod selector;
pub mod visual;

pub use auditor::{HomogeneityVerdict, VarianceAuditor};
pub use execute::{Execution, Executor, MixedModelFit, StatsExecutor, TestOutcome, TestSpec};
pub use plugins::{load_advisor_library, standard_registry};
pub use profiler::{
    Description, DistributionProfiler, KurtosisLabel, Modality, NormalityVerdict, OutlierMethod, OutlierSet,
    Profile, SkewLabel,
};
pub use selector::{Design, Method, Recommendation, TestSelector};
pub use visual::{FigureHandle, Visualizer};

use galton_core::{Diagnostic, GaltonError, Table, Value};
use galton_plugin::{AdvisorConfig, EvalContext, PluginRegistry};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of diagnosing one value column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub profile: Profile,
    pub homogeneity: HomogeneityVerdict,
    pub group_count: usize,
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<FigureHandle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// A diagnosis together with the result of running its recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub report: Report,
    pub execution: Execution,
}

/// Main Galton engine
pub struct Galton {
    registry: Arc<PluginRegistry>,
    config: AdvisorConfig,
    executor: Arc<dyn Executor>,
    visualizer: Option<Arc<dyn Visualizer>>,
}

impl Galton {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: AdvisorConfig::default(),
            executor: Arc::new(StatsExecutor),
            visualizer: None,
        }
    }

    pub fn with_standard_library() -> Self {
        Self::new(standard_registry())
    }

    /// Engine sharing a plugin call's registry and configuration
    pub fn from_context(ctx: &EvalContext) -> Self {
        Self {
            registry: ctx.registry.clone(),
            config: ctx.config.clone(),
            executor: Arc::new(StatsExecutor),
            visualizer: None,
        }
    }

    pub fn with_config(mut self, config: AdvisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn with_visualizer(mut self, visualizer: impl Visualizer + 'static) -> Self {
        self.visualizer = Some(Arc::new(visualizer));
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn profiler(&self, name: &str, values: &[f64]) -> DistributionProfiler {
        DistributionProfiler::from_slice(name, values).with_config(self.config.clone())
    }

    pub fn auditor(&self) -> VarianceAuditor {
        VarianceAuditor::new().with_config(self.config.clone())
    }

    /// Profile `spec.value_col`, audit variance across `spec.group_col` and
    /// recommend a method. A subject column makes the design hierarchical.
    pub fn diagnose(&self, table: &Table, spec: &TestSpec, paired: bool) -> Result<Report, GaltonError> {
        let values = table.numeric(&spec.value_col)?;
        if let Some(subject) = spec.subject_col.as_deref() {
            table.column(subject)?;
        }
        let group_count = match spec.group_col.as_deref() {
            Some(g) => table.distinct(g)?.len(),
            None => 1,
        };

        let profiler = self.profiler(&spec.value_col, values);
        let profile = profiler.profile()?;
        let homogeneity = self
            .auditor()
            .check_homogeneity(table, &spec.value_col, spec.group_col.as_deref())?;
        let recommendation = TestSelector::new().recommend(
            profile.normality.is_normal,
            homogeneity.is_homogeneous,
            spec.subject_col.is_some(),
            paired,
            group_count,
        );
        info!(
            value_col = %spec.value_col,
            method = %recommendation.method,
            is_normal = profile.normality.is_normal,
            group_count,
            "diagnosis complete"
        );

        let mut diagnostics = profile.normality.diagnostics.clone();
        let figure = match &self.visualizer {
            Some(vis) => {
                let (figure, failure) = visual::render_or_warn(vis.as_ref(), profiler.sample(), &spec.value_col);
                diagnostics.extend(failure);
                figure
            }
            None => None,
        };

        Ok(Report {
            profile,
            homogeneity,
            group_count,
            recommendation,
            figure,
            diagnostics,
        })
    }

    /// Run `method` through the configured executor
    pub fn execute(&self, method: Method, table: &Table, spec: &TestSpec) -> Result<Execution, GaltonError> {
        debug!(%method, "executing");
        self.executor.execute(method, table, spec)
    }

    /// Diagnose, then execute the recommended method
    pub fn analyze(&self, table: &Table, spec: &TestSpec, paired: bool) -> Result<Analysis, GaltonError> {
        let report = self.diagnose(table, spec, paired)?;
        let execution = self.execute(report.recommendation.method, table, spec)?;
        Ok(Analysis { report, execution })
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        let ctx = EvalContext::new(self.registry.clone()).with_config(self.config.clone());
        ctx.call(name, args)
    }

    pub fn help(&self, name: Option<&str>) -> Value {
        self.registry.help(name)
    }

    pub fn list_functions(&self, category: Option<&str>) -> Value {
        self.registry.list_functions(category)
    }
}

impl Default for Galton {
    fn default() -> Self {
        Self::with_standard_library()
    }
}
