//! Running a recommended method against data
//!
//! The pipeline only depends on the [`Executor`] trait. [`StatsExecutor`]
//! is the built-in implementation backed by `galton-stats`.

use crate::selector::Method;
use galton_core::{GaltonError, Table};
use galton_stats::hypothesis::{anova_oneway, t_test_independent, t_test_one_sample, t_test_paired, welch_anova};
use galton_stats::nonparametric::{kruskal_wallis, mann_whitney_u, wilcoxon_one_sample, wilcoxon_paired};
use galton_stats::{fit_lmm, Formula, MixedFit, TestResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Fitted random-intercept model with its summary table
pub type MixedModelFit = MixedFit;

/// Column roles for a test run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSpec {
    pub value_col: String,
    pub group_col: Option<String>,
    pub subject_col: Option<String>,
    /// Null hypothesis location for one-sample procedures
    pub mu0: f64,
    /// Mixed-model formula; defaults to `value ~ group`
    pub formula: Option<String>,
}

impl TestSpec {
    pub fn new(value_col: impl Into<String>) -> Self {
        Self {
            value_col: value_col.into(),
            group_col: None,
            subject_col: None,
            mu0: 0.0,
            formula: None,
        }
    }

    pub fn with_group(mut self, group_col: impl Into<String>) -> Self {
        self.group_col = Some(group_col.into());
        self
    }

    pub fn with_subject(mut self, subject_col: impl Into<String>) -> Self {
        self.subject_col = Some(subject_col.into());
        self
    }

    pub fn with_mu0(mut self, mu0: f64) -> Self {
        self.mu0 = mu0;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Explicit formula, else `value ~ group`, else intercept only
    pub fn mixed_formula(&self) -> String {
        match (&self.formula, &self.group_col) {
            (Some(f), _) => f.clone(),
            (None, Some(g)) => format!("{} ~ {}", self.value_col, g),
            (None, None) => format!("{} ~ 1", self.value_col),
        }
    }

    fn require_group(&self, method: Method) -> Result<&str, GaltonError> {
        self.group_col.as_deref().ok_or_else(|| {
            GaltonError::invalid_argument(format!("{} needs a group column", method))
                .with_suggestion("Set group_col to the column that labels the groups")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub method: Method,
    pub statistic: f64,
    pub p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df: Option<f64>,
}

impl TestOutcome {
    fn from_result(method: Method, r: TestResult) -> Self {
        Self {
            method,
            statistic: r.statistic,
            p_value: r.p_value,
            df: r.df,
        }
    }
}

/// What running a method produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Execution {
    Test(TestOutcome),
    MixedModel(MixedModelFit),
}

impl Execution {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            Execution::Test(t) => Some(t.p_value),
            Execution::MixedModel(_) => None,
        }
    }

    pub fn converged(&self) -> Option<bool> {
        match self {
            Execution::Test(_) => None,
            Execution::MixedModel(m) => Some(m.converged),
        }
    }
}

pub trait Executor: Send + Sync {
    /// Run a simple test; mixed models go through [`Executor::fit_mixed`]
    fn run_test(&self, method: Method, table: &Table, spec: &TestSpec) -> Result<TestOutcome, GaltonError>;

    fn fit_mixed(&self, table: &Table, formula: &str, group_col: &str) -> Result<MixedModelFit, GaltonError>;

    /// Dispatch on the method family
    fn execute(&self, method: Method, table: &Table, spec: &TestSpec) -> Result<Execution, GaltonError> {
        if method.is_mixed_model() {
            let subject = spec.subject_col.as_deref().ok_or_else(|| {
                GaltonError::invalid_argument(format!("{} needs a subject column", method))
                    .with_suggestion("Set subject_col to the column identifying subjects or clusters")
            })?;
            self.fit_mixed(table, &spec.mixed_formula(), subject).map(Execution::MixedModel)
        } else {
            self.run_test(method, table, spec).map(Execution::Test)
        }
    }
}

/// Executor backed by the `galton-stats` kernels
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsExecutor;

impl StatsExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Exactly two groups in label order
fn two_groups(method: Method, groups: BTreeMap<String, Vec<f64>>) -> Result<(Vec<f64>, Vec<f64>), GaltonError> {
    if groups.len() != 2 {
        let labels: Vec<&str> = groups.keys().map(String::as_str).collect();
        return Err(GaltonError::invalid_argument(format!(
            "{} requires exactly 2 groups, got {} ({})",
            method,
            groups.len(),
            labels.join(", ")
        ))
        .with_suggestion("Filter the table to two groups or use a many-group method"));
    }
    let mut it = groups.into_values();
    match (it.next(), it.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(GaltonError::internal("two-group split lost a group")),
    }
}

/// Values per group label in row order, missing values kept as NaN so
/// that rows stay aligned for pairing
fn aligned_groups(table: &Table, value_col: &str, group_col: &str) -> Result<BTreeMap<String, Vec<f64>>, GaltonError> {
    let values = table.numeric(value_col)?;
    let labels = table.column(group_col)?.labels();
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (label, &x) in labels.into_iter().zip(values) {
        if let Some(label) = label {
            groups.entry(label).or_default().push(x);
        }
    }
    Ok(groups)
}

impl Executor for StatsExecutor {
    fn run_test(&self, method: Method, table: &Table, spec: &TestSpec) -> Result<TestOutcome, GaltonError> {
        debug!(%method, value_col = %spec.value_col, "running test");
        let value_col = spec.value_col.as_str();

        let result = match method {
            Method::OneSampleTTest | Method::OneSampleWilcoxon => {
                let x: Vec<f64> = table.numeric(value_col)?.iter().copied().filter(|v| v.is_finite()).collect();
                if method == Method::OneSampleTTest {
                    t_test_one_sample(&x, spec.mu0)?
                } else {
                    wilcoxon_one_sample(&x, spec.mu0)?
                }
            }
            Method::PairedTTest | Method::WilcoxonSignedRank => {
                let group_col = spec.require_group(method)?;
                let (a, b) = two_groups(method, aligned_groups(table, value_col, group_col)?)?;
                if a.len() != b.len() {
                    return Err(GaltonError::invalid_argument(format!(
                        "{} pairs rows by position and needs equal group sizes, got {} and {}",
                        method,
                        a.len(),
                        b.len()
                    )));
                }
                if method == Method::PairedTTest {
                    t_test_paired(&a, &b)?
                } else {
                    wilcoxon_paired(&a, &b)?
                }
            }
            Method::IndependentTTest | Method::WelchTTest | Method::MannWhitneyU => {
                let group_col = spec.require_group(method)?;
                let (a, b) = two_groups(method, table.partition(value_col, group_col)?)?;
                match method {
                    Method::IndependentTTest => t_test_independent(&a, &b, true)?,
                    Method::WelchTTest => t_test_independent(&a, &b, false)?,
                    _ => mann_whitney_u(&a, &b)?,
                }
            }
            Method::OneWayAnova | Method::WelchAnova | Method::KruskalWallis => {
                let group_col = spec.require_group(method)?;
                let groups: Vec<Vec<f64>> = table.partition(value_col, group_col)?.into_values().collect();
                match method {
                    Method::OneWayAnova => anova_oneway(&groups)?,
                    Method::WelchAnova => welch_anova(&groups)?.0,
                    _ => kruskal_wallis(&groups)?,
                }
            }
            Method::Lmm | Method::GlmmOrLmm => {
                return Err(GaltonError::invalid_argument(format!(
                    "{} is a model fit, not a test",
                    method
                ))
                .with_suggestion("Use fit_mixed with a formula and subject column"))
            }
        };

        Ok(TestOutcome::from_result(method, result))
    }

    fn fit_mixed(&self, table: &Table, formula: &str, group_col: &str) -> Result<MixedModelFit, GaltonError> {
        let formula = Formula::parse(formula)?;
        debug!(%formula, group_col, "fitting mixed model");
        fit_lmm(table, &formula, group_col)
    }
}
