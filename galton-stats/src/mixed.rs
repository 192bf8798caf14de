//! Linear mixed model with a random intercept per group, fitted by REML
//!
//! The model is `y = Xβ + b[group] + ε` with `b ~ N(0, σ²_b)` and
//! `ε ~ N(0, σ²)`. For a fixed variance ratio `λ = σ²_b / σ²` the fixed
//! effects and residual variance have closed forms, so the restricted
//! likelihood is profiled over `λ` alone and maximised by a grid scan
//! followed by golden-section refinement in `ln λ`.

use crate::distributions::normal_sf;
use galton_core::{Column, GaltonError, Table, Value};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;
use std::fmt::Write;

const LN_LAMBDA_MIN: f64 = -15.0;
const LN_LAMBDA_MAX: f64 = 15.0;
const GRID_STEP: f64 = 0.5;
const TOLERANCE: f64 = 1e-8;
const MAX_ITER: usize = 200;

// ============ Formula ============

/// Right-hand side term of a model formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Numeric columns enter as-is, text columns are treatment coded
    Column(String),
    /// `C(name)`: always treatment coded
    Categorical(String),
}

impl Term {
    pub fn name(&self) -> &str {
        match self {
            Term::Column(n) | Term::Categorical(n) => n,
        }
    }
}

/// `response ~ term + term + ...` with an implicit intercept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub response: String,
    pub terms: Vec<Term>,
}

impl Formula {
    pub fn parse(s: &str) -> Result<Self, GaltonError> {
        let (lhs, rhs) = s
            .split_once('~')
            .ok_or_else(|| formula_error(s, "expected 'response ~ terms'"))?;
        let response = lhs.trim();
        if response.is_empty() || rhs.contains('~') {
            return Err(formula_error(s, "expected exactly one response before '~'"));
        }
        if rhs.contains('-') || rhs.split('+').any(|t| t.trim() == "0") {
            return Err(formula_error(s, "removing the intercept is not supported"));
        }

        let mut terms = Vec::new();
        for raw in rhs.split('+') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(formula_error(s, "empty term"));
            }
            if raw == "1" {
                continue;
            }
            let term = match raw.strip_prefix("C(").and_then(|t| t.strip_suffix(')')) {
                Some(inner) => Term::Categorical(inner.trim().to_string()),
                None => Term::Column(raw.to_string()),
            };
            if !terms.contains(&term) {
                terms.push(term);
            }
        }

        Ok(Self {
            response: response.to_string(),
            terms,
        })
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rhs: Vec<String> = self
            .terms
            .iter()
            .map(|t| match t {
                Term::Column(n) => n.clone(),
                Term::Categorical(n) => format!("C({})", n),
            })
            .collect();
        if rhs.is_empty() {
            write!(f, "{} ~ 1", self.response)
        } else {
            write!(f, "{} ~ {}", self.response, rhs.join(" + "))
        }
    }
}

fn formula_error(formula: &str, details: &str) -> GaltonError {
    GaltonError::invalid_argument(format!("Invalid formula '{}': {}", formula, details))
        .with_suggestion("Write formulas like 'Value ~ Condition' or 'y ~ x + C(site)'")
}

// ============ Results ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedEffect {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixedFit {
    pub formula: String,
    pub group: String,
    pub converged: bool,
    pub iterations: usize,
    pub fixed_effects: Vec<FixedEffect>,
    pub group_variance: f64,
    pub residual_variance: f64,
    pub log_likelihood: f64,
    pub n_groups: usize,
    pub n_obs: usize,
}

impl MixedFit {
    pub fn effect(&self, name: &str) -> Option<&FixedEffect> {
        self.fixed_effects.iter().find(|e| e.name == name)
    }

    /// Plain-text regression table
    pub fn summary(&self) -> String {
        let rule_wide = "=".repeat(64);
        let rule = "-".repeat(64);
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "{:^64}", "Mixed Linear Model Regression Results");
        let _ = writeln!(out, "{}", rule_wide);
        let _ = writeln!(out, "{:<18}{:<14}{:<20}{}", "Model:", "MixedLM", "Dependent Variable:", self.response());
        let _ = writeln!(out, "{:<18}{:<14}{:<20}{}", "No. Observations:", self.n_obs, "Method:", "REML");
        let _ = writeln!(out, "{:<18}{:<14}{:<20}{:.4}", "No. Groups:", self.n_groups, "Scale:", self.residual_variance);
        let _ = writeln!(
            out,
            "{:<18}{:<14.4}{:<20}{}",
            "Log-Likelihood:",
            self.log_likelihood,
            "Converged:",
            if self.converged { "Yes" } else { "No" }
        );
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "{:<22}{:>10}{:>10}{:>10}{:>10}", "", "Coef.", "Std.Err.", "z", "P>|z|");
        let _ = writeln!(out, "{}", rule);
        for e in &self.fixed_effects {
            let _ = writeln!(
                out,
                "{:<22}{:>10.3}{:>10.3}{:>10.3}{:>10.3}",
                e.name, e.estimate, e.std_error, e.z, e.p_value
            );
        }
        let _ = writeln!(out, "{:<22}{:>10.3}", format!("{} Var", self.group), self.group_variance);
        let _ = write!(out, "{}", rule_wide);
        out
    }

    fn response(&self) -> &str {
        self.formula.split('~').next().unwrap_or("").trim()
    }

    pub fn to_value(&self) -> Value {
        let effects = self
            .fixed_effects
            .iter()
            .map(|e| {
                Value::object([
                    ("name", Value::from(e.name.as_str())),
                    ("estimate", Value::Number(e.estimate)),
                    ("std_error", Value::Number(e.std_error)),
                    ("z", Value::Number(e.z)),
                    ("p_value", Value::Number(e.p_value)),
                ])
            })
            .collect();
        Value::object([
            ("formula", Value::from(self.formula.as_str())),
            ("group", Value::from(self.group.as_str())),
            ("converged", Value::Bool(self.converged)),
            ("iterations", Value::from(self.iterations)),
            ("fixed_effects", Value::List(effects)),
            ("group_variance", Value::Number(self.group_variance)),
            ("residual_variance", Value::Number(self.residual_variance)),
            ("log_likelihood", Value::Number(self.log_likelihood)),
            ("n_groups", Value::from(self.n_groups)),
            ("n_obs", Value::from(self.n_obs)),
            ("summary", Value::Text(self.summary())),
        ])
    }
}

// ============ Design ============

/// Dense design: one row of X per observation, with its group index
struct Design {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
    y: Vec<f64>,
    group_of: Vec<usize>,
    n_groups: usize,
}

enum TermData<'a> {
    Numeric(&'a [f64]),
    Labels(Vec<Option<String>>),
}

impl TermData<'_> {
    fn present(&self, row: usize) -> bool {
        match self {
            TermData::Numeric(v) => v[row].is_finite(),
            TermData::Labels(l) => l[row].is_some(),
        }
    }
}

fn build_design(table: &Table, formula: &Formula, group_col: &str) -> Result<Design, GaltonError> {
    let response = table.numeric(&formula.response)?;
    let groups = table.column(group_col)?.labels();

    let mut term_data = Vec::with_capacity(formula.terms.len());
    for term in &formula.terms {
        let data = match (term, table.column(term.name())?) {
            (Term::Column(_), Column::Numeric(v)) => TermData::Numeric(v),
            (_, col) => TermData::Labels(col.labels()),
        };
        term_data.push(data);
    }

    let complete: Vec<usize> = (0..table.n_rows())
        .filter(|&r| response[r].is_finite() && groups[r].is_some() && term_data.iter().all(|t| t.present(r)))
        .collect();

    let mut names = vec!["Intercept".to_string()];
    // Per term: None for numeric, Some(levels after the reference) for categorical
    let mut codings: Vec<Option<Vec<String>>> = Vec::with_capacity(term_data.len());
    for (term, data) in formula.terms.iter().zip(&term_data) {
        match data {
            TermData::Numeric(_) => {
                names.push(term.name().to_string());
                codings.push(None);
            }
            TermData::Labels(labels) => {
                let levels: BTreeSet<&str> = complete.iter().filter_map(|&r| labels[r].as_deref()).collect();
                let coded: Vec<String> = levels.into_iter().skip(1).map(str::to_string).collect();
                for level in &coded {
                    names.push(format!("{}[T.{}]", term.name(), level));
                }
                codings.push(Some(coded));
            }
        }
    }

    let mut group_index: BTreeMap<&str, usize> = BTreeMap::new();
    for &r in &complete {
        if let Some(g) = groups[r].as_deref() {
            let next = group_index.len();
            group_index.entry(g).or_insert(next);
        }
    }

    let mut rows = Vec::with_capacity(complete.len());
    let mut y = Vec::with_capacity(complete.len());
    let mut group_of = Vec::with_capacity(complete.len());
    for &r in &complete {
        let mut row = Vec::with_capacity(names.len());
        row.push(1.0);
        for (data, coding) in term_data.iter().zip(&codings) {
            match (data, coding) {
                (TermData::Numeric(v), _) => row.push(v[r]),
                (TermData::Labels(labels), Some(levels)) => {
                    let label = labels[r].as_deref();
                    row.extend(levels.iter().map(|l| if Some(l.as_str()) == label { 1.0 } else { 0.0 }));
                }
                (TermData::Labels(_), None) => {}
            }
        }
        rows.push(row);
        y.push(response[r]);
        let g = groups[r].as_deref().and_then(|g| group_index.get(g)).copied();
        group_of.push(g.unwrap_or(0));
    }

    Ok(Design {
        names,
        rows,
        y,
        group_of,
        n_groups: group_index.len(),
    })
}

// ============ Fitting ============

/// Per-group sufficient statistics
struct GroupStats {
    n: f64,
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    sx: DVector<f64>,
    sy: f64,
    yty: f64,
}

struct Profile {
    log_likelihood: f64,
    beta: DVector<f64>,
    sigma2: f64,
    covariance: DMatrix<f64>,
}

struct Reml {
    stats: Vec<GroupStats>,
    n_obs: usize,
    p: usize,
}

impl Reml {
    fn new(design: &Design) -> Self {
        let p = design.names.len();
        let mut stats: Vec<GroupStats> = (0..design.n_groups)
            .map(|_| GroupStats {
                n: 0.0,
                xtx: DMatrix::zeros(p, p),
                xty: DVector::zeros(p),
                sx: DVector::zeros(p),
                sy: 0.0,
                yty: 0.0,
            })
            .collect();

        for ((row, &y), &g) in design.rows.iter().zip(&design.y).zip(&design.group_of) {
            let s = &mut stats[g];
            let x = DVector::from_column_slice(row);
            s.n += 1.0;
            s.xtx += &x * x.transpose();
            s.xty += &x * y;
            s.sx += &x;
            s.sy += y;
            s.yty += y * y;
        }

        Self {
            stats,
            n_obs: design.y.len(),
            p,
        }
    }

    /// Profiled restricted log-likelihood at variance ratio `lambda`
    fn profile(&self, lambda: f64) -> Option<Profile> {
        let p = self.p;
        let mut a = DMatrix::<f64>::zeros(p, p);
        let mut b = DVector::<f64>::zeros(p);
        let mut ywy = 0.0;
        let mut log_det_h = 0.0;
        for s in &self.stats {
            let c = lambda / (1.0 + s.n * lambda);
            a += &s.xtx - &s.sx * s.sx.transpose() * c;
            b += &s.xty - &s.sx * (c * s.sy);
            ywy += s.yty - c * s.sy * s.sy;
            log_det_h += (1.0 + s.n * lambda).ln();
        }

        let chol = a.cholesky()?;
        let beta = chol.solve(&b);
        let rss = ywy - b.dot(&beta);
        let df = (self.n_obs - p) as f64;
        if rss.is_nan() || rss <= 0.0 {
            return None;
        }
        let sigma2 = rss / df;
        let log_det_a: f64 = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let log_likelihood = -0.5 * (df * (1.0 + (2.0 * PI * sigma2).ln()) + log_det_h + log_det_a);
        let covariance = chol.inverse() * sigma2;

        Some(Profile {
            log_likelihood,
            beta,
            sigma2,
            covariance,
        })
    }

    fn objective(&self, ln_lambda: f64) -> f64 {
        self.profile(ln_lambda.exp())
            .map(|p| p.log_likelihood)
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// Returns (lambda, iterations, converged)
    fn maximise(&self) -> (f64, usize, bool) {
        let steps = ((LN_LAMBDA_MAX - LN_LAMBDA_MIN) / GRID_STEP).round() as usize;
        let grid: Vec<f64> = (0..=steps).map(|i| LN_LAMBDA_MIN + GRID_STEP * i as f64).collect();
        let values: Vec<f64> = grid.iter().map(|&t| self.objective(t)).collect();
        let mut iterations = grid.len();

        let best = values
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > values[best] { i } else { best });

        let at_zero = self.profile(0.0).map(|p| p.log_likelihood).unwrap_or(f64::NEG_INFINITY);
        if at_zero >= values[best] {
            // Maximum on the boundary: no between-group variance
            return (0.0, iterations, at_zero.is_finite());
        }
        if !values[best].is_finite() {
            return (f64::NAN, iterations, false);
        }

        let golden = (5f64.sqrt() - 1.0) / 2.0;
        let mut lo = grid[best.saturating_sub(1)];
        let mut hi = grid[(best + 1).min(grid.len() - 1)];
        let mut x1 = hi - golden * (hi - lo);
        let mut x2 = lo + golden * (hi - lo);
        let mut f1 = self.objective(x1);
        let mut f2 = self.objective(x2);
        let mut converged = false;
        for _ in 0..MAX_ITER {
            iterations += 1;
            if hi - lo < TOLERANCE {
                converged = true;
                break;
            }
            if f1 > f2 {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - golden * (hi - lo);
                f1 = self.objective(x1);
            } else {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + golden * (hi - lo);
                f2 = self.objective(x2);
            }
        }

        // A maximum pinned to the top of the grid has not been bracketed
        if best == grid.len() - 1 {
            converged = false;
        }
        (((lo + hi) / 2.0).exp(), iterations, converged)
    }
}

/// Fit `formula` with a random intercept for each level of `group_col`
pub fn fit_lmm(table: &Table, formula: &Formula, group_col: &str) -> Result<MixedFit, GaltonError> {
    let design = build_design(table, formula, group_col)?;
    let p = design.names.len();
    if design.n_groups < 2 {
        return Err(GaltonError::degenerate_sample(format!(
            "A mixed model needs at least 2 groups in '{}', got {}",
            group_col, design.n_groups
        ))
        .in_column(group_col));
    }
    if design.y.len() <= p {
        return Err(GaltonError::degenerate_sample(format!(
            "A mixed model with {} fixed effects needs more than {} complete rows, got {}",
            p,
            p,
            design.y.len()
        )));
    }

    let reml = Reml::new(&design);
    let (lambda, iterations, converged) = reml.maximise();
    let profile = reml.profile(lambda).ok_or_else(|| {
        GaltonError::invalid_argument("The fixed-effects design matrix is singular")
            .with_suggestion("Check for constant or duplicated predictors")
    })?;

    let fixed_effects = design
        .names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let estimate = profile.beta[j];
            let std_error = profile.covariance[(j, j)].sqrt();
            let z = estimate / std_error;
            FixedEffect {
                name: name.clone(),
                estimate,
                std_error,
                z,
                p_value: (2.0 * normal_sf(z.abs())).min(1.0),
            }
        })
        .collect();

    Ok(MixedFit {
        formula: formula.to_string(),
        group: group_col.to_string(),
        converged,
        iterations,
        fixed_effects,
        group_variance: lambda * profile.sigma2,
        residual_variance: profile.sigma2,
        log_likelihood: profile.log_likelihood,
        n_groups: design.n_groups,
        n_obs: design.y.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10 subjects x 6 trials, alternating conditions A/B, effect of B = 3
    fn repeated_measures() -> Table {
        let mut value = Vec::new();
        let mut condition = Vec::new();
        let mut subject = Vec::new();
        for s in 0..10 {
            let offset = (s as f64 - 4.5) * 2.0;
            for t in 0..6 {
                let b = t % 2 == 1;
                let noise = ((s * 7 + t * 3) % 5) as f64 * 0.2 - 0.4;
                value.push(10.0 + offset + if b { 3.0 } else { 0.0 } + noise);
                condition.push(if b { "B" } else { "A" });
                subject.push(format!("S{:02}", s));
            }
        }
        Table::new()
            .with_numeric("Value", value)
            .and_then(|t| t.with_categorical("Condition", condition))
            .and_then(|t| t.with_categorical("Subject", subject))
            .unwrap()
    }

    #[test]
    fn test_formula_parse() {
        let f = Formula::parse("Value ~ Condition + C(Dose) + 1").unwrap();
        assert_eq!(f.response, "Value");
        assert_eq!(
            f.terms,
            vec![Term::Column("Condition".into()), Term::Categorical("Dose".into())]
        );
        assert_eq!(f.to_string(), "Value ~ Condition + C(Dose)");
        assert_eq!(Formula::parse("y ~ 1").unwrap().to_string(), "y ~ 1");
    }

    #[test]
    fn test_formula_errors() {
        assert!(Formula::parse("Value").is_err());
        assert!(Formula::parse(" ~ x").is_err());
        assert!(Formula::parse("y ~ x - 1").is_err());
        assert!(Formula::parse("y ~ x + ").is_err());
    }

    #[test]
    fn test_random_intercept_recovers_effects() {
        let table = repeated_measures();
        let formula = Formula::parse("Value ~ Condition").unwrap();
        let fit = fit_lmm(&table, &formula, "Subject").unwrap();

        assert!(fit.converged);
        assert_eq!(fit.n_groups, 10);
        assert_eq!(fit.n_obs, 60);
        let effect = fit.effect("Condition[T.B]").unwrap();
        assert!((effect.estimate - 3.0).abs() < 1e-6, "estimate {}", effect.estimate);
        assert!(effect.p_value < 1e-6);
        let intercept = fit.effect("Intercept").unwrap();
        assert!((intercept.estimate - 10.0).abs() < 1e-6);
        // Subject offsets have sample variance 4 * var(0..10) = 36.67
        assert!((fit.group_variance - 36.8).abs() < 0.5, "group var {}", fit.group_variance);
        assert!(fit.residual_variance < 0.2);
    }

    #[test]
    fn test_no_group_effect_hits_boundary() {
        // Identical subjects: the between-group variance is zero
        let mut value = Vec::new();
        let mut subject = Vec::new();
        for s in 0..5 {
            for t in 0..4 {
                value.push(t as f64);
                subject.push(format!("S{}", s));
            }
        }
        let table = Table::new()
            .with_numeric("y", value)
            .and_then(|t| t.with_categorical("id", subject))
            .unwrap();
        let fit = fit_lmm(&table, &Formula::parse("y ~ 1").unwrap(), "id").unwrap();
        assert!(fit.converged);
        assert!(fit.group_variance < 1e-6);
        assert!((fit.fixed_effects[0].estimate - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_rows_are_dropped() {
        let table = Table::new()
            .with_numeric("y", vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 6.5, 7.0])
            .and_then(|t| t.with_categorical("g", ["a", "a", "a", "b", "b", "c", "c"]))
            .unwrap();
        let fit = fit_lmm(&table, &Formula::parse("y ~ 1").unwrap(), "g").unwrap();
        assert_eq!(fit.n_obs, 6);
        assert_eq!(fit.n_groups, 3);
    }

    #[test]
    fn test_single_group_is_degenerate() {
        let table = Table::new()
            .with_numeric("y", vec![1.0, 2.0, 3.0])
            .and_then(|t| t.with_categorical("g", ["a", "a", "a"]))
            .unwrap();
        let err = fit_lmm(&table, &Formula::parse("y ~ 1").unwrap(), "g").unwrap_err();
        assert!(err.is(galton_core::codes::DEGENERATE_SAMPLE));
    }

    #[test]
    fn test_unknown_column() {
        let table = repeated_measures();
        let err = fit_lmm(&table, &Formula::parse("Value ~ Dose").unwrap(), "Subject").unwrap_err();
        assert!(err.is(galton_core::codes::UNDEFINED_COLUMN));
    }

    #[test]
    fn test_summary_mentions_effects() {
        let table = repeated_measures();
        let fit = fit_lmm(&table, &Formula::parse("Value ~ Condition").unwrap(), "Subject").unwrap();
        let summary = fit.summary();
        assert!(summary.contains("Mixed Linear Model Regression Results"));
        assert!(summary.contains("Condition[T.B]"));
        assert!(summary.contains("Subject Var"));
        assert!(summary.contains("Converged:          Yes"));
        assert_eq!(fit.to_value().get("n_groups").as_number(), Some(10.0));
    }
}
