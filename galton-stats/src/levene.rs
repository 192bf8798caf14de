//! Levene's test for equality of variances

use crate::distributions::f_sf;
use crate::helpers::{extract_groups, mean, median, TestResult};
use galton_plugin::prelude::*;

/// Location each group's absolute deviations are taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Center {
    /// Brown-Forsythe variant, robust to non-normal data
    #[default]
    Median,
    Mean,
}

impl Center {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "median" => Some(Center::Median),
            "mean" => Some(Center::Mean),
            _ => None,
        }
    }
}

/// Levene W statistic with an F(k - 1, N - k) p-value. Needs at least two
/// groups, each with at least one value, and N > k.
pub fn levene<G: AsRef<[f64]>>(groups: &[G], center: Center) -> Result<TestResult, GaltonError> {
    let k = groups.len();
    if k < 2 {
        return Err(GaltonError::invalid_argument(format!(
            "levene() requires at least 2 groups, got {}",
            k
        )));
    }
    if groups.iter().any(|g| g.as_ref().is_empty()) {
        return Err(GaltonError::degenerate_sample("levene() requires every group to be non-empty"));
    }

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let g = g.as_ref();
            let c = match center {
                Center::Median => median(g),
                Center::Mean => mean(g),
            };
            g.iter().map(|x| (x - c).abs()).collect()
        })
        .collect();

    let total: usize = deviations.iter().map(Vec::len).sum();
    if total <= k {
        return Err(GaltonError::degenerate_sample(format!(
            "levene() requires more observations ({}) than groups ({})",
            total, k
        )));
    }

    let group_means: Vec<f64> = deviations.iter().map(|z| mean(z)).collect();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / total as f64;

    let between: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.len() as f64 * (zm - grand_mean).powi(2))
        .sum();
    let within: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.iter().map(|v| (v - zm).powi(2)).sum::<f64>())
        .sum();

    if within <= 0.0 {
        return Err(GaltonError::degenerate_sample(
            "levene() undefined when every group has zero spread about its center",
        ));
    }

    let df1 = (k - 1) as f64;
    let df2 = (total - k) as f64;
    let w = (df2 / df1) * between / within;
    Ok(TestResult::new(w, f_sf(w, df1, df2)))
}

// ============ Levene ============

pub struct Levene;

static LEVENE_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("groups", "List...", "Two or more lists of values"),
    ArgMeta::optional("center", "Text", "\"median\" or \"mean\" (last argument)", "median"),
];
static LEVENE_EXAMPLES: [&str; 2] = [
    "levene([1,2,3,4], [2,4,6,8]) → {statistic, p_value}",
    "levene(a, b, c, \"mean\") → classic Levene",
];
static LEVENE_RELATED: [&str; 2] = ["anova", "welch_anova"];

impl FunctionPlugin for Levene {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "levene",
            description: "Levene test for equal variances across groups",
            usage: "levene(group1, group2, ..., center?)",
            args: &LEVENE_ARGS,
            returns: "Object",
            examples: &LEVENE_EXAMPLES,
            category: "stats/variance",
            related: &LEVENE_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let (args, center) = match args.last() {
            Some(Value::Text(s)) => match Center::parse(s) {
                Some(c) => (&args[..args.len() - 1], c),
                None => {
                    return Value::Error(
                        GaltonError::invalid_argument(format!("Unknown center '{}'", s))
                            .with_suggestion("Use \"median\" or \"mean\""),
                    )
                }
            },
            _ => (args, Center::Median),
        };
        let groups = match extract_groups(args, "levene") {
            Ok(g) => g,
            Err(e) => return Value::Error(e),
        };
        match levene(&groups, center) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e.in_function("levene")),
        }
    }
}
