//! Parametric hypothesis tests: t-tests, one-way ANOVA, Welch ANOVA

use crate::distributions::{f_sf, t_two_sided};
use crate::helpers::{extract_finite, extract_groups, extract_numbers, mean, optional_number, variance, TestResult};
use galton_plugin::prelude::*;

fn require_group_size(x: &[f64], min: usize, func: &str) -> Result<(), GaltonError> {
    if x.len() < min {
        return Err(GaltonError::degenerate_sample(format!(
            "{}() requires at least {} observations per group, got {}",
            func,
            min,
            x.len()
        )));
    }
    Ok(())
}

fn zero_variance(func: &str) -> GaltonError {
    GaltonError::degenerate_sample(format!("{}() undefined when the standard error is zero", func))
}

/// One-sample t-test of H0: mean = mu0
pub fn t_test_one_sample(x: &[f64], mu0: f64) -> Result<TestResult, GaltonError> {
    require_group_size(x, 2, "t_test_1")?;
    let n = x.len() as f64;
    let se = (variance(x, 1) / n).sqrt();
    if se == 0.0 {
        return Err(zero_variance("t_test_1"));
    }
    let t = (mean(x) - mu0) / se;
    let df = n - 1.0;
    Ok(TestResult::new(t, t_two_sided(t, df)).with_df(df))
}

/// Two-sample t-test. `equal_var` selects the pooled (Student) variance,
/// otherwise Welch-Satterthwaite degrees of freedom are used.
pub fn t_test_independent(x: &[f64], y: &[f64], equal_var: bool) -> Result<TestResult, GaltonError> {
    let func = if equal_var { "t_test_2" } else { "welch_t_test" };
    require_group_size(x, 2, func)?;
    require_group_size(y, 2, func)?;

    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let v1 = variance(x, 1);
    let v2 = variance(y, 1);
    let diff = mean(x) - mean(y);

    let (se, df) = if equal_var {
        let df = n1 + n2 - 2.0;
        let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df;
        ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), df)
    } else {
        let a = v1 / n1;
        let b = v2 / n2;
        let se2 = a + b;
        let df = se2 * se2 / (a * a / (n1 - 1.0) + b * b / (n2 - 1.0));
        (se2.sqrt(), df)
    };
    if se == 0.0 {
        return Err(zero_variance(func));
    }

    let t = diff / se;
    Ok(TestResult::new(t, t_two_sided(t, df)).with_df(df))
}

/// Paired t-test on x[i] - y[i]. Pairs with a missing side are dropped.
pub fn t_test_paired(x: &[f64], y: &[f64]) -> Result<TestResult, GaltonError> {
    if x.len() != y.len() {
        return Err(GaltonError::invalid_argument(format!(
            "t_test_paired() requires equal lengths, got {} and {}",
            x.len(),
            y.len()
        )));
    }
    let diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).filter(|d| d.is_finite()).collect();
    t_test_one_sample(&diffs, 0.0).map_err(|e| e.in_function("t_test_paired"))
}

fn require_groups<G: AsRef<[f64]>>(groups: &[G], min_size: usize, func: &str) -> Result<(), GaltonError> {
    if groups.len() < 2 {
        return Err(GaltonError::invalid_argument(format!(
            "{}() requires at least 2 groups, got {}",
            func,
            groups.len()
        )));
    }
    for g in groups {
        require_group_size(g.as_ref(), min_size, func)?;
    }
    Ok(())
}

/// Classic one-way ANOVA F-test
pub fn anova_oneway<G: AsRef<[f64]>>(groups: &[G]) -> Result<TestResult, GaltonError> {
    require_groups(groups, 1, "anova")?;
    let k = groups.len();
    let total: usize = groups.iter().map(|g| g.as_ref().len()).sum();
    if total <= k {
        return Err(GaltonError::degenerate_sample("anova() requires more observations than groups"));
    }

    let grand = groups.iter().flat_map(|g| g.as_ref()).sum::<f64>() / total as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in groups {
        let g = g.as_ref();
        let m = mean(g);
        ss_between += g.len() as f64 * (m - grand).powi(2);
        ss_within += g.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }
    if ss_within == 0.0 {
        return Err(GaltonError::degenerate_sample("anova() undefined when within-group variance is zero"));
    }

    let df1 = (k - 1) as f64;
    let df2 = (total - k) as f64;
    let f = (ss_between / df1) / (ss_within / df2);
    Ok(TestResult::new(f, f_sf(f, df1, df2)).with_df(df1))
}

/// Welch's heteroscedastic one-way ANOVA. `df` carries the numerator
/// degrees of freedom; the denominator is fractional.
pub fn welch_anova<G: AsRef<[f64]>>(groups: &[G]) -> Result<(TestResult, f64), GaltonError> {
    require_groups(groups, 2, "welch_anova")?;
    let k = groups.len() as f64;

    let mut weights = Vec::with_capacity(groups.len());
    let mut means = Vec::with_capacity(groups.len());
    let mut sizes = Vec::with_capacity(groups.len());
    for g in groups {
        let g = g.as_ref();
        let v = variance(g, 1);
        if v == 0.0 {
            return Err(GaltonError::degenerate_sample(
                "welch_anova() requires non-zero variance in every group",
            ));
        }
        let n = g.len() as f64;
        weights.push(n / v);
        means.push(mean(g));
        sizes.push(n);
    }

    let w_sum: f64 = weights.iter().sum();
    let weighted_mean = weights.iter().zip(&means).map(|(w, m)| w * m).sum::<f64>() / w_sum;
    let a = weights
        .iter()
        .zip(&means)
        .map(|(w, m)| w * (m - weighted_mean).powi(2))
        .sum::<f64>()
        / (k - 1.0);
    let lambda = weights
        .iter()
        .zip(&sizes)
        .map(|(w, n)| (1.0 - w / w_sum).powi(2) / (n - 1.0))
        .sum::<f64>();
    let b = 1.0 + 2.0 * (k - 2.0) / (k * k - 1.0) * lambda;

    let f = a / b;
    let df1 = k - 1.0;
    let df2 = (k * k - 1.0) / (3.0 * lambda);
    Ok((TestResult::new(f, f_sf(f, df1, df2)).with_df(df1), df2))
}

fn extract_two_lists(args: &[Value], func: &str) -> Result<(Vec<f64>, Vec<f64>), GaltonError> {
    if args.len() < 2 {
        return Err(GaltonError::arg_count(func, 2, args.len()));
    }
    let x = extract_finite(&args[0..1])?;
    let y = extract_finite(&args[1..2])?;
    Ok((x, y))
}

// ============ TTest1 ============

pub struct TTest1;

static T_TEST_1_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List<Number>", "Sample data"),
    ArgMeta::optional("mu0", "Number", "Hypothesized mean", "0"),
];
static T_TEST_1_EXAMPLES: [&str; 1] = ["t_test_1([5.1, 4.9, 5.3, 5.2], 5) → {statistic, p_value, df}"];
static T_TEST_1_RELATED: [&str; 2] = ["t_test_2", "wilcoxon_1"];

impl FunctionPlugin for TTest1 {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "t_test_1",
            description: "One-sample t-test",
            usage: "t_test_1(list, mu0?)",
            args: &T_TEST_1_ARGS,
            returns: "Object",
            examples: &T_TEST_1_EXAMPLES,
            category: "stats/hypothesis",
            related: &T_TEST_1_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 2 {
            return Value::Error(GaltonError::arg_count("t_test_1", 1, args.len()));
        }
        let x = match extract_finite(&args[0..1]) {
            Ok(x) => x,
            Err(e) => return Value::Error(e),
        };
        let mu0 = match optional_number(args, 1, "t_test_1", "mu0", 0.0) {
            Ok(m) => m,
            Err(e) => return Value::Error(e),
        };
        match t_test_one_sample(&x, mu0) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ TTest2 ============

pub struct TTest2;

static T_TEST_2_ARGS: [ArgMeta; 3] = [
    ArgMeta::required("list1", "List<Number>", "First sample"),
    ArgMeta::required("list2", "List<Number>", "Second sample"),
    ArgMeta::optional("equal_var", "Bool", "Pool variances (Student) instead of Welch", "false"),
];
static T_TEST_2_EXAMPLES: [&str; 2] = [
    "t_test_2([1,2,3], [4,5,6]) → Welch's t-test",
    "t_test_2(a, b, true) → Student's t-test",
];
static T_TEST_2_RELATED: [&str; 3] = ["t_test_1", "t_test_paired", "mann_whitney"];

impl FunctionPlugin for TTest2 {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "t_test_2",
            description: "Two-sample t-test (Welch's unless equal_var)",
            usage: "t_test_2(list1, list2, equal_var?)",
            args: &T_TEST_2_ARGS,
            returns: "Object",
            examples: &T_TEST_2_EXAMPLES,
            category: "stats/hypothesis",
            related: &T_TEST_2_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.len() > 3 {
            return Value::Error(GaltonError::arg_count("t_test_2", 2, args.len()));
        }
        let (x, y) = match extract_two_lists(args, "t_test_2") {
            Ok(v) => v,
            Err(e) => return Value::Error(e),
        };
        let equal_var = match args.get(2) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Value::Error(GaltonError::arg_type("t_test_2", "equal_var", "Bool", other.type_name()))
            }
        };
        match t_test_independent(&x, &y, equal_var) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ TTestPaired ============

pub struct TTestPaired;

static T_TEST_PAIRED_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list1", "List<Number>", "First measurements"),
    ArgMeta::required("list2", "List<Number>", "Second measurements, same order"),
];
static T_TEST_PAIRED_EXAMPLES: [&str; 1] = ["t_test_paired(before, after) → {statistic, p_value, df}"];
static T_TEST_PAIRED_RELATED: [&str; 2] = ["t_test_2", "wilcoxon"];

impl FunctionPlugin for TTestPaired {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "t_test_paired",
            description: "Paired-samples t-test",
            usage: "t_test_paired(list1, list2)",
            args: &T_TEST_PAIRED_ARGS,
            returns: "Object",
            examples: &T_TEST_PAIRED_EXAMPLES,
            category: "stats/hypothesis",
            related: &T_TEST_PAIRED_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.len() != 2 {
            return Value::Error(GaltonError::arg_count("t_test_paired", 2, args.len()));
        }
        let (x, y) = match (extract_numbers(&args[0..1]), extract_numbers(&args[1..2])) {
            (Ok(x), Ok(y)) => (x, y),
            (Err(e), _) | (_, Err(e)) => return Value::Error(e),
        };
        match t_test_paired(&x, &y) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ Anova ============

pub struct Anova;

static ANOVA_ARGS: [ArgMeta; 1] = [ArgMeta::required("groups", "List...", "Two or more groups of values")];
static ANOVA_EXAMPLES: [&str; 1] = ["anova([1,2,3], [4,5,6], [7,8,9]) → {statistic, p_value, df}"];
static ANOVA_RELATED: [&str; 2] = ["welch_anova", "kruskal"];

impl FunctionPlugin for Anova {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "anova",
            description: "One-way analysis of variance",
            usage: "anova(group1, group2, ...)",
            args: &ANOVA_ARGS,
            returns: "Object",
            examples: &ANOVA_EXAMPLES,
            category: "stats/hypothesis",
            related: &ANOVA_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let groups = match extract_groups(args, "anova") {
            Ok(g) => g,
            Err(e) => return Value::Error(e),
        };
        match anova_oneway(&groups) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ WelchAnova ============

pub struct WelchAnova;

static WELCH_ANOVA_ARGS: [ArgMeta; 1] = [ArgMeta::required("groups", "List...", "Two or more groups of values")];
static WELCH_ANOVA_EXAMPLES: [&str; 1] = ["welch_anova(a, b, c) → {statistic, p_value, df, df_denom}"];
static WELCH_ANOVA_RELATED: [&str; 2] = ["anova", "levene"];

impl FunctionPlugin for WelchAnova {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "welch_anova",
            description: "Welch's one-way ANOVA for unequal variances",
            usage: "welch_anova(group1, group2, ...)",
            args: &WELCH_ANOVA_ARGS,
            returns: "Object",
            examples: &WELCH_ANOVA_EXAMPLES,
            category: "stats/hypothesis",
            related: &WELCH_ANOVA_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let groups = match extract_groups(args, "welch_anova") {
            Ok(g) => g,
            Err(e) => return Value::Error(e),
        };
        match welch_anova(&groups) {
            Ok((r, df_denom)) => match r.to_value() {
                Value::Object(mut obj) => {
                    obj.insert("df_denom".to_string(), Value::Number(df_denom));
                    Value::Object(obj)
                }
                other => other,
            },
            Err(e) => Value::Error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_ctx() -> EvalContext {
        EvalContext::new(std::sync::Arc::new(PluginRegistry::new()))
    }

    #[test]
    fn test_one_sample_known_value() {
        // mean 3, sd 1.5811, se 0.7071 → t = 2.8284, df 4
        let r = t_test_one_sample(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.0).unwrap();
        assert!((r.statistic - 2.828427).abs() < 1e-5);
        assert_eq!(r.df, Some(4.0));
        // scipy.stats.ttest_1samp → p = 0.04742
        assert!((r.p_value - 0.04742).abs() < 1e-4, "p = {}", r.p_value);
    }

    #[test]
    fn test_student_and_welch_agree_for_equal_sizes_and_variances() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [3.0, 4.0, 5.0, 6.0, 7.0];
        let s = t_test_independent(&x, &y, true).unwrap();
        let w = t_test_independent(&x, &y, false).unwrap();
        assert!((s.statistic + 2.0).abs() < 1e-12);
        assert!((s.statistic - w.statistic).abs() < 1e-12);
        assert!((w.df.unwrap() - 8.0).abs() < 1e-9);
        // scipy.stats.ttest_ind → p = 0.08052
        assert!((s.p_value - 0.08052).abs() < 1e-4, "p = {}", s.p_value);
    }

    #[test]
    fn test_welch_df_shrinks_with_unequal_variance() {
        let x = [10.0, 10.5, 9.5, 10.2, 9.8, 10.1];
        let y = [5.0, 20.0, 1.0, 30.0, 12.0, 8.0];
        let w = t_test_independent(&x, &y, false).unwrap();
        assert!(w.df.unwrap() < 10.0);
    }

    #[test]
    fn test_paired() {
        let before = [10.0, 12.0, 9.0, 11.0, 13.0];
        let after = [11.0, 14.0, 10.0, 12.5, 14.0];
        let r = t_test_paired(&after, &before).unwrap();
        assert!(r.statistic > 0.0);
        assert!(r.p_value < 0.01, "p = {}", r.p_value);

        let err = t_test_paired(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(err.is(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_zero_variance_is_degenerate() {
        let err = t_test_one_sample(&[2.0, 2.0, 2.0], 0.0).unwrap_err();
        assert!(err.is(codes::DEGENERATE_SAMPLE));
    }

    #[test]
    fn test_anova_known_value() {
        // Means 2, 5, 8; SSB = 54, SSW = 6 → F = 27 with (2, 6)
        let r = anova_oneway(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]]).unwrap();
        assert!((r.statistic - 27.0).abs() < 1e-9);
        assert!(r.p_value < 0.01);
    }

    #[test]
    fn test_welch_anova_separated_groups() {
        let groups = [vec![1.0, 2.0, 3.0, 4.0], vec![2.0, 3.0, 4.0, 5.0], vec![12.0, 13.0, 14.0, 15.0]];
        let (r, df2) = welch_anova(&groups).unwrap();
        assert!(r.p_value < 0.001, "p = {}", r.p_value);
        assert!(df2 > 0.0);
        assert_eq!(r.df, Some(2.0));
    }

    #[test]
    fn test_anova_needs_two_groups() {
        let err = anova_oneway(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(err.is(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_plugins() {
        let ctx = eval_ctx();
        let a = Value::numbers(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = Value::numbers(&[3.0, 4.0, 5.0, 6.0, 7.0]);

        let v = TTest2.call(&[a.clone(), b.clone(), Value::Bool(true)], &ctx);
        assert_eq!(v.get("df").as_number(), Some(8.0));
        assert!(TTest2.call(&[a.clone()], &ctx).is_error());

        let v = WelchAnova.call(&[a.clone(), b.clone()], &ctx);
        assert!(v.get("df_denom").as_number().is_some());

        let v = TTest1.call(&[a], &ctx);
        assert!(v.get("p_value").as_number().unwrap() < 0.05);
    }
}
