//! Rank-based tests: Mann-Whitney U, Wilcoxon signed-rank, Kruskal-Wallis

use crate::distributions::{chi2_sf, normal_cdf, normal_sf};
use crate::helpers::{extract_finite, extract_groups, extract_numbers, optional_number, ranks, tie_term, TestResult};
use galton_plugin::prelude::*;

/// Largest sample for which the signed-rank null distribution is
/// enumerated exactly
const WILCOXON_EXACT_MAX: usize = 50;

/// Mann-Whitney U test, normal approximation with tie and continuity
/// correction. The statistic is U for the first sample.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Result<TestResult, GaltonError> {
    if x.is_empty() || y.is_empty() {
        return Err(GaltonError::degenerate_sample("mann_whitney() requires two non-empty samples"));
    }
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let combined: Vec<f64> = x.iter().chain(y).copied().collect();
    let n = combined.len() as f64;

    let r = ranks(&combined);
    let r1: f64 = r[..x.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;

    let mu = n1 * n2 / 2.0;
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term(&combined) / (n * (n - 1.0)))).sqrt();
    if sigma.is_nan() || sigma <= 0.0 {
        return Err(GaltonError::degenerate_sample("mann_whitney() undefined when all values are tied"));
    }

    let z = (u1.max(u2) - mu - 0.5) / sigma;
    Ok(TestResult::new(u1, (2.0 * normal_sf(z)).min(1.0)))
}

/// Wilcoxon signed-rank test on differences. Zero differences are
/// dropped; the statistic is min(W+, W-). The null distribution is exact
/// for small samples without ties, otherwise normal with tie correction.
pub fn wilcoxon_signed_rank(diffs: &[f64]) -> Result<TestResult, GaltonError> {
    let nonzero: Vec<f64> = diffs.iter().copied().filter(|d| d.is_finite() && *d != 0.0).collect();
    if nonzero.is_empty() {
        return Err(GaltonError::degenerate_sample("wilcoxon() requires at least one non-zero difference"));
    }
    let had_zeros = nonzero.len() < diffs.iter().filter(|d| d.is_finite()).count();

    let abs: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let r = ranks(&abs);
    let w_plus: f64 = nonzero.iter().zip(&r).filter(|(d, _)| **d > 0.0).map(|(_, r)| r).sum();
    let n = nonzero.len();
    let nf = n as f64;
    let total = nf * (nf + 1.0) / 2.0;
    let t = w_plus.min(total - w_plus);

    let ties = tie_term(&abs);
    let p = if n <= WILCOXON_EXACT_MAX && ties == 0.0 && !had_zeros {
        (2.0 * signed_rank_cdf(n, t)).min(1.0)
    } else {
        let mean = total / 2.0;
        let se = (nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - ties / 48.0).sqrt();
        if se.is_nan() || se <= 0.0 {
            return Err(GaltonError::degenerate_sample("wilcoxon() undefined for this sample"));
        }
        (2.0 * normal_cdf((t - mean) / se)).min(1.0)
    };

    Ok(TestResult::new(t, p))
}

/// P(W+ <= t) under H0 for `n` untied ranks
fn signed_rank_cdf(n: usize, t: f64) -> f64 {
    let max_sum = n * (n + 1) / 2;
    let mut dist = vec![0.0; max_sum + 1];
    dist[0] = 1.0;
    for k in 1..=n {
        for s in (k..=max_sum).rev() {
            dist[s] = (dist[s] + dist[s - k]) / 2.0;
        }
        for d in dist.iter_mut().take(k) {
            *d /= 2.0;
        }
    }
    let upto = t.floor().max(0.0) as usize;
    dist.iter().take(upto.min(max_sum) + 1).sum()
}

/// Paired Wilcoxon signed-rank on x[i] - y[i]
pub fn wilcoxon_paired(x: &[f64], y: &[f64]) -> Result<TestResult, GaltonError> {
    if x.len() != y.len() {
        return Err(GaltonError::invalid_argument(format!(
            "wilcoxon() requires equal lengths, got {} and {}",
            x.len(),
            y.len()
        )));
    }
    let diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).collect();
    wilcoxon_signed_rank(&diffs)
}

/// One-sample Wilcoxon signed-rank of H0: median = mu0
pub fn wilcoxon_one_sample(x: &[f64], mu0: f64) -> Result<TestResult, GaltonError> {
    let diffs: Vec<f64> = x.iter().map(|v| v - mu0).collect();
    wilcoxon_signed_rank(&diffs).map_err(|e| e.in_function("wilcoxon_1"))
}

/// Kruskal-Wallis H test with tie correction, chi-squared(k - 1) p-value
pub fn kruskal_wallis<G: AsRef<[f64]>>(groups: &[G]) -> Result<TestResult, GaltonError> {
    let k = groups.len();
    if k < 2 {
        return Err(GaltonError::invalid_argument(format!(
            "kruskal() requires at least 2 groups, got {}",
            k
        )));
    }
    if groups.iter().any(|g| g.as_ref().is_empty()) {
        return Err(GaltonError::degenerate_sample("kruskal() requires every group to be non-empty"));
    }

    let combined: Vec<f64> = groups.iter().flat_map(|g| g.as_ref().iter().copied()).collect();
    let n = combined.len() as f64;
    let r = ranks(&combined);

    let mut offset = 0;
    let mut h = 0.0;
    for g in groups {
        let len = g.as_ref().len();
        let rank_sum: f64 = r[offset..offset + len].iter().sum();
        h += rank_sum * rank_sum / len as f64;
        offset += len;
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_term(&combined) / (n * n * n - n);
    if correction.is_nan() || correction <= 0.0 {
        return Err(GaltonError::degenerate_sample("kruskal() undefined when all values are tied"));
    }
    h /= correction;

    let df = (k - 1) as f64;
    Ok(TestResult::new(h, chi2_sf(h, df)).with_df(df))
}

// ============ MannWhitney ============

pub struct MannWhitney;

static MANN_WHITNEY_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list1", "List<Number>", "First sample"),
    ArgMeta::required("list2", "List<Number>", "Second sample"),
];
static MANN_WHITNEY_EXAMPLES: [&str; 1] = ["mann_whitney([1,2,3,4], [5,6,7,8]) → {statistic: 0, p_value}"];
static MANN_WHITNEY_RELATED: [&str; 2] = ["t_test_2", "kruskal"];

impl FunctionPlugin for MannWhitney {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "mann_whitney",
            description: "Mann-Whitney U test for two independent samples",
            usage: "mann_whitney(list1, list2)",
            args: &MANN_WHITNEY_ARGS,
            returns: "Object",
            examples: &MANN_WHITNEY_EXAMPLES,
            category: "stats/nonparametric",
            related: &MANN_WHITNEY_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.len() != 2 {
            return Value::Error(GaltonError::arg_count("mann_whitney", 2, args.len()));
        }
        let (x, y) = match (extract_finite(&args[0..1]), extract_finite(&args[1..2])) {
            (Ok(x), Ok(y)) => (x, y),
            (Err(e), _) | (_, Err(e)) => return Value::Error(e),
        };
        match mann_whitney_u(&x, &y) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ Wilcoxon ============

pub struct Wilcoxon;

static WILCOXON_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list1", "List<Number>", "First measurements"),
    ArgMeta::required("list2", "List<Number>", "Second measurements, same order"),
];
static WILCOXON_EXAMPLES: [&str; 1] = ["wilcoxon(before, after) → {statistic, p_value}"];
static WILCOXON_RELATED: [&str; 2] = ["t_test_paired", "wilcoxon_1"];

impl FunctionPlugin for Wilcoxon {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "wilcoxon",
            description: "Wilcoxon signed-rank test for paired samples",
            usage: "wilcoxon(list1, list2)",
            args: &WILCOXON_ARGS,
            returns: "Object",
            examples: &WILCOXON_EXAMPLES,
            category: "stats/nonparametric",
            related: &WILCOXON_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.len() != 2 {
            return Value::Error(GaltonError::arg_count("wilcoxon", 2, args.len()));
        }
        let (x, y) = match (extract_numbers(&args[0..1]), extract_numbers(&args[1..2])) {
            (Ok(x), Ok(y)) => (x, y),
            (Err(e), _) | (_, Err(e)) => return Value::Error(e),
        };
        match wilcoxon_paired(&x, &y) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ Wilcoxon1 ============

pub struct Wilcoxon1;

static WILCOXON_1_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List<Number>", "Sample data"),
    ArgMeta::optional("mu0", "Number", "Hypothesized median", "0"),
];
static WILCOXON_1_EXAMPLES: [&str; 1] = ["wilcoxon_1([1.2, -0.3, 2.5, 0.8], 0) → {statistic, p_value}"];
static WILCOXON_1_RELATED: [&str; 2] = ["t_test_1", "wilcoxon"];

impl FunctionPlugin for Wilcoxon1 {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "wilcoxon_1",
            description: "One-sample Wilcoxon signed-rank test",
            usage: "wilcoxon_1(list, mu0?)",
            args: &WILCOXON_1_ARGS,
            returns: "Object",
            examples: &WILCOXON_1_EXAMPLES,
            category: "stats/nonparametric",
            related: &WILCOXON_1_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 2 {
            return Value::Error(GaltonError::arg_count("wilcoxon_1", 1, args.len()));
        }
        let x = match extract_finite(&args[0..1]) {
            Ok(x) => x,
            Err(e) => return Value::Error(e),
        };
        let mu0 = match optional_number(args, 1, "wilcoxon_1", "mu0", 0.0) {
            Ok(m) => m,
            Err(e) => return Value::Error(e),
        };
        match wilcoxon_one_sample(&x, mu0) {
            Ok(r) => r.to_value(),
            Err(e) => Value::Error(e),
        }
    }
}

// ============ Kruskal ============

pub struct Kruskal;

static KRUSKAL_ARGS: [ArgMeta; 1] = [ArgMeta::required("groups", "List...", "Two or more groups of values")];
static KRUSKAL_EXAMPLES: [&str; 1] = ["kruskal([1,2,3], [4,5,6], [7,8,9]) → {statistic: 7.2, p_value, df: 2}"];
static KRUSKAL_RELATED: [&str; 2] = ["anova", "mann_whitney"];

impl FunctionPlugin for Kruskal {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "kruskal",
            description: "Kruskal-Wallis H test for several independent samples",
            usage: "kruskal(group1, group2, ...)",
            args: &KRUSKAL_ARGS,
            returns: "Object",
            examples: &KRUSKAL_EXAMPLES,
            category: "stats/nonparametric",
            related: &KRUSKAL_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let groups = match extract_groups(args, "kruskal") {
            Ok(g) => g,
            Err(e) => return Value::Error(e),
        };
        match kruskal_wallis(&groups) {
            Ok(r) => r.to_value(),
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
    fn test_mann_whitney_separated_samples() {
        let x: Vec<f64> = (1..=10).map(f64::from).collect();
        let y: Vec<f64> = (11..=20).map(f64::from).collect();
        let r = mann_whitney_u(&x, &y).unwrap();
        assert_eq!(r.statistic, 0.0);
        // z = (100 - 50 - 0.5) / 13.2288 → p ≈ 0.00018
        assert!(r.p_value < 0.001, "p = {}", r.p_value);
    }

    #[test]
    fn test_mann_whitney_identical_samples() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let r = mann_whitney_u(&x, &x).unwrap();
        assert_eq!(r.statistic, 8.0);
        assert!((r.p_value - 1.0).abs() < 1e-9);
        assert!(mann_whitney_u(&[1.0, 1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_signed_rank_exact_distribution() {
        // n = 3: W+ takes values 0..=6 with counts 1,1,1,2,1,1,1 over 8
        assert!((signed_rank_cdf(3, 0.0) - 0.125).abs() < 1e-12);
        assert!((signed_rank_cdf(3, 3.0) - 0.625).abs() < 1e-12);
        assert!((signed_rank_cdf(3, 6.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wilcoxon_all_positive_differences() {
        // Eight positive untied differences: T = 0, exact p = 2 / 256
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let r = wilcoxon_one_sample(&x, 0.0).unwrap();
        assert_eq!(r.statistic, 0.0);
        assert!((r.p_value - 2.0 / 256.0).abs() < 1e-12);
    }

    #[test]
    fn test_wilcoxon_paired_and_zero_handling() {
        let before = [10.0, 12.0, 9.0, 11.0, 13.0, 8.0];
        let after = [10.0, 14.0, 10.0, 12.5, 14.0, 9.0];
        let r = wilcoxon_paired(&after, &before).unwrap();
        assert_eq!(r.statistic, 0.0);
        assert!(r.p_value < 0.1);

        let err = wilcoxon_one_sample(&[3.0, 3.0], 3.0).unwrap_err();
        assert!(err.is(codes::DEGENERATE_SAMPLE));
        assert!(wilcoxon_paired(&[1.0], &[1.0, 2.0]).unwrap_err().is(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_kruskal_known_value() {
        // Ranks 1..9 in three blocks: H = 7.2
        let groups = [vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]];
        let r = kruskal_wallis(&groups).unwrap();
        assert!((r.statistic - 7.2).abs() < 1e-9);
        assert!((r.p_value - (-3.6f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_kruskal_all_tied_is_degenerate() {
        let groups = [vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(kruskal_wallis(&groups).unwrap_err().is(codes::DEGENERATE_SAMPLE));
    }

    #[test]
    fn test_plugins() {
        let ctx = eval_ctx();
        let a = Value::numbers(&[1.0, 2.0, 3.0]);
        let b = Value::numbers(&[4.0, 5.0, 6.0]);
        let c = Value::numbers(&[7.0, 8.0, 9.0]);
        let v = Kruskal.call(&[a.clone(), b.clone(), c], &ctx);
        assert_eq!(v.get("df").as_number(), Some(2.0));
        let v = MannWhitney.call(&[a.clone(), b], &ctx);
        assert_eq!(v.get("statistic").as_number(), Some(0.0));
        assert!(Wilcoxon1.call(&[a, Value::Number(2.0)], &ctx).get("p_value").as_number().is_some());
        assert!(Wilcoxon.call(&[], &ctx).is_error());
    }
}
