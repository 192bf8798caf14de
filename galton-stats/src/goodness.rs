//! Goodness-of-fit tests for normality: Shapiro-Wilk, Lilliefors, Jarque-Bera

use crate::distributions::{normal_cdf, normal_ppf, normal_sf};
use crate::helpers::{central_moment, extract_finite, mean, require_min_count, sorted, std_dev, TestResult};
use galton_plugin::prelude::*;
use std::f64::consts::PI;

fn poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn require_spread(sorted: &[f64], func: &str) -> Result<(), GaltonError> {
    let range = sorted[sorted.len() - 1] - sorted[0];
    if range.is_nan() || range <= 0.0 {
        return Err(GaltonError::degenerate_sample(format!("{}() requires non-constant data", func)));
    }
    Ok(())
}

/// Shapiro-Wilk W with Royston's (1995) approximation of the
/// coefficients and p-value (algorithm AS R94). Valid for 3 <= n <= 5000;
/// larger samples are still computed.
pub fn shapiro_wilk(data: &[f64]) -> Result<TestResult, GaltonError> {
    require_min_count(data, 3, "shapiro_wilk")?;
    let x = sorted(data);
    require_spread(&x, "shapiro_wilk")?;

    let n = x.len();
    let an = n as f64;
    let half = n / 2;

    let mut a = vec![0.0; half];
    if n == 3 {
        a[0] = std::f64::consts::FRAC_1_SQRT_2;
    } else {
        let an25 = an + 0.25;
        let m: Vec<f64> = (1..=half).map(|i| normal_ppf((i as f64 - 0.375) / an25)).collect();
        let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
        let ssumm2 = summ2.sqrt();
        let rsn = 1.0 / an.sqrt();

        const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056];
        const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];

        let a1 = poly(&C1, rsn) - m[0] / ssumm2;
        let (first, fac) = if n > 5 {
            let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
            let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
                / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
                .sqrt();
            a[1] = a2;
            (2, fac)
        } else {
            let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
            (1, fac)
        };
        a[0] = a1;
        for i in first..half {
            a[i] = -m[i] / fac;
        }
    }

    let b: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (x[n - 1 - i] - x[i]))
        .sum();
    let xm = mean(&x);
    let ss: f64 = x.iter().map(|v| (v - xm) * (v - xm)).sum();
    let w = (b * b / ss).min(1.0);

    Ok(TestResult::new(w, shapiro_wilk_pvalue(w, n)))
}

fn shapiro_wilk_pvalue(w: f64, n: usize) -> f64 {
    let an = n as f64;
    if n == 3 {
        // Exact distribution for n = 3
        let p = 6.0 / PI * (w.sqrt().asin() - (0.75f64).sqrt().asin());
        return p.clamp(0.0, 1.0);
    }
    if w >= 1.0 {
        return 1.0;
    }

    let w1 = (1.0 - w).ln();
    let (y, m, s) = if n <= 11 {
        const G: [f64; 2] = [-2.273, 0.459];
        const C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
        const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
        let gamma = poly(&G, an);
        if w1 >= gamma {
            return 1e-99;
        }
        (-(gamma - w1).ln(), poly(&C3, an), poly(&C4, an).exp())
    } else {
        const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
        const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
        let xx = an.ln();
        (w1, poly(&C5, xx), poly(&C6, xx).exp())
    };

    normal_sf((y - m) / s)
}

/// Kolmogorov-Smirnov distance against a normal with estimated mean and
/// standard deviation, with the Lilliefors p-value
pub fn lilliefors(data: &[f64]) -> Result<TestResult, GaltonError> {
    require_min_count(data, 3, "lilliefors")?;
    let x = sorted(data);
    require_spread(&x, "lilliefors")?;

    let n = x.len() as f64;
    let m = mean(&x);
    let sd = std_dev(&x);

    let mut d_plus: f64 = 0.0;
    let mut d_minus: f64 = 0.0;
    for (i, v) in x.iter().enumerate() {
        let f = normal_cdf((v - m) / sd);
        d_plus = d_plus.max((i + 1) as f64 / n - f);
        d_minus = d_minus.max(f - i as f64 / n);
    }
    let d = d_plus.max(d_minus);

    Ok(TestResult::new(d, lilliefors_pvalue(d, n)))
}

/// Dallal-Wilkinson approximation below p = 0.1, Stephens' modified
/// statistic above it
fn lilliefors_pvalue(d: f64, n: f64) -> f64 {
    let (dd, nn) = if n > 100.0 {
        (d * (n / 100.0).powf(0.49), 100.0)
    } else {
        (d, n)
    };
    let p = (-7.01256 * dd * dd * (nn + 2.78019) + 2.99587 * dd * (nn + 2.78019).sqrt() - 0.122119
        + 0.974598 / nn.sqrt()
        + 1.67997 / nn)
        .exp();
    if p <= 0.1 {
        return p;
    }

    const TABLE: [(f64, f64); 3] = [(0.736, 0.20), (0.768, 0.15), (0.805, 0.10)];
    let dstar = d * (n.sqrt() - 0.01 + 0.85 / n.sqrt());
    if dstar < TABLE[0].0 {
        return (0.2 * (10.05 * (TABLE[0].0 - dstar)).exp()).min(1.0);
    }
    for pair in TABLE.windows(2) {
        let (d0, p0) = pair[0];
        let (d1, p1) = pair[1];
        if dstar <= d1 {
            let t = (dstar - d0) / (d1 - d0);
            return (p0.ln() + t * (p1.ln() - p0.ln())).exp();
        }
    }
    0.1
}

/// Jarque-Bera statistic from population skewness and kurtosis; the
/// p-value is the chi-squared(2) upper tail
pub fn jarque_bera(data: &[f64]) -> Result<TestResult, GaltonError> {
    require_min_count(data, 3, "jarque_bera")?;
    let x = sorted(data);
    require_spread(&x, "jarque_bera")?;

    let n = x.len() as f64;
    let m2 = central_moment(&x, 2);
    let skew = central_moment(&x, 3) / m2.powf(1.5);
    let kurt = central_moment(&x, 4) / (m2 * m2);
    let jb = n / 6.0 * (skew * skew + (kurt - 3.0).powi(2) / 4.0);

    Ok(TestResult::new(jb, (-jb / 2.0).exp()).with_df(2.0))
}

// ============ Plugins ============

macro_rules! normality_plugin {
    ($ty:ident, $name:literal, $desc:literal, $args:ident, $examples:ident, $related:ident, $func:path, $example:literal, [$($rel:literal),*]) => {
        pub struct $ty;

        static $args: [ArgMeta; 1] = [ArgMeta::required("list", "List", "Data values")];
        static $examples: [&str; 1] = [$example];
        static $related: &[&str] = &[$($rel),*];

        impl FunctionPlugin for $ty {
            fn meta(&self) -> FunctionMeta {
                FunctionMeta {
                    name: $name,
                    description: $desc,
                    usage: concat!($name, "(list)"),
                    args: &$args,
                    returns: "Object",
                    examples: &$examples,
                    category: "stats/normality",
                    related: $related,
                }
            }

            fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
                if args.len() != 1 {
                    return Value::Error(GaltonError::arg_count($name, 1, args.len()));
                }
                let numbers = match extract_finite(args) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                match $func(&numbers) {
                    Ok(r) => r.to_value(),
                    Err(e) => Value::Error(e.in_function($name)),
                }
            }
        }
    };
}

normality_plugin!(
    ShapiroWilk,
    "shapiro_wilk",
    "Shapiro-Wilk test for normality",
    SW_ARGS,
    SW_EXAMPLES,
    SW_RELATED,
    shapiro_wilk,
    "shapiro_wilk(data) → {statistic: 0.98, p_value: 0.42}",
    ["lilliefors", "jarque_bera"]
);

normality_plugin!(
    Lilliefors,
    "lilliefors",
    "Lilliefors (Kolmogorov-Smirnov with estimated parameters) test for normality",
    LF_ARGS,
    LF_EXAMPLES,
    LF_RELATED,
    lilliefors,
    "lilliefors(data) → {statistic: 0.08, p_value: 0.2}",
    ["shapiro_wilk", "jarque_bera"]
);

normality_plugin!(
    JarqueBera,
    "jarque_bera",
    "Jarque-Bera test for normality (uses skewness and kurtosis)",
    JB_ARGS,
    JB_EXAMPLES,
    JB_RELATED,
    jarque_bera,
    "jarque_bera(data) → {statistic: 2.34, p_value: 0.31, df: 2}",
    ["shapiro_wilk", "lilliefors"]
);

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Exp};

    fn eval_ctx() -> EvalContext {
        EvalContext::new(std::sync::Arc::new(PluginRegistry::new()))
    }

    /// Expected normal order statistics (Blom positions)
    fn normal_scores(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|i| normal_ppf((i as f64 - 0.375) / (n as f64 + 0.25)))
            .collect()
    }

    #[test]
    fn test_shapiro_wilk_normal_scores_accepts() {
        let r = shapiro_wilk(&normal_scores(50)).unwrap();
        assert!(r.statistic > 0.98, "W = {}", r.statistic);
        assert!(r.p_value > 0.5, "p = {}", r.p_value);
    }

    #[test]
    fn test_shapiro_wilk_exponential_rejects() {
        let mut rng = StdRng::seed_from_u64(7);
        let exp = Exp::new(1.0).unwrap();
        let data: Vec<f64> = (0..200).map(|_| exp.sample(&mut rng)).collect();
        let r = shapiro_wilk(&data).unwrap();
        assert!(r.p_value < 0.001, "p = {}", r.p_value);
    }

    #[test]
    fn test_shapiro_wilk_small_samples() {
        // Three equally spaced points have W = 1
        let r = shapiro_wilk(&[1.0, 2.0, 3.0]).unwrap();
        assert!((r.statistic - 1.0).abs() < 1e-9);
        assert!((r.p_value - 1.0).abs() < 1e-6);

        let r = shapiro_wilk(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!(r.statistic > 0.95 && r.statistic <= 1.0);
        assert!(r.p_value > 0.5);
    }

    #[test]
    fn test_shapiro_wilk_degenerate() {
        let err = shapiro_wilk(&[1.0, 2.0]).unwrap_err();
        assert!(err.is(codes::DEGENERATE_SAMPLE));
        assert!(shapiro_wilk(&[4.0, 4.0, 4.0, 4.0]).is_err());
    }

    #[test]
    fn test_lilliefors_normal_vs_skewed() {
        let normal = lilliefors(&normal_scores(100)).unwrap();
        assert!(normal.p_value > 0.1, "p = {}", normal.p_value);

        let mut rng = StdRng::seed_from_u64(11);
        let exp = Exp::new(1.0).unwrap();
        let skewed: Vec<f64> = (0..300).map(|_| exp.sample(&mut rng)).collect();
        let r = lilliefors(&skewed).unwrap();
        assert!(r.p_value < 0.01, "p = {}", r.p_value);
    }

    #[test]
    fn test_lilliefors_pvalue_is_monotone() {
        let mut last = 1.0;
        for i in 1..40 {
            let p = lilliefors_pvalue(i as f64 * 0.01, 50.0);
            assert!(p <= last + 1e-12, "d = {} p = {} last = {}", i as f64 * 0.01, p, last);
            last = p;
        }
    }

    #[test]
    fn test_jarque_bera() {
        let r = jarque_bera(&normal_scores(200)).unwrap();
        assert!(r.p_value > 0.5);
        assert_eq!(r.df, Some(2.0));
    }

    #[test]
    fn test_plugins_return_objects() {
        let args = vec![Value::numbers(&normal_scores(30))];
        let ctx = eval_ctx();
        for plugin in [&ShapiroWilk as &dyn FunctionPlugin, &Lilliefors, &JarqueBera] {
            let v = plugin.call(&args, &ctx);
            assert!(v.get("p_value").as_number().is_some(), "{}", plugin.meta().name);
        }
        assert!(ShapiroWilk.call(&[], &ctx).is_error());
    }
}
