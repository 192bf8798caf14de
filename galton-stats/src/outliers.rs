//! Outlier detection functions

use crate::helpers::{extract_finite, mean, optional_number, quantile_sorted, sorted, variance};
use galton_plugin::prelude::*;
use serde::Serialize;

/// Observations flagged as outliers, in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outliers {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
    /// Values strictly below this are outliers
    pub lower: f64,
    /// Values strictly above this are outliers
    pub upper: f64,
}

impl Outliers {
    fn collect(data: &[f64], lower: f64, upper: f64) -> Self {
        let (indices, values) = data
            .iter()
            .enumerate()
            .filter(|(_, &x)| x < lower || x > upper)
            .map(|(i, &x)| (i, x))
            .unzip();
        Self { indices, values, lower, upper }
    }

    fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("indices", Value::List(self.indices.iter().map(|&i| Value::from(i)).collect())),
            ("values", Value::numbers(&self.values)),
            ("lower_fence", Value::Number(self.lower)),
            ("upper_fence", Value::Number(self.upper)),
            ("count", Value::from(self.count())),
        ])
    }
}

/// Tukey fences: outside [Q1 - k·IQR, Q3 + k·IQR], quartiles by linear
/// interpolation
pub fn iqr_outliers(data: &[f64], k: f64) -> Outliers {
    if data.is_empty() {
        return Outliers::empty();
    }
    let s = sorted(data);
    let q1 = quantile_sorted(&s, 0.25);
    let q3 = quantile_sorted(&s, 0.75);
    let iqr = q3 - q1;
    Outliers::collect(data, q1 - k * iqr, q3 + k * iqr)
}

/// Values whose population z-score exceeds `threshold` in absolute value.
/// A zero-variance sample has no outliers.
pub fn zscore_outliers(data: &[f64], threshold: f64) -> Outliers {
    if data.is_empty() {
        return Outliers::empty();
    }
    let m = mean(data);
    let sd = variance(data, 0).sqrt();
    if sd == 0.0 || !sd.is_finite() {
        return Outliers::empty();
    }
    Outliers::collect(data, m - threshold * sd, m + threshold * sd)
}

// ============ OutliersIqr ============

pub struct OutliersIqr;

static OUTLIERS_IQR_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List", "Data values"),
    ArgMeta::optional("k", "Number", "IQR multiplier (use 3 for extreme outliers)", "1.5"),
];
static OUTLIERS_IQR_EXAMPLES: [&str; 2] = [
    "outliers_iqr([1,2,3,100]) → {indices, values, lower_fence, upper_fence, count}",
    "outliers_iqr(data, 3) → extreme outliers only",
];
static OUTLIERS_IQR_RELATED: [&str; 1] = ["outliers_zscore"];

impl FunctionPlugin for OutliersIqr {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "outliers_iqr",
            description: "IQR-based outlier detection (Tukey's fences)",
            usage: "outliers_iqr(list, k?)",
            args: &OUTLIERS_IQR_ARGS,
            returns: "Object",
            examples: &OUTLIERS_IQR_EXAMPLES,
            category: "stats/outliers",
            related: &OUTLIERS_IQR_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 2 {
            return Value::Error(GaltonError::arg_count("outliers_iqr", 1, args.len()));
        }
        let numbers = match extract_finite(&args[0..1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let k = match optional_number(args, 1, "outliers_iqr", "k", ctx.config.iqr_threshold) {
            Ok(k) => k,
            Err(e) => return Value::Error(e),
        };
        if k.is_nan() || k < 0.0 {
            return Value::Error(GaltonError::invalid_argument("outliers_iqr() k must be non-negative"));
        }
        iqr_outliers(&numbers, k).to_value()
    }
}

// ============ OutliersZscore ============

pub struct OutliersZscore;

static OUTLIERS_ZSCORE_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List", "Data values"),
    ArgMeta::optional("threshold", "Number", "Absolute z-score cut-off", "3"),
];
static OUTLIERS_ZSCORE_EXAMPLES: [&str; 1] = ["outliers_zscore(data, 2.5) → {indices, values, ...}"];
static OUTLIERS_ZSCORE_RELATED: [&str; 1] = ["outliers_iqr"];

impl FunctionPlugin for OutliersZscore {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "outliers_zscore",
            description: "Z-score outlier detection (population standard deviation)",
            usage: "outliers_zscore(list, threshold?)",
            args: &OUTLIERS_ZSCORE_ARGS,
            returns: "Object",
            examples: &OUTLIERS_ZSCORE_EXAMPLES,
            category: "stats/outliers",
            related: &OUTLIERS_ZSCORE_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 2 {
            return Value::Error(GaltonError::arg_count("outliers_zscore", 1, args.len()));
        }
        let numbers = match extract_finite(&args[0..1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let threshold = match optional_number(args, 1, "outliers_zscore", "threshold", 3.0) {
            Ok(t) => t,
            Err(e) => return Value::Error(e),
        };
        zscore_outliers(&numbers, threshold).to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_ctx() -> EvalContext {
        EvalContext::new(std::sync::Arc::new(PluginRegistry::new()))
    }

    #[test]
    fn test_iqr_flags_extreme_value() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        let out = iqr_outliers(&data, 1.5);
        assert_eq!(out.indices, vec![5]);
        assert_eq!(out.values, vec![100.0]);
    }

    #[test]
    fn test_iqr_fence_is_exclusive() {
        // Q1 = 2, Q3 = 4, IQR = 2, upper fence = 7
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 7.0];
        let s = sorted(&data);
        assert_eq!(quantile_sorted(&s, 0.25), 2.25);
        let out = iqr_outliers(&[1.0, 2.0, 3.0, 4.0, 5.0], 1.5);
        assert!(out.values.is_empty());
        assert_eq!(out.upper, 7.0);
    }

    #[test]
    fn test_zscore_constant_sample_is_empty() {
        assert_eq!(zscore_outliers(&[5.0; 10], 3.0).count(), 0);
    }

    #[test]
    fn test_zscore_flags_far_point() {
        let mut data = vec![0.0; 20];
        data.push(50.0);
        let out = zscore_outliers(&data, 3.0);
        assert_eq!(out.indices, vec![20]);
    }

    #[test]
    fn test_outliers_iqr_plugin_uses_config_default() {
        let args = vec![Value::numbers(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0])];
        let result = OutliersIqr.call(&args, &eval_ctx());
        assert_eq!(result.get("count").as_number(), Some(1.0));
    }

    #[test]
    fn test_outliers_iqr_plugin_rejects_bad_k() {
        let args = vec![Value::numbers(&[1.0, 2.0]), Value::Number(-1.0)];
        assert!(OutliersIqr.call(&args, &eval_ctx()).is_error());
    }

    #[test]
    fn test_outliers_iqr_plugin_zero_k_fences_at_quartiles() {
        // Q1 = 2.25, Q3 = 4.75
        let args = vec![Value::numbers(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]), Value::Number(0.0)];
        let result = OutliersIqr.call(&args, &eval_ctx());
        assert_eq!(result.get("count").as_number(), Some(4.0));
    }
}
