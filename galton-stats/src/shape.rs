//! Shape functions: moments, skewness, kurtosis

use crate::helpers::{central_moment, extract_finite, mean, require_min_count, std_dev};
use galton_plugin::prelude::*;
use serde::Serialize;

/// First four moments of a sample. Skewness and kurtosis are the
/// bias-adjusted G1 / G2 estimators (kurtosis is excess, normal = 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl Moments {
    pub fn of(data: &[f64]) -> Self {
        Self {
            n: data.len(),
            mean: mean(data),
            std_dev: std_dev(data),
            skewness: skewness(data),
            kurtosis: kurtosis(data),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("n", Value::from(self.n)),
            ("mean", Value::Number(self.mean)),
            ("std", Value::Number(self.std_dev)),
            ("skewness", Value::Number(self.skewness)),
            ("kurtosis", Value::Number(self.kurtosis)),
        ])
    }
}

fn is_constant(data: &[f64]) -> bool {
    data.windows(2).all(|w| w[0] == w[1])
}

/// Adjusted Fisher-Pearson skewness G1. NaN below 3 values, 0 for a
/// constant sample.
pub fn skewness(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 3 {
        return f64::NAN;
    }
    if is_constant(data) {
        return 0.0;
    }
    let nf = n as f64;
    let m2 = central_moment(data, 2);
    let m3 = central_moment(data, 3);
    let g1 = m3 / m2.powf(1.5);
    (nf * (nf - 1.0)).sqrt() / (nf - 2.0) * g1
}

/// Adjusted excess kurtosis G2. NaN below 4 values, 0 for a constant
/// sample.
pub fn kurtosis(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 4 {
        return f64::NAN;
    }
    if is_constant(data) {
        return 0.0;
    }
    let nf = n as f64;
    let m2 = central_moment(data, 2);
    let m4 = central_moment(data, 4);
    let g2 = m4 / (m2 * m2) - 3.0;
    ((nf + 1.0) * g2 + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0))
}

// ============ Skewness ============

pub struct Skewness;

static SKEWNESS_ARGS: [ArgMeta; 1] = [ArgMeta::required("values", "List<Number> | Number...", "Numbers")];

static SKEWNESS_EXAMPLES: [&str; 1] = ["skewness([1,2,2,3,3,3,4,4,9]) → positive"];

static SKEWNESS_RELATED: [&str; 2] = ["kurtosis", "moments"];

impl FunctionPlugin for Skewness {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "skewness",
            description: "Adjusted Fisher-Pearson skewness (G1)",
            usage: "skewness(values)",
            args: &SKEWNESS_ARGS,
            returns: "Number",
            examples: &SKEWNESS_EXAMPLES,
            category: "stats/shape",
            related: &SKEWNESS_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let numbers = match extract_finite(args) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if let Err(e) = require_min_count(&numbers, 3, "skewness") {
            return Value::Error(e);
        }
        Value::Number(skewness(&numbers))
    }
}

// ============ Kurtosis ============

pub struct Kurtosis;

static KURTOSIS_ARGS: [ArgMeta; 1] = [ArgMeta::required("values", "List<Number> | Number...", "Numbers")];

static KURTOSIS_EXAMPLES: [&str; 1] = ["kurtosis([1,2,3,4,5,6,7,8,9]) → -1.2 (flat)"];

static KURTOSIS_RELATED: [&str; 2] = ["skewness", "moments"];

impl FunctionPlugin for Kurtosis {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "kurtosis",
            description: "Adjusted excess kurtosis (G2, normal = 0)",
            usage: "kurtosis(values)",
            args: &KURTOSIS_ARGS,
            returns: "Number",
            examples: &KURTOSIS_EXAMPLES,
            category: "stats/shape",
            related: &KURTOSIS_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        let numbers = match extract_finite(args) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if let Err(e) = require_min_count(&numbers, 4, "kurtosis") {
            return Value::Error(e);
        }
        Value::Number(kurtosis(&numbers))
    }
}

// ============ Moments ============

pub struct MomentsFn;

static MOMENTS_ARGS: [ArgMeta; 1] = [ArgMeta::required("values", "List<Number> | Number...", "Numbers")];

static MOMENTS_EXAMPLES: [&str; 1] = ["moments([1,2,3,4,10]) → {n, mean, std, skewness, kurtosis}"];

static MOMENTS_RELATED: [&str; 2] = ["skewness", "kurtosis"];

impl FunctionPlugin for MomentsFn {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "moments",
            description: "Count, mean, sample std, skewness and excess kurtosis",
            usage: "moments(values)",
            args: &MOMENTS_ARGS,
            returns: "Object",
            examples: &MOMENTS_EXAMPLES,
            category: "stats/shape",
            related: &MOMENTS_RELATED,
        }
    }

    fn call(&self, args: &[Value], _ctx: &EvalContext) -> Value {
        match extract_finite(args) {
            Ok(n) => Moments::of(&n).to_value(),
            Err(e) => Value::Error(e),
        }
    }
}
