//! Helper functions for statistical operations
//!
//! Common utilities for extracting and validating inputs.

use galton_core::{GaltonError, Value};
use serde::Serialize;
use std::collections::HashMap;

/// Statistic and two-sided p-value of a hypothesis test
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub df: Option<f64>,
}

impl TestResult {
    pub fn new(statistic: f64, p_value: f64) -> Self {
        Self { statistic, p_value, df: None }
    }

    pub fn with_df(mut self, df: f64) -> Self {
        self.df = Some(df);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut result = HashMap::new();
        result.insert("statistic".to_string(), Value::Number(self.statistic));
        result.insert("p_value".to_string(), Value::Number(self.p_value));
        if let Some(df) = self.df {
            result.insert("df".to_string(), Value::Number(df));
        }
        Value::Object(result)
    }
}

/// Extract numbers from arguments, handling both varargs and List.
/// Nulls become NaN so callers can drop them like any missing value.
pub fn extract_numbers(args: &[Value]) -> Result<Vec<f64>, GaltonError> {
    let mut numbers = Vec::new();

    for arg in args {
        match arg {
            Value::Number(n) => numbers.push(*n),
            Value::Null => numbers.push(f64::NAN),
            Value::List(list) => {
                for item in list {
                    match item {
                        Value::Number(n) => numbers.push(*n),
                        Value::Null => numbers.push(f64::NAN),
                        Value::Error(e) => return Err(e.clone()),
                        other => return Err(GaltonError::type_error("Number", other.type_name())),
                    }
                }
            }
            Value::Error(e) => return Err(e.clone()),
            other => return Err(GaltonError::type_error("Number or List", other.type_name())),
        }
    }

    Ok(numbers)
}

/// Extract finite numbers only
pub fn extract_finite(args: &[Value]) -> Result<Vec<f64>, GaltonError> {
    Ok(extract_numbers(args)?.into_iter().filter(|x| x.is_finite()).collect())
}

/// Extract each argument as its own group of finite numbers
pub fn extract_groups(args: &[Value], func: &str) -> Result<Vec<Vec<f64>>, GaltonError> {
    args.iter()
        .map(|arg| match arg {
            Value::List(_) => extract_finite(std::slice::from_ref(arg)),
            Value::Error(e) => Err(e.clone()),
            other => Err(GaltonError::arg_type(func, "group", "List", other.type_name())),
        })
        .collect()
}

/// Optional numeric argument at `index`, falling back to `default`
pub fn optional_number(args: &[Value], index: usize, func: &str, name: &str, default: f64) -> Result<f64, GaltonError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => Ok(*n),
        Some(Value::Error(e)) => Err(e.clone()),
        Some(other) => Err(GaltonError::arg_type(func, name, "Number", other.type_name())),
    }
}

/// Require minimum count
pub fn require_min_count(numbers: &[f64], min: usize, func: &str) -> Result<(), GaltonError> {
    if numbers.len() < min {
        return Err(GaltonError::degenerate_sample(format!(
            "{}() requires at least {} values, got {}",
            func,
            min,
            numbers.len()
        )));
    }
    Ok(())
}

pub fn sum(numbers: &[f64]) -> f64 {
    numbers.iter().sum()
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean(numbers: &[f64]) -> f64 {
    if numbers.is_empty() {
        return f64::NAN;
    }
    sum(numbers) / numbers.len() as f64
}

/// Variance with `ddof` delta degrees of freedom; NaN when undefined
pub fn variance(numbers: &[f64], ddof: usize) -> f64 {
    let n = numbers.len();
    if n <= ddof {
        return f64::NAN;
    }
    let m = mean(numbers);
    let ss: f64 = numbers.iter().map(|x| (x - m) * (x - m)).sum();
    ss / (n - ddof) as f64
}

/// Sample standard deviation (n - 1)
pub fn std_dev(numbers: &[f64]) -> f64 {
    variance(numbers, 1).sqrt()
}

/// Central moment of order `k` about the mean, population normalised
pub fn central_moment(numbers: &[f64], k: i32) -> f64 {
    let m = mean(numbers);
    numbers.iter().map(|x| (x - m).powi(k)).sum::<f64>() / numbers.len() as f64
}

/// Sort numbers (returns new sorted vector). Input must not contain NaN.
pub fn sorted(numbers: &[f64]) -> Vec<f64> {
    let mut sorted = numbers.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Quantile of already sorted data using linear interpolation between
/// closest ranks, `q` in [0, 1]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(numbers: &[f64]) -> f64 {
    quantile_sorted(&sorted(numbers), 0.5)
}

/// Calculate ranks (1-indexed, average for ties)
pub fn ranks(numbers: &[f64]) -> Vec<f64> {
    let n = numbers.len();
    let mut indexed: Vec<(f64, usize)> = numbers.iter().copied().zip(0..n).collect();
    indexed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut result = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && indexed[j].0 == indexed[i].0 {
            j += 1;
        }
        // Average of ranks i+1..=j
        let avg_rank = (i + j + 1) as f64 / 2.0;
        for item in &indexed[i..j] {
            result[item.1] = avg_rank;
        }
        i = j;
    }
    result
}

/// Sum of t^3 - t over tie groups, used by rank-test tie corrections
pub fn tie_term(numbers: &[f64]) -> f64 {
    let s = sorted(numbers);
    let mut total = 0.0;
    let mut i = 0;
    while i < s.len() {
        let mut j = i;
        while j < s.len() && s[j] == s[i] {
            j += 1;
        }
        let t = (j - i) as f64;
        total += t * t * t - t;
        i = j;
    }
    total
}

/// Number of distinct values
pub fn distinct_count(numbers: &[f64]) -> usize {
    let s = sorted(numbers);
    let mut count = 0;
    let mut prev: Option<f64> = None;
    for x in s {
        if prev != Some(x) {
            count += 1;
            prev = Some(x);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_numbers_list() {
        let args = vec![Value::List(vec![
            Value::Number(1.0),
            Value::Null,
            Value::Number(3.0),
        ])];
        let result = extract_numbers(&args).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result[1].is_nan());
        assert_eq!(extract_finite(&args).unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_extract_rejects_text() {
        let args = vec![Value::List(vec![Value::from("a")])];
        assert!(extract_numbers(&args).is_err());
    }

    #[test]
    fn test_mean_and_variance() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&xs), 5.0);
        assert_eq!(variance(&xs, 0), 4.0);
        assert!((variance(&xs, 1) - 32.0 / 7.0).abs() < 1e-12);
        assert!(variance(&[1.0], 1).is_nan());
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let s = sorted(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(quantile_sorted(&s, 0.25), 1.75);
        assert_eq!(quantile_sorted(&s, 0.5), 2.5);
        assert_eq!(quantile_sorted(&s, 0.75), 3.25);
        assert_eq!(quantile_sorted(&[7.0], 0.3), 7.0);
    }

    #[test]
    fn test_ranks_average_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_tie_term_and_distinct() {
        assert_eq!(tie_term(&[1.0, 1.0, 2.0, 3.0, 3.0, 3.0]), 6.0 + 24.0);
        assert_eq!(distinct_count(&[1.0, 1.0, 2.0]), 2);
    }
}
