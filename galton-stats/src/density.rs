//! Gaussian kernel density estimation and peak counting

use crate::helpers::{distinct_count, extract_finite, optional_number, std_dev};
use galton_plugin::prelude::*;
use std::f64::consts::PI;

/// Gaussian KDE with Scott's rule bandwidth
#[derive(Debug, Clone)]
pub struct GaussianKde<'a> {
    data: &'a [f64],
    bandwidth: f64,
}

impl<'a> GaussianKde<'a> {
    /// Fails for fewer than two distinct values or zero variance
    pub fn new(data: &'a [f64]) -> Result<Self, GaltonError> {
        if distinct_count(data) < 2 {
            return Err(GaltonError::degenerate_sample(
                "density estimation needs at least two distinct values",
            ));
        }
        let bandwidth = scott_bandwidth(data);
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(GaltonError::degenerate_sample("density estimation needs non-zero variance"));
        }
        Ok(Self { data, bandwidth })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1.0 / (self.data.len() as f64 * h * (2.0 * PI).sqrt());
        let sum: f64 = self
            .data
            .iter()
            .map(|xi| {
                let u = (x - xi) / h;
                (-0.5 * u * u).exp()
            })
            .sum();
        norm * sum
    }

    /// Density on `points` evenly spaced values spanning [min, max]
    pub fn grid(&self, points: usize) -> (Vec<f64>, Vec<f64>) {
        let min = self.data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let points = points.max(2);
        let step = (max - min) / (points - 1) as f64;
        let xs: Vec<f64> = (0..points).map(|i| min + step * i as f64).collect();
        let ys = xs.iter().map(|&x| self.evaluate(x)).collect();
        (xs, ys)
    }
}

/// Scott's rule: h = s · n^(-1/5), s the sample standard deviation
pub fn scott_bandwidth(data: &[f64]) -> f64 {
    std_dev(data) * (data.len() as f64).powf(-0.2)
}

/// Count strict interior local maxima
pub fn count_peaks(ys: &[f64]) -> usize {
    ys.windows(3).filter(|w| w[1] > w[0] && w[1] > w[2]).count()
}

// ============ KdePeaks ============

pub struct KdePeaks;

static KDE_PEAKS_ARGS: [ArgMeta; 2] = [
    ArgMeta::required("list", "List", "Data values"),
    ArgMeta::optional("points", "Number", "Grid size over [min, max]", "1000"),
];
static KDE_PEAKS_EXAMPLES: [&str; 1] = ["kde_peaks([1,1.2,0.9,5,5.1,4.8]) → {peaks: 2, bandwidth}"];
static KDE_PEAKS_RELATED: [&str; 1] = ["shapiro_wilk"];

impl FunctionPlugin for KdePeaks {
    fn meta(&self) -> FunctionMeta {
        FunctionMeta {
            name: "kde_peaks",
            description: "Number of modes in a Gaussian kernel density estimate",
            usage: "kde_peaks(list, points?)",
            args: &KDE_PEAKS_ARGS,
            returns: "Object",
            examples: &KDE_PEAKS_EXAMPLES,
            category: "stats/distribution",
            related: &KDE_PEAKS_RELATED,
        }
    }

    fn call(&self, args: &[Value], ctx: &EvalContext) -> Value {
        if args.is_empty() || args.len() > 2 {
            return Value::Error(GaltonError::arg_count("kde_peaks", 1, args.len()));
        }
        let numbers = match extract_finite(&args[0..1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let points = match optional_number(args, 1, "kde_peaks", "points", ctx.config.kde_grid_points as f64) {
            Ok(p) if p >= 3.0 => p as usize,
            Ok(_) => return Value::Error(GaltonError::invalid_argument("kde_peaks() needs at least 3 grid points")),
            Err(e) => return Value::Error(e),
        };
        let kde = match GaussianKde::new(&numbers) {
            Ok(k) => k,
            Err(e) => return Value::Error(e.in_function("kde_peaks")),
        };
        let (_, ys) = kde.grid(points);
        Value::object([
            ("peaks", Value::from(count_peaks(&ys))),
            ("bandwidth", Value::Number(kde.bandwidth())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_ctx() -> EvalContext {
        EvalContext::new(std::sync::Arc::new(PluginRegistry::new()))
    }

    fn cluster(center: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| center + (i as f64 - n as f64 / 2.0) * 0.05).collect()
    }

    #[test]
    fn test_count_peaks_strict() {
        assert_eq!(count_peaks(&[0.0, 1.0, 0.0, 2.0, 0.0]), 2);
        // Plateau is not a strict maximum
        assert_eq!(count_peaks(&[0.0, 1.0, 1.0, 0.0]), 0);
        assert_eq!(count_peaks(&[1.0, 2.0]), 0);
    }

    #[test]
    fn test_unimodal_cluster() {
        let data = cluster(10.0, 40);
        let kde = GaussianKde::new(&data).unwrap();
        let (_, ys) = kde.grid(1000);
        assert_eq!(count_peaks(&ys), 1);
    }

    #[test]
    fn test_bimodal_clusters() {
        let mut data = cluster(0.0, 40);
        data.extend(cluster(20.0, 40));
        let kde = GaussianKde::new(&data).unwrap();
        let (_, ys) = kde.grid(1000);
        assert_eq!(count_peaks(&ys), 2);
    }

    #[test]
    fn test_density_integrates_to_about_one() {
        let data = cluster(0.0, 30);
        let kde = GaussianKde::new(&data).unwrap();
        let h = kde.bandwidth();
        let lo = -0.75 - 8.0 * h;
        let step = (1.5 + 16.0 * h) / 2000.0;
        let area: f64 = (0..2000).map(|i| kde.evaluate(lo + step * i as f64) * step).sum();
        assert!((area - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(GaussianKde::new(&[1.0, 1.0, 1.0]).is_err());
        let err = KdePeaks.call(&[Value::numbers(&[2.0])], &eval_ctx());
        assert_eq!(err.as_error().map(|e| e.code.as_str()), Some(codes::DEGENERATE_SAMPLE));
    }
}
