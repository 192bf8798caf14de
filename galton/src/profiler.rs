//! Distribution profiling of a single sample
//!
//! `DistributionProfiler` owns a clean copy of the sample and answers four
//! questions about it: what are its moments, which observations look like
//! outliers, how many modes does its density have, and is it plausibly
//! normal. Every operation is pure; calling one twice gives the same answer.

use galton_core::{codes, CleanSample, Diagnostic, GaltonError, Sample};
use galton_plugin::AdvisorConfig;
use galton_stats::density::{count_peaks, GaussianKde};
use galton_stats::goodness::{jarque_bera, lilliefors, shapiro_wilk};
use galton_stats::outliers::{iqr_outliers, zscore_outliers};
use galton_stats::shape::{skewness, Moments};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// z-score cut-off; the caller's threshold does not apply to this method
const ZSCORE_THRESHOLD: f64 = 3.0;

// ============ Labels ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkewLabel {
    #[serde(rename = "Symmetric")]
    Symmetric,
    #[serde(rename = "Moderately Positively Skewed")]
    ModeratelyPositive,
    #[serde(rename = "Moderately Negatively Skewed")]
    ModeratelyNegative,
    #[serde(rename = "Highly Positively Skewed")]
    HighlyPositive,
    #[serde(rename = "Highly Negatively Skewed")]
    HighlyNegative,
}

impl SkewLabel {
    /// Bands are closed toward zero, so exactly ±0.5 is symmetric and
    /// exactly ±1 is moderate. NaN is symmetric.
    pub fn classify(skew: f64) -> Self {
        if skew > 1.0 {
            SkewLabel::HighlyPositive
        } else if skew > 0.5 {
            SkewLabel::ModeratelyPositive
        } else if skew < -1.0 {
            SkewLabel::HighlyNegative
        } else if skew < -0.5 {
            SkewLabel::ModeratelyNegative
        } else {
            SkewLabel::Symmetric
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkewLabel::Symmetric => "Symmetric",
            SkewLabel::ModeratelyPositive => "Moderately Positively Skewed",
            SkewLabel::ModeratelyNegative => "Moderately Negatively Skewed",
            SkewLabel::HighlyPositive => "Highly Positively Skewed",
            SkewLabel::HighlyNegative => "Highly Negatively Skewed",
        }
    }
}

impl fmt::Display for SkewLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Excess kurtosis band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KurtosisLabel {
    Mesokurtic,
    Leptokurtic,
    Platykurtic,
}

impl KurtosisLabel {
    pub fn classify(kurtosis: f64) -> Self {
        if kurtosis > 1.0 {
            KurtosisLabel::Leptokurtic
        } else if kurtosis < -1.0 {
            KurtosisLabel::Platykurtic
        } else {
            KurtosisLabel::Mesokurtic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KurtosisLabel::Mesokurtic => "Mesokurtic",
            KurtosisLabel::Leptokurtic => "Leptokurtic",
            KurtosisLabel::Platykurtic => "Platykurtic",
        }
    }

    /// Longer reading for reports
    pub fn describe(&self) -> &'static str {
        match self {
            KurtosisLabel::Mesokurtic => "Mesokurtic (Normal-like)",
            KurtosisLabel::Leptokurtic => "Leptokurtic (Heavy tails/Peaked)",
            KurtosisLabel::Platykurtic => "Platykurtic (Light tails/Flat)",
        }
    }
}

impl fmt::Display for KurtosisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moments plus their labels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Description {
    #[serde(flatten)]
    pub moments: Moments,
    pub skew_label: SkewLabel,
    pub kurtosis_label: KurtosisLabel,
}

// ============ Outliers ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    Iqr,
    Zscore,
}

impl FromStr for OutlierMethod {
    type Err = GaltonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iqr" => Ok(OutlierMethod::Iqr),
            "zscore" | "z-score" | "z" => Ok(OutlierMethod::Zscore),
            _ => Err(GaltonError::invalid_argument(format!("Unsupported outlier method '{}'", s))
                .with_suggestion("Use \"iqr\" or \"zscore\"")),
        }
    }
}

/// Flagged observations of a clean sample. Indices refer to positions in
/// the clean sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierSet {
    pub method: OutlierMethod,
    pub threshold: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl OutlierSet {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============ Modality / normality ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Modality {
    Unimodal,
    Bimodal,
    Multimodal,
}

impl Modality {
    pub fn from_peaks(peaks: usize) -> Self {
        match peaks {
            0 | 1 => Modality::Unimodal,
            2 => Modality::Bimodal,
            _ => Modality::Multimodal,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modality::Unimodal => "Unimodal",
            Modality::Bimodal => "Bimodal",
            Modality::Multimodal => "Multimodal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityVerdict {
    pub shapiro_p: f64,
    pub lilliefors_p: f64,
    pub jarque_bera_p: f64,
    /// Decided by Shapiro-Wilk alone
    pub is_normal: bool,
    pub modality: Modality,
    pub peak_count: usize,
    pub advice: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything the profiler knows about one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub n: usize,
    pub dropped: usize,
    pub description: Description,
    pub outliers: OutlierSet,
    pub normality: NormalityVerdict,
}

// ============ Profiler ============

#[derive(Debug, Clone)]
pub struct DistributionProfiler {
    sample: CleanSample,
    config: AdvisorConfig,
}

impl DistributionProfiler {
    pub fn new(sample: &Sample) -> Self {
        Self {
            sample: sample.clean(),
            config: AdvisorConfig::default(),
        }
    }

    pub fn from_slice(name: impl Into<String>, values: &[f64]) -> Self {
        Self {
            sample: CleanSample::from_raw(name, values),
            config: AdvisorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AdvisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sample(&self) -> &CleanSample {
        &self.sample
    }

    pub fn moments(&self) -> Description {
        let moments = Moments::of(self.sample.as_slice());
        Description {
            skew_label: SkewLabel::classify(moments.skewness),
            kurtosis_label: KurtosisLabel::classify(moments.kurtosis),
            moments,
        }
    }

    /// Flag outliers by `"iqr"` (fence multiplier `threshold`, default from
    /// the config) or `"zscore"` (|z| > 3, `threshold` ignored)
    pub fn detect_outliers(&self, method: &str, threshold: Option<f64>) -> Result<OutlierSet, GaltonError> {
        let method: OutlierMethod = method.parse()?;
        if self.sample.is_empty() {
            return Err(GaltonError::degenerate_sample(format!(
                "'{}' has no observations to screen for outliers",
                self.sample.name()
            )));
        }

        let data = self.sample.as_slice();
        let (threshold, found) = match method {
            OutlierMethod::Iqr => {
                let k = threshold.unwrap_or(self.config.iqr_threshold);
                if k.is_nan() || k < 0.0 {
                    return Err(GaltonError::invalid_argument(format!(
                        "IQR multiplier must be non-negative, got {}",
                        k
                    )));
                }
                (k, iqr_outliers(data, k))
            }
            OutlierMethod::Zscore => (ZSCORE_THRESHOLD, zscore_outliers(data, ZSCORE_THRESHOLD)),
        };
        debug!(sample = self.sample.name(), ?method, count = found.count(), "outlier screen");

        Ok(OutlierSet {
            method,
            threshold,
            lower_fence: found.lower,
            upper_fence: found.upper,
            indices: found.indices,
            values: found.values,
        })
    }

    /// Count modes of a Gaussian KDE evaluated over [min, max]
    pub fn detect_modality(&self) -> Result<(usize, Modality), GaltonError> {
        let kde = GaussianKde::new(self.sample.as_slice())?;
        let (_, density) = kde.grid(self.config.kde_grid_points);
        let peaks = count_peaks(&density);
        Ok((peaks, Modality::from_peaks(peaks)))
    }

    pub fn assess_normality(&self) -> Result<NormalityVerdict, GaltonError> {
        let data = self.sample.as_slice();
        let n = data.len();
        if n < 3 {
            return Err(GaltonError::degenerate_sample(format!(
                "normality tests need at least 3 observations, '{}' has {}",
                self.sample.name(),
                n
            )));
        }

        let mut diagnostics = Vec::new();
        if n >= self.config.large_sample_warning {
            let diagnostic = Diagnostic::large_sample(n, self.config.large_sample_warning);
            warn!(sample = self.sample.name(), n, "{}", diagnostic.message);
            diagnostics.push(diagnostic);
        }

        let shapiro = shapiro_wilk(data)?;
        let ks = lilliefors(data)?;
        let jb = jarque_bera(data)?;
        let (peak_count, modality) = self.detect_modality()?;

        let is_normal = shapiro.p_value > self.config.alpha;
        let advice = self.advice(is_normal, modality, peak_count);
        debug!(
            sample = self.sample.name(),
            shapiro_p = shapiro.p_value,
            is_normal,
            %modality,
            "normality assessed"
        );

        Ok(NormalityVerdict {
            shapiro_p: shapiro.p_value,
            lilliefors_p: ks.p_value,
            jarque_bera_p: jb.p_value,
            is_normal,
            modality,
            peak_count,
            advice,
            diagnostics,
        })
    }

    fn advice(&self, is_normal: bool, modality: Modality, peaks: usize) -> String {
        if is_normal {
            return "Data appears Normal. Proceed with Parametric Tests.".to_string();
        }

        let mut advice = String::from("Data is NOT Normal. ");
        if modality != Modality::Unimodal {
            advice.push_str(&format!(
                "Data appears {} ({} peaks). Consider mixture models or splitting data. ",
                modality, peaks
            ));
        }

        let skew = skewness(self.sample.as_slice());
        let positive_only = self.sample.min().is_some_and(|m| m > 0.0);
        advice.push_str(if skew > 1.0 && positive_only {
            "Positive Skew: Consider Log or Box-Cox Transform."
        } else if skew > 1.0 {
            "Positive Skew: Consider Square Root (if >=0) or Non-parametric tests."
        } else if skew < -1.0 {
            "Negative Skew: Consider Reflect & Log or Non-parametric tests."
        } else {
            "Consider Non-parametric tests."
        });
        advice
    }

    pub fn profile(&self) -> Result<Profile, GaltonError> {
        Ok(Profile {
            name: self.sample.name().to_string(),
            n: self.sample.len(),
            dropped: self.sample.dropped(),
            description: self.moments(),
            outliers: self.detect_outliers("iqr", None)?,
            normality: self.assess_normality()?,
        })
    }
}

/// True when the error is a statistical inapplicability rather than misuse
pub(crate) fn is_degenerate(err: &GaltonError) -> bool {
    err.is(codes::DEGENERATE_SAMPLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use galton_stats::distributions::normal_ppf;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, LogNormal, Normal};

    fn normal_quantiles(n: usize, mean: f64, sd: f64) -> Vec<f64> {
        (0..n).map(|i| mean + sd * normal_ppf((i as f64 + 0.5) / n as f64)).collect()
    }

    fn lognormal_quantiles(n: usize) -> Vec<f64> {
        normal_quantiles(n, 0.0, 1.0).into_iter().map(f64::exp).collect()
    }

    fn two_clusters() -> Vec<f64> {
        let mut data = normal_quantiles(100, 0.0, 1.0);
        data.extend(normal_quantiles(100, 10.0, 1.0));
        data
    }

    #[test]
    fn test_skew_label_boundaries() {
        assert_eq!(SkewLabel::classify(0.5), SkewLabel::Symmetric);
        assert_eq!(SkewLabel::classify(-0.5), SkewLabel::Symmetric);
        assert_eq!(SkewLabel::classify(0.50001), SkewLabel::ModeratelyPositive);
        assert_eq!(SkewLabel::classify(1.0), SkewLabel::ModeratelyPositive);
        assert_eq!(SkewLabel::classify(-1.0), SkewLabel::ModeratelyNegative);
        assert_eq!(SkewLabel::classify(1.00001), SkewLabel::HighlyPositive);
        assert_eq!(SkewLabel::classify(-1.00001), SkewLabel::HighlyNegative);
        assert_eq!(SkewLabel::classify(f64::NAN), SkewLabel::Symmetric);
    }

    #[test]
    fn test_kurtosis_label_boundaries() {
        assert_eq!(KurtosisLabel::classify(1.0), KurtosisLabel::Mesokurtic);
        assert_eq!(KurtosisLabel::classify(-1.0), KurtosisLabel::Mesokurtic);
        assert_eq!(KurtosisLabel::classify(1.5), KurtosisLabel::Leptokurtic);
        assert_eq!(KurtosisLabel::classify(-1.2), KurtosisLabel::Platykurtic);
        assert_eq!(KurtosisLabel::classify(f64::NAN), KurtosisLabel::Mesokurtic);
    }

    #[test]
    fn test_labels_serialize_as_display_names() {
        let json = serde_json::to_string(&SkewLabel::HighlyPositive).unwrap();
        assert_eq!(json, "\"Highly Positively Skewed\"");
    }

    #[test]
    fn test_missing_values_dropped() {
        let p = DistributionProfiler::new(&Sample::new("rt", vec![1.0, f64::NAN, 2.0, f64::INFINITY, 4.0]));
        assert_eq!(p.sample().len(), 3);
        assert_eq!(p.sample().dropped(), 2);
        let d = p.moments();
        assert!((d.moments.mean - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_iqr_normal_vs_lognormal() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(100.0, 15.0).unwrap();
        let lognormal = LogNormal::new(0.0, 1.0).unwrap();
        let a: Vec<f64> = (0..200).map(|_| normal.sample(&mut rng)).collect();
        let b: Vec<f64> = (0..200).map(|_| lognormal.sample(&mut rng)).collect();

        let on_normal = DistributionProfiler::from_slice("normal", &a).detect_outliers("iqr", None).unwrap();
        let on_lognormal = DistributionProfiler::from_slice("lognormal", &b).detect_outliers("IQR", None).unwrap();
        assert!(on_normal.len() <= 10, "normal flagged {}", on_normal.len());
        assert!(
            on_lognormal.len() > on_normal.len() + 3,
            "lognormal flagged {} vs {}",
            on_lognormal.len(),
            on_normal.len()
        );
        assert_eq!(on_normal.threshold, 1.5);
    }

    #[test]
    fn test_outlier_indices_point_into_clean_sample() {
        let p = DistributionProfiler::from_slice("x", &[1.0, f64::NAN, 2.0, 3.0, 2.0, 100.0]);
        let set = p.detect_outliers("iqr", Some(1.5)).unwrap();
        assert_eq!(set.indices, vec![4]);
        assert_eq!(set.values, vec![100.0]);
        assert_eq!(p.sample().as_slice()[4], 100.0);
    }

    #[test]
    fn test_zscore_ignores_threshold() {
        let mut data = vec![0.0; 30];
        data.push(50.0);
        let p = DistributionProfiler::from_slice("x", &data);
        let set = p.detect_outliers("zscore", Some(100.0)).unwrap();
        assert_eq!(set.threshold, 3.0);
        assert_eq!(set.values, vec![50.0]);

        let flat = DistributionProfiler::from_slice("flat", &[2.0; 10]);
        assert!(flat.detect_outliers("zscore", None).unwrap().is_empty());
    }

    #[test]
    fn test_outlier_errors() {
        let p = DistributionProfiler::from_slice("x", &[1.0, 2.0, 3.0]);
        let err = p.detect_outliers("mad", None).unwrap_err();
        assert!(err.is(codes::INVALID_ARGUMENT));

        let empty = DistributionProfiler::from_slice("e", &[f64::NAN]);
        let err = empty.detect_outliers("iqr", None).unwrap_err();
        assert!(err.is(codes::DEGENERATE_SAMPLE));

        let err = p.detect_outliers("iqr", Some(-0.5)).unwrap_err();
        assert!(err.is(codes::INVALID_ARGUMENT));
    }

    #[test]
    fn test_zero_iqr_multiplier_fences_at_quartiles() {
        let p = DistributionProfiler::from_slice("x", &[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]);
        let out = p.detect_outliers("iqr", Some(0.0)).unwrap();
        assert_eq!(out.lower_fence, 2.25);
        assert_eq!(out.upper_fence, 4.75);
        assert_eq!(out.indices, vec![0, 1, 4, 5]);
    }

    #[test]
    fn test_modality() {
        let uni = DistributionProfiler::from_slice("u", &normal_quantiles(100, 0.0, 1.0));
        assert_eq!(uni.detect_modality().unwrap(), (1, Modality::Unimodal));

        let bi = DistributionProfiler::from_slice("b", &two_clusters());
        assert_eq!(bi.detect_modality().unwrap(), (2, Modality::Bimodal));

        assert_eq!(Modality::from_peaks(0), Modality::Unimodal);
        assert_eq!(Modality::from_peaks(5), Modality::Multimodal);
    }

    #[test]
    fn test_modality_degenerate() {
        let p = DistributionProfiler::from_slice("c", &[3.0, 3.0, 3.0]);
        assert!(is_degenerate(&p.detect_modality().unwrap_err()));
    }

    #[test]
    fn test_normal_data_advice() {
        let p = DistributionProfiler::from_slice("n", &normal_quantiles(100, 50.0, 5.0));
        let v = p.assess_normality().unwrap();
        assert!(v.is_normal);
        assert_eq!(v.modality, Modality::Unimodal);
        assert_eq!(v.advice, "Data appears Normal. Proceed with Parametric Tests.");
        assert!(v.diagnostics.is_empty());
    }

    #[test]
    fn test_positive_skew_advice() {
        let v = DistributionProfiler::from_slice("ln", &lognormal_quantiles(200)).assess_normality().unwrap();
        assert!(!v.is_normal);
        assert!(v.advice.starts_with("Data is NOT Normal. "));
        assert!(v.advice.ends_with("Positive Skew: Consider Log or Box-Cox Transform."));

        let shifted: Vec<f64> = lognormal_quantiles(200).into_iter().map(|x| x - 1.0).collect();
        let v = DistributionProfiler::from_slice("shifted", &shifted).assess_normality().unwrap();
        assert!(v.advice.ends_with("Positive Skew: Consider Square Root (if >=0) or Non-parametric tests."));
    }

    #[test]
    fn test_negative_skew_advice() {
        let reflected: Vec<f64> = lognormal_quantiles(200).into_iter().map(|x| -x).collect();
        let v = DistributionProfiler::from_slice("neg", &reflected).assess_normality().unwrap();
        assert!(!v.is_normal);
        assert!(v.advice.ends_with("Negative Skew: Consider Reflect & Log or Non-parametric tests."));
    }

    #[test]
    fn test_bimodal_advice() {
        let v = DistributionProfiler::from_slice("bi", &two_clusters()).assess_normality().unwrap();
        assert!(!v.is_normal);
        assert_eq!(
            v.advice,
            "Data is NOT Normal. Data appears Bimodal (2 peaks). Consider mixture models or splitting data. \
             Consider Non-parametric tests."
        );
    }

    #[test]
    fn test_assess_normality_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let dist = LogNormal::new(1.0, 0.6).unwrap();
        let data: Vec<f64> = (0..150).map(|_| dist.sample(&mut rng)).collect();
        let p = DistributionProfiler::from_slice("x", &data);
        assert_eq!(p.assess_normality().unwrap(), p.assess_normality().unwrap());
    }

    #[test]
    fn test_large_sample_diagnostic() {
        let config = AdvisorConfig {
            large_sample_warning: 50,
            ..AdvisorConfig::default()
        };
        let p = DistributionProfiler::from_slice("big", &normal_quantiles(60, 0.0, 1.0)).with_config(config);
        let v = p.assess_normality().unwrap();
        assert_eq!(v.diagnostics.len(), 1);
        assert_eq!(v.diagnostics[0].code, codes::LARGE_SAMPLE);
        assert!(v.shapiro_p > 0.0);
    }

    #[test]
    fn test_large_sample_boundary_is_inclusive() {
        let config = AdvisorConfig {
            large_sample_warning: 50,
            ..AdvisorConfig::default()
        };
        let at = DistributionProfiler::from_slice("at", &normal_quantiles(50, 0.0, 1.0)).with_config(config.clone());
        let v = at.assess_normality().unwrap();
        assert_eq!(v.diagnostics.len(), 1);
        assert_eq!(v.diagnostics[0].code, codes::LARGE_SAMPLE);

        let below = DistributionProfiler::from_slice("below", &normal_quantiles(49, 0.0, 1.0)).with_config(config);
        assert!(below.assess_normality().unwrap().diagnostics.is_empty());
    }

    #[test]
    fn test_too_few_points() {
        let err = DistributionProfiler::from_slice("x", &[1.0, 2.0]).assess_normality().unwrap_err();
        assert!(err.is(codes::DEGENERATE_SAMPLE));
    }

    #[test]
    fn test_profile_bundles_everything() {
        let mut data = normal_quantiles(80, 10.0, 2.0);
        data.push(f64::NAN);
        let profile = DistributionProfiler::from_slice("x", &data).profile().unwrap();
        assert_eq!(profile.n, 80);
        assert_eq!(profile.dropped, 1);
        assert_eq!(profile.outliers.method, OutlierMethod::Iqr);
        assert!(profile.normality.is_normal);
        assert_eq!(profile.description.skew_label, SkewLabel::Symmetric);
    }
}
