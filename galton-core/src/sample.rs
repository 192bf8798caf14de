//! Univariate samples

use serde::{Deserialize, Serialize};

/// Raw observations with a display name. May contain missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    name: String,
    values: Vec<f64>,
}

impl Sample {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self { name: name.into(), values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every non-finite observation
    pub fn clean(&self) -> CleanSample {
        CleanSample::from_raw(self.name.clone(), &self.values)
    }
}

impl From<Vec<f64>> for Sample {
    fn from(values: Vec<f64>) -> Self {
        Self::new("Data", values)
    }
}

/// A sample with missing values removed. Order of the remaining
/// observations is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSample {
    name: String,
    values: Vec<f64>,
    dropped: usize,
}

impl CleanSample {
    pub fn from_raw(name: impl Into<String>, raw: &[f64]) -> Self {
        let values: Vec<f64> = raw.iter().copied().filter(|x| x.is_finite()).collect();
        Self {
            name: name.into(),
            dropped: raw.len() - values.len(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of entries removed from the raw sample
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_drops_non_finite() {
        let raw = Sample::new("x", vec![1.0, f64::NAN, 3.0, f64::INFINITY, -2.0]);
        let clean = raw.clean();
        assert_eq!(clean.as_slice(), &[1.0, 3.0, -2.0]);
        assert_eq!(clean.dropped(), 2);
        assert_eq!(raw.len() - clean.len(), clean.dropped());
        assert_eq!(clean.name(), "x");
    }

    #[test]
    fn test_min_max() {
        let clean = CleanSample::from_raw("x", &[4.0, -1.0, 9.5]);
        assert_eq!(clean.min(), Some(-1.0));
        assert_eq!(clean.max(), Some(9.5));
        assert_eq!(CleanSample::from_raw("e", &[]).min(), None);
    }

    #[test]
    fn test_default_name() {
        let s = Sample::from(vec![1.0]);
        assert_eq!(s.name(), "Data");
    }
}
