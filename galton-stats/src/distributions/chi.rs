//! Chi-squared distribution

use super::special::gamma_q;

/// Upper tail P(X > x) for `df` degrees of freedom
pub fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    gamma_q(df / 2.0, x / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chi2_sf() {
        // df = 2 is exponential with mean 2
        assert!((chi2_sf(4.0, 2.0) - (-2.0f64).exp()).abs() < 1e-12);
        // 95th percentile of chi2(3) = 7.814728
        assert!((chi2_sf(7.814728, 3.0) - 0.05).abs() < 1e-6);
    }
}
