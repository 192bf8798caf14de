//! Student's t distribution

use super::special::beta_inc;

pub fn t_cdf(x: f64, df: f64) -> f64 {
    let tail = 0.5 * beta_inc(df / 2.0, 0.5, df / (df + x * x));
    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Upper tail P(T > x)
pub fn t_sf(x: f64, df: f64) -> f64 {
    t_cdf(-x, df)
}

/// Two-sided p-value for an observed statistic
pub fn t_two_sided(x: f64, df: f64) -> f64 {
    if x.is_nan() || df.is_nan() {
        return f64::NAN;
    }
    beta_inc(df / 2.0, 0.5, df / (df + x * x)).min(1.0)
}
