//! Continuous distributions used for p-values: normal, t, chi-squared, F

pub mod chi;
pub mod f;
pub mod normal;
pub mod special;
pub mod t;

pub use chi::chi2_sf;
pub use f::f_sf;
pub use normal::{normal_cdf, normal_pdf, normal_ppf, normal_sf};
pub use t::{t_cdf, t_sf, t_two_sided};
