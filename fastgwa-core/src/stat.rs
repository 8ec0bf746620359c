//! Statistical helpers.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Upper-tail p-value of a 1-df chi-squared statistic.
pub fn pchisq_1df(x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let chi2 = ChiSquared::new(1.0).unwrap();
    1.0 - chi2.cdf(x)
}
