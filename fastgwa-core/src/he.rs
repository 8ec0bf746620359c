//! Haseman-Elston regression.
//!
//! Estimates the additive-genetic variance Vg by regressing phenotype
//! cross-products z_ij = y_i * y_j on GRM entries A_ij. Two modes:
//! the full mode treats every sample pair as an observation (with the
//! GRM contributing only its structural nonzeros), the related-pairs
//! mode uses the structural nonzeros alone.

use fastgwa_linalg::decomposition::FullPivLu;
use fastgwa_linalg::{DenseMatrix, SparseMatrix};
use tracing::{info, warn};

use crate::error::FastFamError;
use crate::stat::pchisq_1df;

/// Outcome of an HE regression.
#[derive(Debug, Clone)]
pub struct HeEstimate {
    /// Estimated additive-genetic variance.
    pub vg: f64,
    /// Standard error of the estimate.
    pub se: f64,
    /// P-value of the 1-df chi-squared test of Vg = 0.
    pub pvalue: f64,
    /// Whether Vg passed the significance threshold.
    pub significant: bool,
}

const SIGNIFICANCE_THRESHOLD: f64 = 0.05;

fn finish(vg: f64, se: f64) -> HeEstimate {
    let z = vg / se;
    let pvalue = pchisq_1df(z * z);
    info!("Vg = {:.6}, se = {:.6}, P = {:.6}", vg, se, pvalue);
    HeEstimate {
        vg,
        se,
        pvalue,
        significant: pvalue <= SIGNIFICANCE_THRESHOLD,
    }
}

/// Full-mode HE regression.
///
/// The observation count is n*n, and the dense moment sums (sum of
/// z_ij, sum of z_ij^2) run over every pair i < j while the GRM sums
/// run over the stored strict upper triangle. This asymmetry is kept
/// as-is from the original engine.
pub fn he_full(a: &SparseMatrix, y: &[f64]) -> HeEstimate {
    let n = y.len();
    assert_eq!(a.nrows(), n);

    let size = (n as f64) * (n as f64);

    // Dense pair sums via running prefix moments.
    let mut sum_y = 0.0;
    let mut sum_y2 = 0.0;
    let mut xty0 = 0.0;
    let mut ssy = 0.0;
    for &yi in y {
        xty0 += yi * sum_y;
        ssy += yi * yi * sum_y2;
        sum_y += yi;
        sum_y2 += yi * yi;
    }

    // GRM sums over the stored strict upper triangle.
    let mut xtx01 = 0.0;
    let mut xtx11 = 0.0;
    let mut xty1 = 0.0;
    a.for_each_strict_upper(|i, j, v| {
        xtx01 += v;
        xtx11 += v * v;
        xty1 += v * y[i] * y[j];
    });

    let xtx = DenseMatrix::from_row_major(2, 2, &[size, xtx01, xtx01, xtx11]);
    let xty = [xty0, xty1];

    let lu = FullPivLu::new(&xtx);
    if lu.rank() < 2 {
        warn!("HE normal equations are rank deficient, treating Vg as zero");
        return HeEstimate {
            vg: 0.0,
            se: f64::INFINITY,
            pvalue: 1.0,
            significant: false,
        };
    }

    let betas = lu.solve(&xty);
    let vg = betas[1];

    let sse = (ssy - betas[0] * xty[0] - betas[1] * xty[1]) / (size - 2.0);
    let xtx_inv = lu.inverse();
    let var_vg = sse * xtx_inv.get(1, 1);

    finish(vg, var_vg.sqrt())
}

/// Related-pairs HE regression over the stored strict upper triangle
/// of the GRM only.
pub fn he_related_only(a: &SparseMatrix, y: &[f64]) -> Result<HeEstimate, FastFamError> {
    assert_eq!(a.nrows(), y.len());

    let mut aij = Vec::new();
    let mut zij = Vec::new();
    a.for_each_strict_upper(|i, j, v| {
        aij.push(v);
        zij.push(y[i] * y[j]);
    });

    let m = aij.len();
    if m <= 2 {
        return Err(FastFamError::HeSingular);
    }

    let a_mean = aij.iter().sum::<f64>() / m as f64;
    let z_mean = zij.iter().sum::<f64>() / m as f64;
    for v in aij.iter_mut() {
        *v -= a_mean;
    }
    for v in zij.iter_mut() {
        *v -= z_mean;
    }

    let a2: f64 = aij.iter().map(|v| v * v).sum();
    if a2 < 1e-6 {
        return Err(FastFamError::HeSingular);
    }
    let az: f64 = aij.iter().zip(zij.iter()).map(|(a, z)| a * z).sum();
    let vg = az / a2;

    let rss: f64 = zij
        .iter()
        .zip(aij.iter())
        .map(|(z, a)| {
            let r = z - a * vg;
            r * r
        })
        .sum();
    let delta = rss / (m as f64 - 2.0);
    let se = (delta / a2).sqrt();

    Ok(finish(vg, se))
}
