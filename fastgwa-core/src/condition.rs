//! Phenotype conditioning.
//!
//! Regresses the phenotype on the covariates, keeps the residuals, and
//! mean-centers. The covariate matrix carries the intercept as its
//! last column, so after this stage the phenotype is orthogonal to
//! every covariate and sums to zero.

use fastgwa_linalg::decomposition::LdltDecomp;
use fastgwa_linalg::DenseMatrix;

use crate::error::FastFamError;

/// Replace `y` with the residual of its regression on `covar`.
///
/// Solves the normal equations with an LDLT factorization of C'C.
/// A rank-deficient C'C is `SingularCovar`.
pub fn condition_on_covariates(
    y: &mut [f64],
    covar: &DenseMatrix,
) -> Result<(), FastFamError> {
    assert_eq!(y.len(), covar.nrows());

    let ctc = covar.gram();
    let cty = covar.transpose_mat_vec(y);
    let ldlt = LdltDecomp::new(&ctc).map_err(|_| FastFamError::SingularCovar)?;
    let beta = ldlt.solve(&cty);

    let fitted = covar.mat_vec(&beta);
    for (yi, fi) in y.iter_mut().zip(fitted.iter()) {
        *yi -= fi;
    }
    Ok(())
}

/// Subtract the mean from `y`.
pub fn center(y: &mut [f64]) {
    if y.is_empty() {
        return;
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    for yi in y.iter_mut() {
        *yi -= mean;
    }
}

/// Total phenotypic variance of the conditioned phenotype.
pub fn phenotypic_variance(y: &[f64]) -> f64 {
    let n = y.len();
    y.iter().map(|v| v * v).sum::<f64>() / (n as f64 - 1.0)
}

/// Build the covariate design matrix in canonical order: one column
/// per covariate followed by the intercept column of ones.
pub fn build_design(columns: &[Vec<f64>], covar_indices: &[usize]) -> DenseMatrix {
    let n = covar_indices.len();
    let k = columns.len() + 1;
    let mut data = vec![0.0; n * k];
    for (j, col) in columns.iter().enumerate() {
        for (c, &src) in covar_indices.iter().enumerate() {
            data[j * n + c] = col[src];
        }
    }
    for c in 0..n {
        data[(k - 1) * n + c] = 1.0;
    }
    DenseMatrix::from_col_major(n, k, data)
}
