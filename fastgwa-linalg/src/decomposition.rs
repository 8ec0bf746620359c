#![allow(clippy::needless_range_loop)]
//! Dense decompositions.
//!
//! Hand-rolled LDLT and full-pivot LU over `DenseMatrix`. LDLT solves
//! the covariate normal equations; full-pivot LU solves the HE
//! regression normal equations with explicit rank detection.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("singular matrix encountered")]
    SingularMatrix,

    #[error("solver failed to converge after {max_iter} iterations (residual {residual:.2e})")]
    NotConverged { max_iter: usize, residual: f64 },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// LDLT factorization of a symmetric matrix: A = L * D * L' with unit
/// lower-triangular L.
pub struct LdltDecomp {
    l: DenseMatrix,
    d: Vec<f64>,
}

impl LdltDecomp {
    /// Factorize a symmetric matrix. Fails with `SingularMatrix` when a
    /// pivot collapses, which is how rank deficiency surfaces here.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }

        let mut scale: f64 = 0.0;
        for i in 0..n {
            scale = scale.max(a.get(i, i).abs());
        }
        let pivot_tol = f64::EPSILON * scale.max(1.0) * n as f64;

        let mut l = DenseMatrix::zeros(n, n);
        let mut d = vec![0.0; n];

        for j in 0..n {
            let mut dj = a.get(j, j);
            for k in 0..j {
                dj -= l.get(j, k) * l.get(j, k) * d[k];
            }
            if dj.abs() <= pivot_tol {
                return Err(LinalgError::SingularMatrix);
            }
            d[j] = dj;
            l.set(j, j, 1.0);

            for i in (j + 1)..n {
                let mut s = a.get(i, j);
                for k in 0..j {
                    s -= l.get(i, k) * l.get(j, k) * d[k];
                }
                l.set(i, j, s / dj);
            }
        }

        Ok(LdltDecomp { l, d })
    }

    /// Solve A * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.d.len();
        assert_eq!(b.len(), n);

        // L * y = b
        let mut y = b.to_vec();
        for i in 0..n {
            for j in 0..i {
                y[i] -= self.l.get(i, j) * y[j];
            }
        }

        // D * z = y
        for i in 0..n {
            y[i] /= self.d[i];
        }

        // L' * x = z
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                y[i] -= self.l.get(j, i) * y[j];
            }
        }
        y
    }
}

/// LU factorization with full pivoting: P * A * Q = L * U.
///
/// Tracks the numerical rank the same way Eigen's FullPivLU does,
/// comparing pivots against the largest one seen.
pub struct FullPivLu {
    lu: DenseMatrix,
    row_perm: Vec<usize>,
    col_perm: Vec<usize>,
    rank: usize,
    n: usize,
}

impl FullPivLu {
    pub fn new(a: &DenseMatrix) -> Self {
        let n = a.nrows();
        assert_eq!(n, a.ncols());

        let mut lu = a.clone();
        let mut row_perm: Vec<usize> = (0..n).collect();
        let mut col_perm: Vec<usize> = (0..n).collect();
        let mut rank = n;
        let mut max_pivot: f64 = 0.0;

        for k in 0..n {
            // Largest remaining entry becomes the pivot.
            let (mut pi, mut pj, mut pmax) = (k, k, 0.0f64);
            for i in k..n {
                for j in k..n {
                    let v = lu.get(i, j).abs();
                    if v > pmax {
                        pmax = v;
                        pi = i;
                        pj = j;
                    }
                }
            }

            max_pivot = max_pivot.max(pmax);
            let threshold = max_pivot * n as f64 * f64::EPSILON;
            if pmax <= threshold {
                rank = k;
                break;
            }

            if pi != k {
                for j in 0..n {
                    let tmp = lu.get(k, j);
                    lu.set(k, j, lu.get(pi, j));
                    lu.set(pi, j, tmp);
                }
                row_perm.swap(k, pi);
            }
            if pj != k {
                for i in 0..n {
                    let tmp = lu.get(i, k);
                    lu.set(i, k, lu.get(i, pj));
                    lu.set(i, pj, tmp);
                }
                col_perm.swap(k, pj);
            }

            let pivot = lu.get(k, k);
            for i in (k + 1)..n {
                let factor = lu.get(i, k) / pivot;
                lu.set(i, k, factor);
                for j in (k + 1)..n {
                    lu.set(i, j, lu.get(i, j) - factor * lu.get(k, j));
                }
            }
        }

        FullPivLu {
            lu,
            row_perm,
            col_perm,
            rank,
            n,
        }
    }

    /// Numerical rank of the factored matrix.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Solve A * x = b. Only meaningful at full rank.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);

        // y = L^{-1} * P * b
        let mut y: Vec<f64> = (0..n).map(|i| b[self.row_perm[i]]).collect();
        for i in 0..n {
            for j in 0..i {
                y[i] -= self.lu.get(i, j) * y[j];
            }
        }

        // z = U^{-1} * y
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                y[i] -= self.lu.get(i, j) * y[j];
            }
            y[i] /= self.lu.get(i, i);
        }

        // x = Q * z
        let mut x = vec![0.0; n];
        for i in 0..n {
            x[self.col_perm[i]] = y[i];
        }
        x
    }

    /// Inverse of the factored matrix, column by column.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.n;
        let mut inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            inv.set_col(j, &self.solve(&e));
        }
        inv
    }
}
