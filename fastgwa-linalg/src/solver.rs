#![allow(clippy::needless_range_loop)]
//! Sparse SPD solvers.
//!
//! The V-inverse builder is algorithm-agnostic: it asks for a factored
//! solver via `SpdSolver::compute` and then solves against unit
//! vectors. Five methods are available, mirroring the solver set of
//! the original engine: simplicial LDLT and LLT (direct), conjugate
//! gradient driven from the lower triangle (`cg`) or the full stored
//! matrix (`tcg`), and least-squares conjugate gradient (`lscg`).

use std::fmt;
use std::str::FromStr;

use crate::decomposition::LinalgError;
use crate::sparse::SparseMatrix;

/// Solver used to materialize the inverse of V.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvMethod {
    Ldlt,
    Llt,
    Cg,
    Tcg,
    Lscg,
}

impl FromStr for InvMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ldlt" => Ok(InvMethod::Ldlt),
            "llt" => Ok(InvMethod::Llt),
            "cg" => Ok(InvMethod::Cg),
            "tcg" => Ok(InvMethod::Tcg),
            "lscg" => Ok(InvMethod::Lscg),
            other => Err(format!("unknown inverse method '{}'", other)),
        }
    }
}

impl fmt::Display for InvMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvMethod::Ldlt => "ldlt",
            InvMethod::Llt => "llt",
            InvMethod::Cg => "cg",
            InvMethod::Tcg => "tcg",
            InvMethod::Lscg => "lscg",
        };
        write!(f, "{}", name)
    }
}

/// Simplicial sparse LDLT: A = L * D * L' with unit lower-triangular L
/// stored column by column without its diagonal.
///
/// Up-looking factorization over the elimination tree. The input must
/// be symmetric with both triangles stored; only entries with
/// row <= col are consulted.
pub struct SimplicialLdlt {
    n: usize,
    col_ptr: Vec<usize>,
    row_ind: Vec<usize>,
    values: Vec<f64>,
    diag: Vec<f64>,
}

impl SimplicialLdlt {
    /// Factorize. With `require_positive` every pivot must be strictly
    /// positive (LLT semantics); otherwise any nonzero pivot is
    /// accepted.
    pub fn factor(a: &SparseMatrix, require_positive: bool) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }

        let m = a.as_sprs();
        const NONE: usize = usize::MAX;

        // Elimination tree and per-column fill counts.
        let mut parent = vec![NONE; n];
        let mut flag = vec![NONE; n];
        let mut fill = vec![0usize; n];
        for (k, row) in m.outer_iterator().enumerate() {
            flag[k] = k;
            for (i, _) in row.iter() {
                if i >= k {
                    continue;
                }
                let mut node = i;
                while flag[node] != k {
                    if parent[node] == NONE {
                        parent[node] = k;
                    }
                    fill[node] += 1;
                    flag[node] = k;
                    node = parent[node];
                }
            }
        }

        let mut col_ptr = vec![0usize; n + 1];
        for k in 0..n {
            col_ptr[k + 1] = col_ptr[k] + fill[k];
        }
        let nnz = col_ptr[n];
        let mut row_ind = vec![0usize; nnz];
        let mut values = vec![0.0; nnz];
        let mut diag = vec![0.0; n];
        let mut used = vec![0usize; n];
        let mut work = vec![0.0; n];
        let mut pattern = vec![0usize; n];
        let mut flag = vec![NONE; n];

        for (k, row) in m.outer_iterator().enumerate() {
            // Nonzero pattern of row k of L, in topological order.
            let mut top = n;
            flag[k] = k;
            work[k] = 0.0;
            for (i, &v) in row.iter() {
                if i > k {
                    continue;
                }
                work[i] += v;
                let mut len = 0;
                let mut node = i;
                while flag[node] != k {
                    pattern[len] = node;
                    len += 1;
                    flag[node] = k;
                    node = parent[node];
                }
                while len > 0 {
                    len -= 1;
                    top -= 1;
                    pattern[top] = pattern[len];
                }
            }

            // Sparse triangular solve for row k.
            diag[k] = work[k];
            work[k] = 0.0;
            for t in top..n {
                let i = pattern[t];
                let yi = work[i];
                work[i] = 0.0;
                let end = col_ptr[i] + used[i];
                for p in col_ptr[i]..end {
                    work[row_ind[p]] -= values[p] * yi;
                }
                let lki = yi / diag[i];
                diag[k] -= lki * yi;
                row_ind[end] = k;
                values[end] = lki;
                used[i] += 1;
            }

            if require_positive {
                if diag[k] <= 0.0 {
                    return Err(LinalgError::NotPositiveDefinite);
                }
            } else if diag[k] == 0.0 {
                return Err(LinalgError::SingularMatrix);
            }
        }

        Ok(SimplicialLdlt {
            n,
            col_ptr,
            row_ind,
            values,
            diag,
        })
    }

    /// Solve A * x = b through the factors.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        assert_eq!(b.len(), n);
        let mut x = b.to_vec();

        // L * y = b
        for j in 0..n {
            let xj = x[j];
            for p in self.col_ptr[j]..self.col_ptr[j + 1] {
                x[self.row_ind[p]] -= self.values[p] * xj;
            }
        }

        // D * z = y
        for j in 0..n {
            x[j] /= self.diag[j];
        }

        // L' * x = z
        for j in (0..n).rev() {
            let mut s = x[j];
            for p in self.col_ptr[j]..self.col_ptr[j + 1] {
                s -= self.values[p] * x[self.row_ind[p]];
            }
            x[j] = s;
        }
        x
    }
}

/// Result of a conjugate gradient solve.
pub struct CgResult {
    pub x: Vec<f64>,
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Preconditioned conjugate gradient over a caller-supplied operator.
pub struct CgSolver {
    pub tol: f64,
    pub max_iter: usize,
}

impl CgSolver {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self { tol, max_iter }
    }

    /// Solve A * x = b where `apply` computes A * v and `precond`
    /// applies an approximate inverse of A.
    pub fn solve<F, P>(&self, apply: F, precond: P, b: &[f64]) -> CgResult
    where
        F: Fn(&[f64]) -> Vec<f64>,
        P: Fn(&[f64]) -> Vec<f64>,
    {
        let n = b.len();
        let mut x = vec![0.0; n];
        let mut r = b.to_vec();
        let mut z = precond(&r);
        let mut p = z.clone();
        let mut rz: f64 = r.iter().zip(z.iter()).map(|(ri, zi)| ri * zi).sum();

        let b_norm: f64 = b.iter().map(|v| v * v).sum::<f64>().sqrt();
        let threshold = self.tol * b_norm.max(f64::MIN_POSITIVE);

        let mut r_norm: f64 = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        for iter in 0..self.max_iter {
            if r_norm <= threshold {
                return CgResult {
                    x,
                    iterations: iter,
                    residual: r_norm,
                    converged: true,
                };
            }

            let ap = apply(&p);
            let pap: f64 = p.iter().zip(ap.iter()).map(|(pi, ai)| pi * ai).sum();
            if pap.abs() < 1e-300 {
                break;
            }
            let alpha = rz / pap;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }

            z = precond(&r);
            let rz_next: f64 = r.iter().zip(z.iter()).map(|(ri, zi)| ri * zi).sum();
            let beta = rz_next / rz;
            rz = rz_next;
            for i in 0..n {
                p[i] = z[i] + beta * p[i];
            }
            r_norm = r.iter().map(|v| v * v).sum::<f64>().sqrt();
        }

        CgResult {
            x,
            iterations: self.max_iter,
            residual: r_norm,
            converged: r_norm <= threshold,
        }
    }
}

/// A factored (or prepared) solver for a sparse SPD matrix.
pub struct SpdSolver<'a> {
    method: InvMethod,
    matrix: &'a SparseMatrix,
    direct: Option<SimplicialLdlt>,
    // Lower-triangle entries for the `cg` product path.
    lower: Vec<(usize, usize, f64)>,
    jacobi: Vec<f64>,
    cg: CgSolver,
}

impl<'a> SpdSolver<'a> {
    /// Prepare a solver for the given matrix. Direct methods factorize
    /// here; iterative methods set up preconditioners.
    pub fn compute(matrix: &'a SparseMatrix, method: InvMethod) -> Result<Self, LinalgError> {
        let n = matrix.nrows();
        let mut direct = None;
        let mut lower = Vec::new();
        let mut jacobi = Vec::new();

        match method {
            InvMethod::Ldlt => direct = Some(SimplicialLdlt::factor(matrix, false)?),
            InvMethod::Llt => direct = Some(SimplicialLdlt::factor(matrix, true)?),
            InvMethod::Cg => {
                matrix.for_each_entry(|i, j, v| {
                    if i >= j {
                        lower.push((i, j, v));
                    }
                });
                jacobi = matrix.diag();
            }
            InvMethod::Tcg => {
                jacobi = matrix.diag();
            }
            InvMethod::Lscg => {
                // Column squared norms precondition the normal equations.
                let mut norms = vec![0.0; n];
                matrix.for_each_entry(|_, j, v| norms[j] += v * v);
                jacobi = norms;
            }
        }

        Ok(SpdSolver {
            method,
            matrix,
            direct,
            lower,
            jacobi,
            cg: CgSolver::new(1e-12, 2 * n.max(1)),
        })
    }

    /// Solve A * x = b.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        match self.method {
            InvMethod::Ldlt | InvMethod::Llt => {
                Ok(self.direct.as_ref().unwrap().solve(b))
            }
            InvMethod::Cg => {
                let apply = |v: &[f64]| self.apply_lower_symmetric(v);
                let result = self.cg.solve(apply, |v| self.apply_jacobi(v), b);
                self.finish(result)
            }
            InvMethod::Tcg => {
                let apply = |v: &[f64]| self.matrix.mat_vec(v);
                let result = self.cg.solve(apply, |v| self.apply_jacobi(v), b);
                self.finish(result)
            }
            InvMethod::Lscg => {
                // Normal equations: A'A x = A'b with A symmetric.
                let rhs = self.matrix.mat_vec(b);
                let apply = |v: &[f64]| self.matrix.mat_vec(&self.matrix.mat_vec(v));
                let result = self.cg.solve(apply, |v| self.apply_jacobi(v), &rhs);
                self.finish(result)
            }
        }
    }

    fn finish(&self, result: CgResult) -> Result<Vec<f64>, LinalgError> {
        if result.converged {
            Ok(result.x)
        } else {
            Err(LinalgError::NotConverged {
                max_iter: result.iterations,
                residual: result.residual,
            })
        }
    }

    fn apply_jacobi(&self, v: &[f64]) -> Vec<f64> {
        v.iter()
            .zip(self.jacobi.iter())
            .map(|(vi, di)| if di.abs() > 1e-300 { vi / di } else { *vi })
            .collect()
    }

    fn apply_lower_symmetric(&self, v: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; v.len()];
        for &(i, j, val) in &self.lower {
            result[i] += val * v[j];
            if i != j {
                result[j] += val * v[i];
            }
        }
        result
    }
}
