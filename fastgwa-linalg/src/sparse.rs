//! Sparse symmetric matrices backed by sprs.
//!
//! The GRM and the materialized inverse of V are stored here as CSR
//! matrices with both triangles present. The surface is deliberately
//! narrow: building from entry lists, matrix-vector products for the
//! association engine, entry iteration for the HE sums and the
//! persistence layer, and the fused scale-plus-shift that assembles
//! the phenotypic covariance.

use sprs::{CsMatI, TriMat};

/// Sparse f64 matrix in CSR form.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
}

impl SparseMatrix {
    /// Build from a list of (row, col, value) entries. Duplicate
    /// coordinates are summed.
    pub fn from_entries(nrows: usize, ncols: usize, entries: &[(usize, usize, f64)]) -> Self {
        let mut coo = TriMat::new((nrows, ncols));
        for &(i, j, v) in entries {
            coo.add_triplet(i, j, v);
        }
        Self {
            inner: coo.to_csr(),
        }
    }

    /// The n x n identity.
    pub fn identity(n: usize) -> Self {
        let diagonal: Vec<(usize, usize, f64)> = (0..n).map(|i| (i, i, 1.0)).collect();
        Self::from_entries(n, n, &diagonal)
    }

    pub fn nrows(&self) -> usize {
        self.inner.rows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.cols()
    }

    /// Count of stored entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Value at (row, col); structural zeros read as 0.0.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.get(row, col).copied().unwrap_or(0.0)
    }

    /// self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols());
        let mut out = vec![0.0; self.nrows()];
        for (i, row) in self.inner.outer_iterator().enumerate() {
            let mut acc = 0.0;
            for (j, &a) in row.iter() {
                acc += a * v[j];
            }
            out[i] = acc;
        }
        out
    }

    /// a * self + b * I. This is how V = Vg * A + Ve * I is assembled;
    /// the shift lands on every diagonal position whether or not the
    /// matrix stores it.
    pub fn scale_add_identity(&self, a: f64, b: f64) -> SparseMatrix {
        let n = self.nrows().min(self.ncols());
        let mut entries = Vec::with_capacity(self.nnz() + n);
        self.for_each_entry(|i, j, v| entries.push((i, j, a * v)));
        for i in 0..n {
            entries.push((i, i, b));
        }
        Self::from_entries(self.nrows(), self.ncols(), &entries)
    }

    /// Diagonal values, with 0.0 where the diagonal is not stored.
    pub fn diag(&self) -> Vec<f64> {
        let mut d = vec![0.0; self.nrows().min(self.ncols())];
        self.for_each_entry(|i, j, v| {
            if i == j {
                d[i] = v;
            }
        });
        d
    }

    /// Visit every stored entry as (row, col, value) in CSR order.
    pub fn for_each_entry<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        for (i, row) in self.inner.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                f(i, j, v);
            }
        }
    }

    /// Visit stored entries of the strict upper triangle (row < col).
    pub fn for_each_strict_upper<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        self.for_each_entry(|i, j, v| {
            if i < j {
                f(i, j, v);
            }
        });
    }

    /// Borrow the underlying CSR storage.
    pub fn as_sprs(&self) -> &CsMatI<f64, usize> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_and_get() {
        let eye = SparseMatrix::identity(4);
        assert_eq!(eye.nrows(), 4);
        assert_eq!(eye.ncols(), 4);
        assert_eq!(eye.nnz(), 4);
        assert_eq!(eye.get(2, 2), 1.0);
        assert_eq!(eye.get(2, 3), 0.0);
    }

    #[test]
    fn test_duplicate_entries_are_summed() {
        let m = SparseMatrix::from_entries(2, 2, &[(0, 0, 1.5), (0, 0, 0.5), (1, 1, 2.0)]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 0), 2.0);
    }

    #[test]
    fn test_mat_vec_rectangular() {
        // [[2, 0, 1], [0, 3, 0]] * [1, 2, 3] = [5, 6]
        let m = SparseMatrix::from_entries(2, 3, &[(0, 0, 2.0), (0, 2, 1.0), (1, 1, 3.0)]);
        let out = m.mat_vec(&[1.0, 2.0, 3.0]);
        assert!((out[0] - 5.0).abs() < 1e-12);
        assert!((out[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_add_identity_assembles_covariance() {
        let grm = SparseMatrix::from_entries(
            3,
            3,
            &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 0.9), (0, 1, 0.5), (1, 0, 0.5)],
        );
        let v = grm.scale_add_identity(0.4, 0.6);
        assert!((v.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((v.get(2, 2) - 0.96).abs() < 1e-12);
        assert!((v.get(0, 1) - 0.2).abs() < 1e-12);
        assert!((v.get(1, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_scale_add_identity_without_stored_diagonal() {
        // The shift must appear even where the matrix has no diagonal
        // entry
        let m = SparseMatrix::from_entries(2, 2, &[(0, 1, 0.25), (1, 0, 0.25)]);
        let v = m.scale_add_identity(2.0, 0.7);
        assert!((v.get(0, 0) - 0.7).abs() < 1e-12);
        assert!((v.get(1, 1) - 0.7).abs() < 1e-12);
        assert!((v.get(0, 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_diag_with_gaps() {
        let m = SparseMatrix::from_entries(3, 3, &[(0, 0, 0.9), (2, 2, 1.1), (0, 2, 0.3)]);
        assert_eq!(m.diag(), vec![0.9, 0.0, 1.1]);
    }

    #[test]
    fn test_strict_upper_iteration() {
        let m = SparseMatrix::from_entries(
            3,
            3,
            &[(0, 0, 1.0), (1, 1, 1.0), (1, 2, 0.35), (2, 1, 0.35)],
        );
        let mut upper = Vec::new();
        m.for_each_strict_upper(|i, j, v| upper.push((i, j, v)));
        assert_eq!(upper, vec![(1, 2, 0.35)]);
    }
}
