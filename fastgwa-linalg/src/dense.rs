//! Dense matrices backed by faer.
//!
//! Thin layer over faer's column-major `Mat<f64>` carrying exactly
//! what the pipeline needs: covariate design assembly, the normal
//! equations (C'C and C'v), products, and column access for the
//! decompositions. The element accessors delegate straight to faer.

use faer::Mat;

/// Dense f64 matrix, column-major.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// An all-zero matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Build from a flat column-major buffer, the layout the covariate
    /// design is assembled in.
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "flat buffer must fill the matrix");
        Self {
            inner: Mat::from_fn(nrows, ncols, |i, j| data[i + j * nrows]),
        }
    }

    /// Build from a flat row-major slice, convenient for writing small
    /// matrices out row by row.
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols, "flat buffer must fill the matrix");
        Self {
            inner: Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]),
        }
    }

    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols());
        (0..self.nrows())
            .map(|i| {
                (0..self.ncols())
                    .map(|j| self.inner.read(i, j) * v[j])
                    .sum()
            })
            .collect()
    }

    /// Column j as an owned vector.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Overwrite column j.
    pub fn set_col(&mut self, j: usize, values: &[f64]) {
        assert_eq!(values.len(), self.nrows());
        for (i, &v) in values.iter().enumerate() {
            self.inner.write(i, j, v);
        }
    }

    /// Gram matrix X'X (p x p, symmetric). Only the upper triangle is
    /// computed; the lower is mirrored.
    pub fn gram(&self) -> DenseMatrix {
        let p = self.ncols();
        let mut g = DenseMatrix::zeros(p, p);
        for j in 0..p {
            let cj = self.col(j);
            for k in j..p {
                let ck = self.col(k);
                let s = Self::dot(&cj, &ck);
                g.set(j, k, s);
                g.set(k, j, s);
            }
        }
        g
    }

    /// X'v for a vector of length nrows.
    pub fn transpose_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.nrows());
        (0..self.ncols())
            .map(|j| {
                (0..self.nrows())
                    .map(|i| self.inner.read(i, j) * v[i])
                    .sum()
            })
            .collect()
    }

    /// Dot product of two equal-length slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}
