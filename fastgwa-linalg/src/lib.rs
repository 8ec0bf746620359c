//! fastgwa-linalg: Linear algebra for fastgwa-rs
//!
//! Provides the dense and sparse matrix types, the dense decompositions
//! (LDLT, full-pivot LU) used by the covariate conditioner and the HE
//! estimator, and the pluggable sparse SPD solver used to materialize
//! the inverse of the phenotypic covariance matrix.

pub mod dense;
pub mod sparse;
pub mod decomposition;
pub mod solver;

pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
pub use solver::{InvMethod, SpdSolver};
