//! Pipeline error kinds.
//!
//! Every fatal failure mode has a typed variant; callers propagate
//! them through anyhow and attach file-level context at the boundary.
//! A non-significant genetic variance is deliberately not an error:
//! the pipeline recovers by degrading to simple regression.

use thiserror::Error;

/// Fatal failure modes of the association pipeline.
///
/// A non-significant genetic variance estimate has no variant here on
/// purpose: it is a recoverable condition, handled in the pipeline by
/// warning the user and switching the marker loop to simple
/// regression.
#[derive(Error, Debug)]
pub enum FastFamError {
    #[error("sample alignment failed: {0}")]
    Align(String),

    #[error("covariate matrix is rank deficient, cannot condition the phenotype")]
    SingularCovar,

    #[error("HE regression normal equations are singular")]
    HeSingular,

    #[error("failed to factorize the variance-covariance matrix with {method}: {detail}")]
    VinvFactor { method: String, detail: String },

    #[error("iterative solver did not converge while inverting V (column {column}): {detail}")]
    VinvConverge { column: usize, detail: String },

    #[error("loaded inverse does not match the current samples at line {line} of {path}")]
    InvIdMismatch { line: usize, path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
