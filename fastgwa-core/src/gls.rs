//! Per-marker GLS test engine.
//!
//! For each marker x the engine computes the generalized least squares
//! effect against the conditioned phenotype,
//!   beta = (x' Vinv y) / (x' Vinv x),  se = (x' Vinv x)^{-1/2},
//! with a 1-df chi-squared p-value. On the simple-regression fallback
//! Vinv is the identity and the same expressions apply verbatim.
//!
//! Markers within a batch are independent and run in parallel; every
//! result lands at its own index of the preallocated stat arrays, so
//! output is deterministic for any thread count.

use rayon::prelude::*;
use tracing::info;

use fastgwa_geno::traits::GenotypeSource;
use fastgwa_linalg::{DenseMatrix, SparseMatrix};

use crate::stat::pchisq_1df;

/// Which covariance structure the engine tests under.
pub enum VarianceModel {
    /// Mixed model with a materialized sparse inverse of V.
    Mixed(SparseMatrix),
    /// Simple regression on the centered phenotype.
    Ols,
}

/// Per-marker association results, indexed by global marker position.
#[derive(Debug, Clone)]
pub struct MarkerStats {
    pub beta: Vec<f32>,
    pub se: Vec<f32>,
    pub p: Vec<f32>,
}

impl MarkerStats {
    fn missing(n_markers: usize) -> Self {
        Self {
            beta: vec![f32::NAN; n_markers],
            se: vec![f32::NAN; n_markers],
            p: vec![f32::NAN; n_markers],
        }
    }

    pub fn len(&self) -> usize {
        self.beta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beta.is_empty()
    }
}

const PROGRESS_INTERVAL: usize = 30_000;

/// The marker association engine. Owns the result buffers; `y` and
/// `Vinv` are read-only for its whole lifetime.
pub struct GlsEngine {
    model: VarianceModel,
    y: Vec<f64>,
    stats: MarkerStats,
    finished: usize,
}

impl GlsEngine {
    pub fn new(model: VarianceModel, y: Vec<f64>, n_markers: usize) -> Self {
        Self {
            model,
            y,
            stats: MarkerStats::missing(n_markers),
            finished: 0,
        }
    }

    /// Test one batch of markers, `base..base + count`, in parallel.
    pub fn process_block(&mut self, source: &dyn GenotypeSource, base: usize, count: usize) {
        let n = self.y.len();
        assert_eq!(source.n_samples(), n);
        assert!(base + count <= self.stats.len());

        let y = &self.y;
        let model = &self.model;
        let results: Vec<(f32, f32, f32)> = (0..count)
            .into_par_iter()
            .map_init(
                || vec![0.0f64; n],
                |x, local| {
                    source.materialize(base + local, x, true, false);
                    let (d, xvy) = match model {
                        VarianceModel::Mixed(vinv) => {
                            let u = vinv.mat_vec(x);
                            (DenseMatrix::dot(x, &u), DenseMatrix::dot(&u, y))
                        }
                        VarianceModel::Ols => {
                            (DenseMatrix::dot(x, x), DenseMatrix::dot(x, y))
                        }
                    };
                    marker_stat(d, xvy)
                },
            )
            .collect();

        for (local, (beta, se, p)) in results.into_iter().enumerate() {
            let idx = base + local;
            self.stats.beta[idx] = beta;
            self.stats.se[idx] = se;
            self.stats.p[idx] = p;
        }

        let before = self.finished;
        self.finished += count;
        if before / PROGRESS_INTERVAL != self.finished / PROGRESS_INTERVAL {
            info!("{} markers finished", self.finished);
        }
    }

    pub fn into_stats(self) -> MarkerStats {
        self.stats
    }
}

/// Turn the two quadratic forms into (beta, se, p). A non-positive or
/// non-finite denominator yields missing statistics.
fn marker_stat(d: f64, xvy: f64) -> (f32, f32, f32) {
    if !(d > 0.0) || !d.is_finite() {
        return (f32::NAN, f32::NAN, f32::NAN);
    }
    let beta = xvy / d;
    let se = (1.0 / d).sqrt();
    let z = beta / se;
    let p = pchisq_1df(z * z);
    (beta as f32, se as f32, p as f32)
}
