//! Pipeline configuration.
//!
//! One explicit record constructed at program entry and passed down;
//! there is no global option state.

use std::path::{Path, PathBuf};

use fastgwa_linalg::InvMethod;

/// Everything the association pipeline needs to run.
#[derive(Debug, Clone)]
pub struct FastFamConfig {
    /// PLINK bed/bim/fam prefix.
    pub bed_prefix: PathBuf,
    /// Phenotype file.
    pub pheno_file: PathBuf,
    /// Optional covariate file.
    pub covar_file: Option<PathBuf>,
    /// Sparse GRM basename enabling the mixed-model path.
    pub grm_sparse: Option<PathBuf>,
    /// Explicit (Vg, Ve) override; skips HE regression.
    pub ge: Option<(f64, f64)>,
    /// Solver for the V inverse.
    pub inv_method: InvMethod,
    /// Persist the inverse and stop before the marker loop.
    pub save_inv: bool,
    /// Load a previously saved inverse from this basename.
    pub load_inv: Option<PathBuf>,
    /// Use related-pairs-only HE regression.
    pub rel_only: bool,
    /// Binary result output.
    pub save_bin: bool,
    /// Omit marker metadata from results.
    pub no_marker: bool,
    /// Dump the conditioned phenotype.
    pub save_pheno: bool,
    /// Output prefix.
    pub out_prefix: PathBuf,
    /// Markers per batch in the GLS engine.
    pub batch_size: usize,
}

impl FastFamConfig {
    pub fn new(bed_prefix: PathBuf, pheno_file: PathBuf, out_prefix: PathBuf) -> Self {
        Self {
            bed_prefix,
            pheno_file,
            covar_file: None,
            grm_sparse: None,
            ge: None,
            inv_method: InvMethod::Ldlt,
            save_inv: false,
            load_inv: None,
            rel_only: false,
            save_bin: false,
            no_marker: false,
            save_pheno: false,
            out_prefix,
            batch_size: 256,
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut p = self.out_prefix.as_os_str().to_owned();
        p.push(suffix);
        PathBuf::from(p)
    }

    /// Association results path (text, or the base of the binary pair).
    pub fn assoc_path(&self) -> PathBuf {
        self.with_suffix(".fastFAM.assoc")
    }

    /// Conditioned-phenotype dump path.
    pub fn cphen_path(&self) -> PathBuf {
        self.with_suffix(".cphen")
    }

    /// Basename for the persisted inverse.
    pub fn inv_prefix(&self) -> &Path {
        &self.out_prefix
    }
}
