//! fastgwa-geno: Genotype and cohort file IO for fastgwa-rs
//!
//! Provides the genotype source trait consumed by the association
//! engine, the PLINK bed/bim/fam backend, and readers for phenotype,
//! covariate, and sparse GRM files.

pub mod traits;
pub mod plink;
pub mod phenotype;
pub mod covar;
pub mod sparse_grm;
