//! Pipeline orchestration.
//!
//! Wires the stages together: read cohort files, align samples,
//! condition the phenotype, settle on a variance model (mixed or
//! simple regression), then stream marker batches through the GLS
//! engine and write results.

use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use fastgwa_geno::covar::read_covar_file;
use fastgwa_geno::phenotype::read_phenotype_file;
use fastgwa_geno::plink::PlinkSource;
use fastgwa_geno::sparse_grm;
use fastgwa_geno::traits::GenotypeSource;

use crate::align::{align_samples, reorder, SampleAlignment};
use crate::condition::{build_design, center, condition_on_covariates, phenotypic_variance};
use crate::config::FastFamConfig;
use crate::gls::{GlsEngine, VarianceModel};
use crate::he::{he_full, he_related_only};
use crate::output;
use crate::vinv;

const VG_NOT_SIGNIFICANT_WARNING: &str =
    "The estimate of Vg is not statistically significant. This is likely because the number of \
     relatives is not large enough. Performing simple regression instead...";

/// Run the full association pipeline. Returns without testing markers
/// when `save_inv` is set.
pub fn run(config: &FastFamConfig) -> Result<()> {
    let pheno = read_phenotype_file(&config.pheno_file)?;
    info!("{} individuals with a non-missing phenotype", pheno.sample_ids.len());

    let covar = match &config.covar_file {
        Some(path) => {
            let data = read_covar_file(path)?;
            info!(
                "{} individuals with {} complete covariates",
                data.sample_ids.len(),
                data.n_covariates()
            );
            Some(data)
        }
        None => None,
    };

    // The GRM id list pins the canonical order. With load-inv it comes
    // from the id file written alongside the saved inverse; a sentinel
    // there means the saved run had already degraded to simple
    // regression.
    let mut loaded_sentinel = false;
    let grm_ids: Option<Vec<String>> = if let Some(base) = &config.load_inv {
        let ids = sparse_grm::read_grm_ids(base)?;
        if ids.first().map(String::as_str) == Some(vinv::OLS_SENTINEL) {
            loaded_sentinel = true;
            None
        } else {
            Some(ids)
        }
    } else if let Some(base) = &config.grm_sparse {
        Some(sparse_grm::read_grm_ids(base)?)
    } else {
        None
    };

    let alignment = align_samples(
        &pheno.sample_ids,
        covar.as_ref().map(|c| c.sample_ids.as_slice()),
        grm_ids.as_deref(),
    )?;
    let n = alignment.n_samples();
    info!(
        "After matching all the files, {} individuals to be included in the analysis",
        n
    );

    // Condition and center the phenotype.
    let mut y = reorder(&pheno.values, &alignment.pheno_indices);
    if let (Some(covar), Some(indices)) = (&covar, &alignment.covar_indices) {
        let design = build_design(&covar.columns, indices);
        condition_on_covariates(&mut y, &design)?;
    }
    center(&mut y);

    if config.save_pheno {
        let path = config.cphen_path();
        let mut out = std::io::BufWriter::new(
            std::fs::File::create(&path)
                .with_context(|| format!("failed to write {}", path.display()))?,
        );
        for (id, value) in alignment.ids.iter().zip(y.iter()) {
            writeln!(out, "{}\t{}", id, value)?;
        }
        info!("Conditioned phenotype saved to [{}]", path.display());
    }

    let model = resolve_variance_model(config, &alignment, &y, loaded_sentinel)?;
    let model = match model {
        Some(m) => m,
        // save-inv stops here on purpose
        None => return Ok(()),
    };

    // Genotypes, restricted to the canonical order.
    let mut source = PlinkSource::open(&config.bed_prefix).with_context(|| {
        format!(
            "failed to open PLINK files with prefix {}",
            config.bed_prefix.display()
        )
    })?;
    source.select_samples(&alignment.ids)?;
    let n_markers = source.n_markers();
    info!("{} markers x {} samples in the genotype data", n_markers, n);

    match &model {
        VarianceModel::Mixed(_) => info!("\nRunning fastFAM..."),
        VarianceModel::Ols => info!("\nRunning GWAS..."),
    }

    let mut engine = GlsEngine::new(model, y, n_markers);
    let mut base = 0;
    while base < n_markers {
        let count = config.batch_size.min(n_markers - base);
        engine.process_block(&source, base, count);
        base += count;
    }
    let stats = engine.into_stats();

    let assoc_path = config.assoc_path();
    if config.save_bin {
        output::write_binary(&assoc_path, &source, &stats, config.no_marker)?;
    } else {
        output::write_text(&assoc_path, &source, &stats, config.no_marker)?;
    }

    Ok(())
}

/// Decide between the mixed model and simple regression, building or
/// loading the V inverse as needed. `Ok(None)` means the run is
/// complete (the inverse was persisted and the marker loop is
/// skipped).
fn resolve_variance_model(
    config: &FastFamConfig,
    alignment: &SampleAlignment,
    y: &[f64],
    loaded_sentinel: bool,
) -> Result<Option<VarianceModel>> {
    if let Some(base) = &config.load_inv {
        if loaded_sentinel {
            warn!("{}", VG_NOT_SIGNIFICANT_WARNING);
            return Ok(Some(VarianceModel::Ols));
        }
        let loaded = vinv::load_v_inverse(base, &alignment.ids)?;
        return match loaded {
            Some(matrix) => {
                info!(
                    "{} samples checked identical in the loaded inverse",
                    alignment.ids.len()
                );
                Ok(Some(VarianceModel::Mixed(matrix)))
            }
            None => {
                warn!("{}", VG_NOT_SIGNIFICANT_WARNING);
                Ok(Some(VarianceModel::Ols))
            }
        };
    }

    let grm_base = match &config.grm_sparse {
        Some(base) => base,
        None => return Ok(Some(VarianceModel::Ols)),
    };
    let grm_map = alignment
        .grm_map
        .as_ref()
        .expect("GRM ids were part of the alignment");

    info!("Reading the sparse GRM file from [{}]...", grm_base.display());
    let grm = sparse_grm::read_sparse_grm(grm_base, grm_map, alignment.n_samples())?;
    info!("{} non-zero GRM entries after matching", grm.nnz());

    let variances = match config.ge {
        Some((vg, ve)) => {
            info!("Using the provided variance components: Vg = {}, Ve = {}", vg, ve);
            Some((vg, ve))
        }
        None => {
            info!("Estimating the genetic variance (Vg) by HE regression...");
            let estimate = if config.rel_only {
                info!("Use related pairs only.");
                he_related_only(&grm, y)?
            } else {
                he_full(&grm, y)
            };
            let vp = phenotypic_variance(y);
            info!("Vp = {:.6}", vp);
            if estimate.significant {
                let ve = vp - estimate.vg;
                info!("Ve = {:.6}", ve);
                info!("Heritability = {:.6}", estimate.vg / vp);
                Some((estimate.vg, ve))
            } else {
                None
            }
        }
    };

    let (vg, ve) = match variances {
        Some(pair) => pair,
        None => {
            warn!("{}", VG_NOT_SIGNIFICANT_WARNING);
            if config.save_inv {
                vinv::save_ols_sentinel(config.inv_prefix())?;
                return Ok(None);
            }
            return Ok(Some(VarianceModel::Ols));
        }
    };

    let vinv_matrix = vinv::build_v_inverse(&grm, vg, ve, config.inv_method)?;

    if config.save_inv {
        info!("Saving the inverse of V, use --load-inv to reuse it");
        vinv::save_v_inverse(config.inv_prefix(), &alignment.ids, &vinv_matrix)?;
        return Ok(None);
    }

    Ok(Some(VarianceModel::Mixed(vinv_matrix)))
}

/// Sanity guard used by the CLI: reject option combinations that
/// cannot be honored.
pub fn validate_config(config: &FastFamConfig) -> Result<()> {
    if config.save_inv && config.load_inv.is_some() {
        bail!("--save-inv and --load-inv are mutually exclusive");
    }
    if config.save_inv && config.grm_sparse.is_none() {
        bail!("--save-inv requires --grm-sparse");
    }
    if config.ge.is_some() && config.grm_sparse.is_none() {
        bail!("--ge requires --grm-sparse");
    }
    Ok(())
}
