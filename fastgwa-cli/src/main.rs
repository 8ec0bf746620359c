//! fastgwa: mixed-linear-model GWAS for cohorts with relatedness.
//!
//! CLI entry point using clap for argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fastgwa_core::config::FastFamConfig;
use fastgwa_core::pipeline;
use fastgwa_linalg::InvMethod;

#[derive(Parser)]
#[command(
    name = "fastgwa",
    version,
    about = "fastgwa-rs: fast mixed-model GWAS with a sparse GRM",
    long_about = "Runs a fastGWA-style association scan: HE regression for the variance \
                  components, a sparse inverse of V, and a per-marker GLS test. Falls back \
                  to simple regression when the genetic variance is not significant."
)]
struct Cli {
    /// PLINK bed/bim/fam file prefix
    #[arg(long)]
    bfile: PathBuf,

    /// Phenotype file (id value pairs)
    #[arg(long)]
    pheno: PathBuf,

    /// Covariate file (id followed by numeric columns)
    #[arg(long)]
    covar: Option<PathBuf>,

    /// Sparse GRM basename (<base>.grm.id / <base>.grm.sp)
    #[arg(long = "grm-sparse")]
    grm_sparse: Option<PathBuf>,

    /// Skip HE regression and use these variance components
    #[arg(long, num_args = 2, value_names = ["VG", "VE"])]
    ge: Option<Vec<f64>>,

    /// Solver for the V inverse: ldlt, llt, cg, tcg, lscg
    #[arg(long = "inv-method", default_value = "ldlt")]
    inv_method: String,

    /// Persist the inverse of V and stop before the marker loop
    #[arg(long = "save-inv")]
    save_inv: bool,

    /// Load a previously saved inverse from this basename
    #[arg(long = "load-inv")]
    load_inv: Option<PathBuf>,

    /// Use related pairs only in the HE regression
    #[arg(long = "rel-only")]
    rel_only: bool,

    /// Write results in packed binary form
    #[arg(long = "save-bin")]
    save_bin: bool,

    /// Omit marker metadata from the results
    #[arg(long = "no-marker")]
    no_marker: bool,

    /// Dump the conditioned phenotype to <out>.cphen
    #[arg(long = "save-pheno")]
    save_pheno: bool,

    /// Output prefix
    #[arg(long)]
    out: PathBuf,

    /// Markers per batch in the association engine
    #[arg(long = "batch-size", default_value = "256")]
    batch_size: usize,

    /// Number of threads (0 = all available cores)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .ok();
    }

    tracing::info!("fastgwa-rs v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", rayon::current_num_threads());

    let inv_method: InvMethod = cli
        .inv_method
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let mut config = FastFamConfig::new(cli.bfile, cli.pheno, cli.out);
    config.covar_file = cli.covar;
    config.grm_sparse = cli.grm_sparse;
    config.ge = cli.ge.map(|v| (v[0], v[1]));
    config.inv_method = inv_method;
    config.save_inv = cli.save_inv;
    config.load_inv = cli.load_inv;
    config.rel_only = cli.rel_only;
    config.save_bin = cli.save_bin;
    config.no_marker = cli.no_marker;
    config.save_pheno = cli.save_pheno;
    config.batch_size = cli.batch_size.max(1);

    pipeline::validate_config(&config)?;
    pipeline::run(&config)
}
