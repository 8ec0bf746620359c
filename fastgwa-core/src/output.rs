//! Result sink.
//!
//! Writes per-marker association results either as a tab-separated
//! text table or as packed binary arrays. Markers whose allele
//! frequency falls outside the reporting range keep their row with
//! missing statistics, so positional indexing is stable across both
//! formats.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use fastgwa_geno::traits::GenotypeSource;

use crate::error::FastFamError;
use crate::gls::MarkerStats;

/// Markers with AF at or below this bound are reported as missing.
pub const AF_LOWER: f64 = 1e-5;
/// Markers with AF at or above this bound are reported as missing.
pub const AF_UPPER: f64 = 1.0 - 1e-5;

fn af_in_range(af: f64) -> bool {
    af > AF_LOWER && af < AF_UPPER
}

/// Write the text results table.
pub fn write_text(
    path: &Path,
    source: &dyn GenotypeSource,
    stats: &MarkerStats,
    no_marker: bool,
) -> Result<(), FastFamError> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);

    if no_marker {
        writeln!(out, "AF1\tbeta\tse\tp")?;
    } else {
        writeln!(out, "CHR\tSNP\tPOS\tA1\tA2\tAF1\tbeta\tse\tp")?;
    }

    for m in 0..stats.len() {
        let af = source.allele_frequency(m);
        let (beta, se, p) = if af_in_range(af) {
            (stats.beta[m], stats.se[m], stats.p[m])
        } else {
            (f32::NAN, f32::NAN, f32::NAN)
        };

        if no_marker {
            writeln!(out, "{}\t{}\t{}\t{}", af, beta, se, p)?;
        } else {
            let info = source.marker_info(m);
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                info.chrom, info.id, info.pos, info.a1, info.a2, af, beta, se, p
            )?;
        }
    }
    out.flush()?;

    info!("The association results have been saved to [{}]", path.display());
    Ok(())
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut p = base.as_os_str().to_owned();
    p.push(suffix);
    PathBuf::from(p)
}

/// Write binary results: `<base>.bin` holds four f32 arrays (AF1,
/// beta, se, p) of the marker count, `<base>.snp` the marker ids
/// unless suppressed.
pub fn write_binary(
    base: &Path,
    source: &dyn GenotypeSource,
    stats: &MarkerStats,
    no_marker: bool,
) -> Result<(), FastFamError> {
    let n = stats.len();

    if no_marker {
        info!("No SNP information saved, {} SNPs saved", n);
    } else {
        let snp_path = with_suffix(base, ".snp");
        let mut snp = BufWriter::new(std::fs::File::create(&snp_path)?);
        for m in 0..n {
            writeln!(snp, "{}", source.marker_info(m).id)?;
        }
        snp.flush()?;
        info!(
            "The SNP info of the association results has been saved to [{}]",
            snp_path.display()
        );
    }

    let mut af = Vec::with_capacity(n);
    let mut beta = Vec::with_capacity(n);
    let mut se = Vec::with_capacity(n);
    let mut p = Vec::with_capacity(n);
    for m in 0..n {
        let freq = source.allele_frequency(m);
        af.push(freq as f32);
        if af_in_range(freq) {
            beta.push(stats.beta[m]);
            se.push(stats.se[m]);
            p.push(stats.p[m]);
        } else {
            beta.push(f32::NAN);
            se.push(f32::NAN);
            p.push(f32::NAN);
        }
    }

    let bin_path = with_suffix(base, ".bin");
    let mut out = BufWriter::new(std::fs::File::create(&bin_path)?);
    for array in [&af, &beta, &se, &p] {
        for value in array.iter() {
            out.write_all(&value.to_ne_bytes())?;
        }
    }
    out.flush()?;

    info!(
        "The association results have been saved to [{}] in binary format",
        bin_path.display()
    );
    Ok(())
}
