//! PLINK bed/bim/fam genotype backend using memory-mapped files.
//!
//! PLINK binary format consists of three files:
//! - .bed: Binary genotype data (2 bits per genotype, packed)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed
//!
//! After `select_samples` the source delivers vectors in the requested
//! order and allele frequencies are precomputed over that sample set
//! in a single pass.

use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use crate::traits::{GenotypeSource, MarkerInfo};

/// PLINK BIM file entry (one per variant).
#[derive(Debug, Clone)]
pub struct BimEntry {
    pub chrom: String,
    pub id: String,
    pub pos: u64,
    pub allele1: String,
    pub allele2: String,
}

/// Genotype source over PLINK bed/bim/fam files.
pub struct PlinkSource {
    mmap: Mmap,
    bim: Vec<BimEntry>,
    fam_ids: Vec<String>,
    n_samples_total: usize,
    bytes_per_marker: usize,
    /// Indices into the fam order, one per analyzed sample.
    keep: Vec<usize>,
    /// Allele frequency of A1 per marker over the analyzed samples.
    afs: Vec<f64>,
}

impl PlinkSource {
    /// Open PLINK files from a base path (without extension).
    ///
    /// The source is not usable until `select_samples` fixes the
    /// analyzed sample set.
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let base = prefix.as_ref();
        let bed_path = base.with_extension("bed");
        let bim_path = base.with_extension("bim");
        let fam_path = base.with_extension("fam");

        let fam_ids = Self::parse_fam(&fam_path)?;
        let n_samples = fam_ids.len();
        let bim = Self::parse_bim(&bim_path)?;

        let bed_file = std::fs::File::open(&bed_path)
            .with_context(|| format!("failed to open bed file: {}", bed_path.display()))?;
        let mmap = unsafe { Mmap::map(&bed_file)? };

        if mmap.len() < 3 {
            bail!("bed file too small: {}", bed_path.display());
        }
        if mmap[0] != 0x6C || mmap[1] != 0x1B {
            bail!("invalid PLINK bed magic number in {}", bed_path.display());
        }
        if mmap[2] != 0x01 {
            bail!("only SNP-major bed files are supported (mode byte = 0x01)");
        }

        let bytes_per_marker = n_samples.div_ceil(4);
        let expected = 3 + bytes_per_marker * bim.len();
        if mmap.len() < expected {
            bail!(
                "bed file too small: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            );
        }

        Ok(Self {
            mmap,
            bim,
            fam_ids,
            n_samples_total: n_samples,
            bytes_per_marker,
            keep: Vec::new(),
            afs: Vec::new(),
        })
    }

    /// Sample IDs (IID) in fam order.
    pub fn fam_ids(&self) -> &[String] {
        &self.fam_ids
    }

    /// Fix the analyzed sample set and order, then precompute allele
    /// frequencies over it. Every requested id must be present in the
    /// fam file.
    pub fn select_samples(&mut self, ids: &[String]) -> Result<()> {
        let mut positions = std::collections::HashMap::with_capacity(self.fam_ids.len());
        for (i, id) in self.fam_ids.iter().enumerate() {
            positions.entry(id.as_str()).or_insert(i);
        }

        let mut keep = Vec::with_capacity(ids.len());
        for id in ids {
            match positions.get(id.as_str()) {
                Some(&i) => keep.push(i),
                None => bail!("sample '{}' not present in the genotype fam file", id),
            }
        }
        self.keep = keep;

        let mut afs = Vec::with_capacity(self.bim.len());
        for m in 0..self.bim.len() {
            let mut sum = 0.0;
            let mut n_valid = 0usize;
            self.for_each_kept_dosage(m, |_, d| {
                if !d.is_nan() {
                    sum += d;
                    n_valid += 1;
                }
            });
            afs.push(if n_valid > 0 {
                sum / (2.0 * n_valid as f64)
            } else {
                0.0
            });
        }
        self.afs = afs;
        Ok(())
    }

    fn parse_fam(path: &Path) -> Result<Vec<String>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fam file: {}", path.display()))?;
        let mut ids = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("fam file line {} has fewer than 6 fields", line_num + 1);
            }
            ids.push(fields[1].to_string());
        }
        Ok(ids)
    }

    fn parse_bim(path: &Path) -> Result<Vec<BimEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bim file: {}", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("bim file line {} has fewer than 6 fields", line_num + 1);
            }
            entries.push(BimEntry {
                chrom: fields[0].to_string(),
                id: fields[1].to_string(),
                pos: fields[3].parse().unwrap_or(0),
                allele1: fields[4].to_string(),
                allele2: fields[5].to_string(),
            });
        }
        Ok(entries)
    }

    /// Decode a single genotype from a bed byte.
    /// Returns the dosage of allele1: 0, 1, 2, or NaN for missing.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        let bits = (byte >> (offset * 2)) & 0x03;
        match bits {
            0b00 => 2.0,
            0b01 => f64::NAN,
            0b10 => 1.0,
            0b11 => 0.0,
            _ => unreachable!(),
        }
    }

    #[inline]
    fn for_each_kept_dosage<F: FnMut(usize, f64)>(&self, marker: usize, mut f: F) {
        let offset = 3 + marker * self.bytes_per_marker;
        for (out_idx, &fam_idx) in self.keep.iter().enumerate() {
            let byte = self.mmap[offset + fam_idx / 4];
            f(out_idx, Self::decode_genotype(byte, fam_idx % 4));
        }
    }
}

impl GenotypeSource for PlinkSource {
    fn n_samples(&self) -> usize {
        self.keep.len()
    }

    fn n_markers(&self) -> usize {
        self.bim.len()
    }

    fn allele_frequency(&self, marker: usize) -> f64 {
        self.afs[marker]
    }

    fn marker_info(&self, marker: usize) -> MarkerInfo {
        let bim = &self.bim[marker];
        MarkerInfo {
            chrom: bim.chrom.clone(),
            id: bim.id.clone(),
            pos: bim.pos,
            a1: bim.allele1.clone(),
            a2: bim.allele2.clone(),
        }
    }

    fn materialize(&self, marker: usize, out: &mut [f64], standardize: bool, center_only: bool) {
        assert_eq!(out.len(), self.keep.len());
        let af = self.afs[marker];
        let mean = 2.0 * af;
        let var = 2.0 * af * (1.0 - af);

        if standardize && !center_only && var <= 1e-10 {
            out.fill(0.0);
            return;
        }

        let scale = if standardize && !center_only {
            1.0 / var.sqrt()
        } else {
            1.0
        };

        self.for_each_kept_dosage(marker, |i, d| {
            let g = if d.is_nan() { mean } else { d };
            out[i] = (g - mean) * scale;
        });
    }
}
