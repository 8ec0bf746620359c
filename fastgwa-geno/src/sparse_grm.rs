//! Sparse GRM reader.
//!
//! Two sibling files share a basename:
//! - `<base>.grm.id`: one sample id per line, in GRM row order.
//! - `<base>.grm.sp`: whitespace-separated triples `i j value` with
//!   0-based GRM-row indices and `i <= j`; each off-diagonal pair
//!   appears once.
//!
//! The loader remaps GRM row indices onto the caller's canonical
//! sample order, drops pairs outside the analyzed set, and
//! materializes both triangles.

use std::path::Path;

use anyhow::{bail, Context, Result};

use fastgwa_linalg::SparseMatrix;

/// Read the GRM sample id list in GRM row order.
pub fn read_grm_ids(base: &Path) -> Result<Vec<String>> {
    let path = grm_id_path(base);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read GRM id file: {}", path.display()))?;
    Ok(contents
        .lines()
        .map(|l| l.to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Path of the `<base>.grm.id` sibling.
pub fn grm_id_path(base: &Path) -> std::path::PathBuf {
    let mut p = base.as_os_str().to_owned();
    p.push(".grm.id");
    std::path::PathBuf::from(p)
}

/// Read the sparse GRM onto the canonical sample order.
///
/// `canonical_of_grm_row[i]` gives the canonical index for GRM row
/// `i`, or `None` when that sample was dropped by the aligner.
pub fn read_sparse_grm(
    base: &Path,
    canonical_of_grm_row: &[Option<usize>],
    n: usize,
) -> Result<SparseMatrix> {
    let mut path = base.as_os_str().to_owned();
    path.push(".grm.sp");
    let path = std::path::PathBuf::from(path);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read sparse GRM file: {}", path.display()))?;

    let mut entries = Vec::new();

    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            bail!(
                "sparse GRM line {} has {} fields, expected 3",
                line_num + 1,
                fields.len()
            );
        }
        let i: usize = fields[0]
            .parse()
            .with_context(|| format!("bad row index on line {}", line_num + 1))?;
        let j: usize = fields[1]
            .parse()
            .with_context(|| format!("bad column index on line {}", line_num + 1))?;
        if i >= canonical_of_grm_row.len() || j >= canonical_of_grm_row.len() {
            bail!(
                "sparse GRM line {} indexes sample {} outside the id list",
                line_num + 1,
                i.max(j)
            );
        }

        let (ci, cj) = match (canonical_of_grm_row[i], canonical_of_grm_row[j]) {
            (Some(ci), Some(cj)) => (ci, cj),
            _ => continue,
        };

        let v: f64 = fields[2]
            .parse()
            .with_context(|| format!("bad GRM value on line {}", line_num + 1))?;
        entries.push((ci, cj, v));
        if ci != cj {
            entries.push((cj, ci, v));
        }
    }

    Ok(SparseMatrix::from_entries(n, n, &entries))
}
