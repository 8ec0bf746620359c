//! V-inverse construction and persistence.
//!
//! Builds V = Vg * A + Ve * I from the sparse GRM and materializes its
//! inverse by solving against unit vectors, column by column. The
//! inverse can be persisted to disk and reloaded in a later run after
//! verifying that the sample set is unchanged.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fastgwa_linalg::decomposition::LinalgError;
use fastgwa_linalg::{InvMethod, SparseMatrix, SpdSolver};
use tracing::info;

use crate::error::FastFamError;

/// Sentinel id-file content marking a run that fell back to simple
/// regression, where no inverse exists.
pub const OLS_SENTINEL: &str = "--fastGWA";

/// On-disk record of one stored entry of the inverse:
/// row (i32), col (i32), value (f64), native endianness.
const RECORD_SIZE: usize = 16;

/// Build V = Vg * A + Ve * I and return its inverse.
pub fn build_v_inverse(
    grm: &SparseMatrix,
    vg: f64,
    ve: f64,
    method: InvMethod,
) -> Result<SparseMatrix, FastFamError> {
    let n = grm.nrows();
    info!(
        "Inverting the variance-covariance matrix ({} x {}, method {})",
        n, n, method
    );

    let v = grm.scale_add_identity(vg, ve);
    let solver = SpdSolver::compute(&v, method).map_err(|e| FastFamError::VinvFactor {
        method: method.to_string(),
        detail: e.to_string(),
    })?;

    let mut entries = Vec::new();
    let mut unit = vec![0.0; n];
    for j in 0..n {
        unit[j] = 1.0;
        let column = solver.solve(&unit).map_err(|e| match e {
            LinalgError::NotConverged { .. } => FastFamError::VinvConverge {
                column: j,
                detail: e.to_string(),
            },
            other => FastFamError::VinvFactor {
                method: method.to_string(),
                detail: other.to_string(),
            },
        })?;
        unit[j] = 0.0;

        for (i, &value) in column.iter().enumerate() {
            if value != 0.0 {
                entries.push((i, j, value));
            }
        }
    }

    Ok(SparseMatrix::from_entries(n, n, &entries))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut p = prefix.as_os_str().to_owned();
    p.push(suffix);
    PathBuf::from(p)
}

/// Persist the inverse: `<prefix>.grm.id` carries the canonical ids,
/// `<prefix>.grm.inv` the packed entry records.
pub fn save_v_inverse(
    prefix: &Path,
    ids: &[String],
    vinv: &SparseMatrix,
) -> Result<(), FastFamError> {
    let id_path = with_suffix(prefix, ".grm.id");
    let mut id_file = BufWriter::new(std::fs::File::create(&id_path)?);
    for id in ids {
        writeln!(id_file, "{}", id)?;
    }
    id_file.flush()?;

    let inv_path = with_suffix(prefix, ".grm.inv");
    let mut inv_file = BufWriter::new(std::fs::File::create(&inv_path)?);
    let mut io_result = Ok(());
    vinv.for_each_entry(|i, j, v| {
        if io_result.is_err() {
            return;
        }
        let mut record = [0u8; RECORD_SIZE];
        record[0..4].copy_from_slice(&(i as i32).to_ne_bytes());
        record[4..8].copy_from_slice(&(j as i32).to_ne_bytes());
        record[8..16].copy_from_slice(&v.to_ne_bytes());
        io_result = inv_file.write_all(&record);
    });
    io_result?;
    inv_file.flush()?;

    info!(
        "The inverse has been saved to [{}]",
        inv_path.display()
    );
    Ok(())
}

/// Write the sentinel id file for a run that degraded to simple
/// regression and therefore has no inverse to store.
pub fn save_ols_sentinel(prefix: &Path) -> Result<(), FastFamError> {
    let id_path = with_suffix(prefix, ".grm.id");
    std::fs::write(&id_path, format!("{}\n", OLS_SENTINEL))?;
    Ok(())
}

/// Load a previously saved inverse.
///
/// Returns `Ok(None)` when the id file carries the OLS sentinel. The
/// id list must match the canonical order line for line; any
/// difference is `InvIdMismatch`.
pub fn load_v_inverse(
    base: &Path,
    canonical_ids: &[String],
) -> Result<Option<SparseMatrix>, FastFamError> {
    let id_path = with_suffix(base, ".grm.id");
    let contents = std::fs::read_to_string(&id_path)?;
    let lines: Vec<&str> = contents.lines().collect();

    if lines.first() == Some(&OLS_SENTINEL) {
        return Ok(None);
    }

    for (i, id) in canonical_ids.iter().enumerate() {
        if lines.get(i).copied() != Some(id.as_str()) {
            return Err(FastFamError::InvIdMismatch {
                line: i + 1,
                path: id_path.display().to_string(),
            });
        }
    }
    if lines.len() != canonical_ids.len() {
        return Err(FastFamError::InvIdMismatch {
            line: canonical_ids.len() + 1,
            path: id_path.display().to_string(),
        });
    }

    let inv_path = with_suffix(base, ".grm.inv");
    info!("Loading inverse of V from [{}]...", inv_path.display());
    let bytes = std::fs::read(&inv_path)?;
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(FastFamError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "truncated inverse file {} ({} bytes)",
                inv_path.display(),
                bytes.len()
            ),
        )));
    }

    let n = canonical_ids.len();
    let mut entries = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    for record in bytes.chunks_exact(RECORD_SIZE) {
        let row = i32::from_ne_bytes(record[0..4].try_into().unwrap());
        let col = i32::from_ne_bytes(record[4..8].try_into().unwrap());
        let val = f64::from_ne_bytes(record[8..16].try_into().unwrap());
        if row < 0 || col < 0 || row as usize >= n || col as usize >= n {
            return Err(FastFamError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("inverse entry ({}, {}) outside {} samples", row, col, n),
            )));
        }
        entries.push((row as usize, col as usize, val));
    }

    Ok(Some(SparseMatrix::from_entries(n, n, &entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banded_grm(n: usize) -> SparseMatrix {
        let mut entries = Vec::new();
        for i in 0..n {
            entries.push((i, i, 1.0));
            if i + 1 < n {
                entries.push((i, i + 1, 0.3));
                entries.push((i + 1, i, 0.3));
            }
        }
        SparseMatrix::from_entries(n, n, &entries)
    }

    fn frobenius_residual(v: &SparseMatrix, vinv: &SparseMatrix) -> f64 {
        let n = v.nrows();
        let mut acc = 0.0;
        let mut col = vec![0.0; n];
        for j in 0..n {
            for (i, c) in col.iter_mut().enumerate() {
                *c = vinv.get(i, j);
            }
            let vcol = v.mat_vec(&col);
            for i in 0..n {
                let target = if i == j { 1.0 } else { 0.0 };
                let r = vcol[i] - target;
                acc += r * r;
            }
        }
        acc.sqrt()
    }

    #[test]
    fn test_build_v_inverse_ldlt_roundtrip() {
        let grm = banded_grm(20);
        let (vg, ve) = (0.3, 0.7);
        let vinv = build_v_inverse(&grm, vg, ve, InvMethod::Ldlt).unwrap();
        let v = grm.scale_add_identity(vg, ve);
        let resid = frobenius_residual(&v, &vinv) / 20.0;
        assert!(resid < 1e-9, "residual {}", resid);
    }

    #[test]
    fn test_build_v_inverse_symmetric() {
        let grm = banded_grm(10);
        let vinv = build_v_inverse(&grm, 0.4, 0.6, InvMethod::Llt).unwrap();
        for i in 0..10 {
            for j in 0..10 {
                assert!((vinv.get(i, j) - vinv.get(j, i)).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let grm = banded_grm(8);
        let vinv = build_v_inverse(&grm, 0.25, 0.75, InvMethod::Ldlt).unwrap();
        let ids: Vec<String> = (0..8).map(|i| format!("S{}", i)).collect();

        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        save_v_inverse(&prefix, &ids, &vinv).unwrap();

        let loaded = load_v_inverse(&prefix, &ids).unwrap().unwrap();
        assert_eq!(loaded.nnz(), vinv.nnz());
        for i in 0..8 {
            for j in 0..8 {
                // bit-for-bit identical values through the binary file
                assert_eq!(loaded.get(i, j), vinv.get(i, j));
            }
        }
    }

    #[test]
    fn test_load_id_mismatch() {
        let grm = banded_grm(4);
        let vinv = build_v_inverse(&grm, 0.5, 0.5, InvMethod::Ldlt).unwrap();
        let ids: Vec<String> = (0..4).map(|i| format!("S{}", i)).collect();

        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        save_v_inverse(&prefix, &ids, &vinv).unwrap();

        let mut other = ids.clone();
        other.swap(1, 2);
        assert!(matches!(
            load_v_inverse(&prefix, &other),
            Err(FastFamError::InvIdMismatch { line: 2, .. })
        ));

        let shorter = &ids[..3];
        assert!(matches!(
            load_v_inverse(&prefix, shorter),
            Err(FastFamError::InvIdMismatch { .. })
        ));
    }

    #[test]
    fn test_ols_sentinel_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        save_ols_sentinel(&prefix).unwrap();
        let loaded = load_v_inverse(&prefix, &["S1".to_string()]).unwrap();
        assert!(loaded.is_none());
    }
}
