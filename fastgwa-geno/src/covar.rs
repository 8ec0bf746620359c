//! Covariate file parser.
//!
//! Whitespace-delimited `id v1 v2 ...` lines without a header. Every
//! row must carry the same number of numeric columns. Rows with any
//! missing value are dropped so the covariate design stays complete.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::phenotype::parse_value;

/// Covariate observations in file order.
#[derive(Debug, Clone)]
pub struct CovarData {
    pub sample_ids: Vec<String>,
    /// columns[j][i] is covariate j for sample i.
    pub columns: Vec<Vec<f64>>,
}

impl CovarData {
    pub fn n_covariates(&self) -> usize {
        self.columns.len()
    }

    /// Covariate row for the sample at position `i`.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }
}

/// Parse a covariate file, dropping rows with missing values.
pub fn read_covar_file(path: &Path) -> Result<CovarData> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read covariate file: {}", path.display()))?;

    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    let mut n_cols = None;

    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            bail!(
                "covariate file line {} has {} fields, expected at least 2",
                line_num + 1,
                fields.len()
            );
        }

        let k = fields.len() - 1;
        match n_cols {
            None => {
                n_cols = Some(k);
                columns = vec![Vec::new(); k];
            }
            Some(expected) if expected != k => {
                bail!(
                    "covariate file line {} has {} columns, expected {}",
                    line_num + 1,
                    k,
                    expected
                );
            }
            _ => {}
        }

        let values: Vec<f64> = fields[1..].iter().map(|s| parse_value(s)).collect();
        if values.iter().any(|v| v.is_nan()) {
            continue;
        }

        sample_ids.push(fields[0].to_string());
        for (j, v) in values.into_iter().enumerate() {
            columns[j].push(v);
        }
    }

    Ok(CovarData {
        sample_ids,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_covar_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covar.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "S1 45 1").unwrap();
        writeln!(f, "S2 50 2").unwrap();
        writeln!(f, "S3 NA 1").unwrap();

        let data = read_covar_file(&path).unwrap();
        assert_eq!(data.sample_ids, vec!["S1", "S2"]);
        assert_eq!(data.n_covariates(), 2);
        assert_eq!(data.columns[0], vec![45.0, 50.0]);
        assert_eq!(data.row(1), vec![50.0, 2.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.txt");
        std::fs::write(&path, "S1 1 2\nS2 3\n").unwrap();
        assert!(read_covar_file(&path).is_err());
    }
}
