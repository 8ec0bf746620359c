//! Phenotype file parser.
//!
//! Whitespace-delimited `id value` lines without a header. Samples
//! with a missing phenotype (`NA`, `.`, `-`, or unparseable) are
//! dropped here, so downstream stages only ever see complete
//! observations.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Phenotype observations in file order.
#[derive(Debug, Clone)]
pub struct PhenotypeData {
    pub sample_ids: Vec<String>,
    pub values: Vec<f64>,
}

/// Parse a phenotype file, dropping missing observations.
pub fn read_phenotype_file(path: &Path) -> Result<PhenotypeData> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read phenotype file: {}", path.display()))?;

    let mut sample_ids = Vec::new();
    let mut values = Vec::new();

    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            bail!(
                "phenotype file line {} has {} fields, expected at least 2",
                line_num + 1,
                fields.len()
            );
        }
        let value = parse_value(fields[1]);
        if value.is_nan() {
            continue;
        }
        sample_ids.push(fields[0].to_string());
        values.push(value);
    }

    Ok(PhenotypeData { sample_ids, values })
}

/// Parse a string value to f64, treating NA-style markers as NaN.
pub(crate) fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), 1.5);
        assert_eq!(parse_value("0"), 0.0);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value(".").is_nan());
        assert!(parse_value("abc").is_nan());
    }

    #[test]
    fn test_read_phenotype_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pheno.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "S1\t1.5").unwrap();
        writeln!(f, "S2 0.25").unwrap();
        writeln!(f, "S3\tNA").unwrap();
        writeln!(f, "S4\t-2").unwrap();

        let data = read_phenotype_file(&path).unwrap();
        assert_eq!(data.sample_ids, vec!["S1", "S2", "S4"]);
        assert_eq!(data.values, vec![1.5, 0.25, -2.0]);
    }

    #[test]
    fn test_short_line_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "S1\n").unwrap();
        assert!(read_phenotype_file(&path).is_err());
    }
}
