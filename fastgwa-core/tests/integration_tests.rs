//! End-to-end pipeline tests over synthetic cohorts.
//!
//! Each test writes a small PLINK fileset (plus phenotype, covariate,
//! and sparse GRM files as needed) into a temp directory, runs the
//! full pipeline, and checks the written outputs.

use std::io::Write;
use std::path::{Path, PathBuf};

use fastgwa_core::config::FastFamConfig;
use fastgwa_core::pipeline;

/// Write a bed/bim/fam fixture. `genotypes[m][s]` holds dosages with
/// -1 encoding missing.
fn write_plink(dir: &Path, name: &str, ids: &[&str], genotypes: &[Vec<i8>]) -> PathBuf {
    let prefix = dir.join(name);

    let mut fam = std::fs::File::create(prefix.with_extension("fam")).unwrap();
    for id in ids {
        writeln!(fam, "F{} {} 0 0 1 -9", id, id).unwrap();
    }

    let mut bim = std::fs::File::create(prefix.with_extension("bim")).unwrap();
    for (m, _) in genotypes.iter().enumerate() {
        writeln!(bim, "1 snp{} 0 {} A C", m + 1, 1000 + m).unwrap();
    }

    let mut bed = vec![0x6Cu8, 0x1B, 0x01];
    let bytes_per_marker = ids.len().div_ceil(4);
    for marker in genotypes {
        let mut bytes = vec![0u8; bytes_per_marker];
        for (s, &g) in marker.iter().enumerate() {
            let bits: u8 = match g {
                0 => 0b11,
                1 => 0b10,
                2 => 0b00,
                _ => 0b01,
            };
            bytes[s / 4] |= bits << ((s % 4) * 2);
        }
        bed.extend_from_slice(&bytes);
    }
    std::fs::write(prefix.with_extension("bed"), &bed).unwrap();

    prefix
}

fn write_pheno(dir: &Path, name: &str, pairs: &[(&str, f64)]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for (id, v) in pairs {
        writeln!(f, "{}\t{}", id, v).unwrap();
    }
    path
}

fn write_covar(dir: &Path, name: &str, rows: &[(&str, Vec<f64>)]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for (id, values) in rows {
        let cols: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        writeln!(f, "{}\t{}", id, cols.join("\t")).unwrap();
    }
    path
}

/// Write a sparse GRM pair of files. Triples are (i, j, value) with
/// i <= j in the order of `ids`.
fn write_grm(dir: &Path, name: &str, ids: &[&str], triples: &[(usize, usize, f64)]) -> PathBuf {
    let base = dir.join(name);
    let mut id_file = std::fs::File::create(dir.join(format!("{}.grm.id", name))).unwrap();
    for id in ids {
        writeln!(id_file, "{}", id).unwrap();
    }
    let mut sp = std::fs::File::create(dir.join(format!("{}.grm.sp", name))).unwrap();
    for (i, j, v) in triples {
        writeln!(sp, "{} {} {}", i, j, v).unwrap();
    }
    base
}

/// Parse a text results file into (af, beta, se, p) rows.
fn parse_assoc(path: &Path) -> Vec<(f64, f64, f64, f64)> {
    let contents = std::fs::read_to_string(path).unwrap();
    contents
        .lines()
        .skip(1)
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            let tail = &fields[fields.len() - 4..];
            (
                tail[0].parse().unwrap(),
                tail[1].parse().unwrap(),
                tail[2].parse().unwrap(),
                tail[3].parse().unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_ols_pipeline_matches_reference_regression() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4", "S5", "S6"];
    let genotypes = vec![vec![0, 1, 2, 1, 0, 2], vec![2, 2, 1, 0, 1, 0]];
    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);
    let pheno = write_pheno(
        dir.path(),
        "pheno.txt",
        &[
            ("S1", 0.5),
            ("S2", 1.2),
            ("S3", 2.9),
            ("S4", 1.4),
            ("S5", 0.1),
            ("S6", 3.1),
        ],
    );

    let config = FastFamConfig::new(bfile, pheno, dir.path().join("run"));
    pipeline::run(&config).unwrap();

    let rows = parse_assoc(&config.assoc_path());
    assert_eq!(rows.len(), 2);

    // Reference: centered standardized genotype against the centered
    // phenotype, beta = x'y / x'x, se = 1/sqrt(x'x)
    let y_raw = [0.5, 1.2, 2.9, 1.4, 0.1, 3.1];
    let y_mean: f64 = y_raw.iter().sum::<f64>() / 6.0;
    for (m, marker) in genotypes.iter().enumerate() {
        let dosages: Vec<f64> = marker.iter().map(|&g| g as f64).collect();
        let af = dosages.iter().sum::<f64>() / (2.0 * 6.0);
        let sd = (2.0 * af * (1.0 - af)).sqrt();
        let x: Vec<f64> = dosages.iter().map(|&g| (g - 2.0 * af) / sd).collect();

        let mut d = 0.0;
        let mut xy = 0.0;
        for i in 0..6 {
            d += x[i] * x[i];
            xy += x[i] * (y_raw[i] - y_mean);
        }
        let beta = xy / d;
        let se = (1.0 / d).sqrt();

        let (out_af, out_beta, out_se, _) = rows[m];
        assert!((out_af - af).abs() < 1e-6, "marker {} af", m);
        assert!(
            (out_beta - beta).abs() < 1e-5,
            "marker {}: beta {} vs {}",
            m,
            out_beta,
            beta
        );
        assert!((out_se - se).abs() < 1e-5, "marker {} se", m);
    }
}

#[test]
fn test_mean_centering_dump() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3"];
    let bfile = write_plink(dir.path(), "geno", &ids, &[vec![0, 1, 2]]);
    let pheno = write_pheno(
        dir.path(),
        "pheno.txt",
        &[("S1", 10.0), ("S2", 20.0), ("S3", 30.0)],
    );

    let mut config = FastFamConfig::new(bfile, pheno, dir.path().join("run"));
    config.save_pheno = true;
    pipeline::run(&config).unwrap();

    let cphen = std::fs::read_to_string(config.cphen_path()).unwrap();
    let values: Vec<(String, f64)> = cphen
        .lines()
        .map(|l| {
            let mut it = l.split('\t');
            let id = it.next().unwrap().to_string();
            let v: f64 = it.next().unwrap().parse().unwrap();
            (id, v)
        })
        .collect();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], ("S1".to_string(), -10.0));
    assert_eq!(values[1], ("S2".to_string(), 0.0));
    assert_eq!(values[2], ("S3".to_string(), 10.0));
}

#[test]
fn test_covariate_projection_leaves_zero_phenotype() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4"];
    let bfile = write_plink(dir.path(), "geno", &ids, &[vec![0, 1, 2, 1]]);
    let pheno = write_pheno(
        dir.path(),
        "pheno.txt",
        &[("S1", 1.0), ("S2", 2.0), ("S3", 3.0), ("S4", 4.0)],
    );
    let covar = write_covar(
        dir.path(),
        "covar.txt",
        &[
            ("S1", vec![0.0]),
            ("S2", vec![1.0]),
            ("S3", vec![2.0]),
            ("S4", vec![3.0]),
        ],
    );

    let mut config = FastFamConfig::new(bfile, pheno, dir.path().join("run"));
    config.covar_file = Some(covar);
    config.save_pheno = true;
    pipeline::run(&config).unwrap();

    let cphen = std::fs::read_to_string(config.cphen_path()).unwrap();
    for line in cphen.lines() {
        let v: f64 = line.split('\t').nth(1).unwrap().parse().unwrap();
        assert!(v.abs() < 1e-12, "residual {}", v);
    }
}

#[test]
fn test_identity_grm_degrades_to_ols() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4", "S5", "S6"];
    let genotypes = vec![vec![0, 1, 2, 1, 0, 2]];
    let pheno_rows = [
        ("S1", 0.4),
        ("S2", -0.7),
        ("S3", 1.3),
        ("S4", 0.2),
        ("S5", -1.1),
        ("S6", 0.9),
    ];

    // Identity GRM: diagonal entries only, no related pairs
    let diag: Vec<(usize, usize, f64)> = (0..6).map(|i| (i, i, 1.0)).collect();
    let grm = write_grm(dir.path(), "rel", &ids, &diag);

    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);
    let pheno = write_pheno(dir.path(), "pheno.txt", &pheno_rows);

    let mut with_grm = FastFamConfig::new(bfile.clone(), pheno.clone(), dir.path().join("mixed"));
    with_grm.grm_sparse = Some(grm);
    pipeline::run(&with_grm).unwrap();

    let without_grm = FastFamConfig::new(bfile, pheno, dir.path().join("plain"));
    pipeline::run(&without_grm).unwrap();

    // Vg is unidentifiable, so the run must fall back to exactly the
    // simple-regression output
    let mixed = std::fs::read_to_string(with_grm.assoc_path()).unwrap();
    let plain = std::fs::read_to_string(without_grm.assoc_path()).unwrap();
    assert_eq!(mixed, plain);
}

#[test]
fn test_save_load_inverse_bitwise_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4", "S5", "S6"];
    let genotypes = vec![
        vec![0, 1, 2, 1, 0, 2],
        vec![2, 1, 0, 0, 1, 2],
        vec![1, 1, 0, 2, 1, 0],
    ];
    let pheno_rows = [
        ("S1", 0.4),
        ("S2", -0.7),
        ("S3", 1.3),
        ("S4", 0.2),
        ("S5", -1.1),
        ("S6", 0.9),
    ];
    // Two sib pairs plus an unrelated tail
    let triples = [
        (0, 0, 1.0),
        (1, 1, 1.0),
        (2, 2, 1.0),
        (3, 3, 1.0),
        (4, 4, 1.0),
        (5, 5, 1.0),
        (0, 1, 0.5),
        (2, 3, 0.5),
    ];
    let grm = write_grm(dir.path(), "rel", &ids, &triples);
    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);
    let pheno = write_pheno(dir.path(), "pheno.txt", &pheno_rows);

    // Direct mixed run with fixed variance components
    let mut direct = FastFamConfig::new(bfile.clone(), pheno.clone(), dir.path().join("direct"));
    direct.grm_sparse = Some(grm.clone());
    direct.ge = Some((0.3, 0.7));
    direct.save_bin = true;
    pipeline::run(&direct).unwrap();

    // Save the inverse, then reload it in a fresh run
    let mut saver = FastFamConfig::new(bfile.clone(), pheno.clone(), dir.path().join("saved"));
    saver.grm_sparse = Some(grm);
    saver.ge = Some((0.3, 0.7));
    saver.save_inv = true;
    pipeline::run(&saver).unwrap();
    // save-inv stops before the marker loop
    assert!(!saver.assoc_path().exists());

    let mut loader = FastFamConfig::new(bfile, pheno, dir.path().join("loaded"));
    loader.load_inv = Some(dir.path().join("saved"));
    loader.save_bin = true;
    pipeline::run(&loader).unwrap();

    let direct_bin = {
        let mut p = direct.assoc_path().into_os_string();
        p.push(".bin");
        std::fs::read(PathBuf::from(p)).unwrap()
    };
    let loaded_bin = {
        let mut p = loader.assoc_path().into_os_string();
        p.push(".bin");
        std::fs::read(PathBuf::from(p)).unwrap()
    };
    assert_eq!(direct_bin, loaded_bin);
}

#[test]
fn test_load_inverse_rejects_different_cohort() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4"];
    let genotypes = vec![vec![0, 1, 2, 1]];
    let triples = [
        (0, 0, 1.0),
        (1, 1, 1.0),
        (2, 2, 1.0),
        (3, 3, 1.0),
        (0, 1, 0.4),
    ];
    let grm = write_grm(dir.path(), "rel", &ids, &triples);
    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);
    let pheno = write_pheno(
        dir.path(),
        "pheno.txt",
        &[("S1", 0.5), ("S2", -0.5), ("S3", 1.0), ("S4", -1.0)],
    );

    let mut saver = FastFamConfig::new(bfile.clone(), pheno, dir.path().join("saved"));
    saver.grm_sparse = Some(grm);
    saver.ge = Some((0.4, 0.6));
    saver.save_inv = true;
    pipeline::run(&saver).unwrap();

    // Same files minus one sample: the id check must fail
    let pheno_subset = write_pheno(
        dir.path(),
        "pheno2.txt",
        &[("S1", 0.5), ("S2", -0.5), ("S3", 1.0)],
    );
    let mut loader = FastFamConfig::new(bfile, pheno_subset, dir.path().join("loaded"));
    loader.load_inv = Some(dir.path().join("saved"));
    let err = pipeline::run(&loader).unwrap_err();
    assert!(
        err.to_string().contains("does not match"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_af_gating_preserves_row_positions() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4"];
    let genotypes = vec![vec![0, 0, 0, 0], vec![0, 1, 2, 1], vec![2, 2, 2, 2]];
    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);
    let pheno = write_pheno(
        dir.path(),
        "pheno.txt",
        &[("S1", 0.2), ("S2", 1.4), ("S3", -0.6), ("S4", 0.8)],
    );

    let config = FastFamConfig::new(bfile, pheno, dir.path().join("run"));
    pipeline::run(&config).unwrap();

    let rows = parse_assoc(&config.assoc_path());
    assert_eq!(rows.len(), 3);

    let (af0, b0, s0, p0) = rows[0];
    assert_eq!(af0, 0.0);
    assert!(b0.is_nan() && s0.is_nan() && p0.is_nan());

    let (af1, b1, s1, p1) = rows[1];
    assert!((af1 - 0.5).abs() < 1e-9);
    assert!(b1.is_finite() && s1.is_finite() && p1.is_finite());

    let (af2, b2, s2, p2) = rows[2];
    assert_eq!(af2, 1.0);
    assert!(b2.is_nan() && s2.is_nan() && p2.is_nan());
}

#[test]
fn test_phenotype_order_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let ids = ["S1", "S2", "S3", "S4", "S5"];
    let genotypes = vec![vec![0, 1, 2, 1, 0], vec![1, 0, 1, 2, 2]];
    let bfile = write_plink(dir.path(), "geno", &ids, &genotypes);

    let rows = [
        ("S1", 0.3),
        ("S2", -0.9),
        ("S3", 1.7),
        ("S4", 0.4),
        ("S5", -0.5),
    ];
    let pheno_a = write_pheno(dir.path(), "pheno_a.txt", &rows);
    let shuffled = [rows[3], rows[0], rows[4], rows[2], rows[1]];
    let pheno_b = write_pheno(dir.path(), "pheno_b.txt", &shuffled);

    let config_a = FastFamConfig::new(bfile.clone(), pheno_a, dir.path().join("a"));
    pipeline::run(&config_a).unwrap();
    let config_b = FastFamConfig::new(bfile, pheno_b, dir.path().join("b"));
    pipeline::run(&config_b).unwrap();

    let a = parse_assoc(&config_a.assoc_path());
    let b = parse_assoc(&config_b.assoc_path());
    for (m, (ra, rb)) in a.iter().zip(b.iter()).enumerate() {
        assert!((ra.1 - rb.1).abs() < 1e-5, "marker {} beta", m);
        assert!((ra.2 - rb.2).abs() < 1e-5, "marker {} se", m);
        assert!((ra.3 - rb.3).abs() < 1e-5, "marker {} p", m);
    }
}
