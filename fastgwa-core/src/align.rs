//! Sample alignment.
//!
//! Intersects the phenotype, covariate, and GRM id sets and fixes the
//! canonical sample order used by every downstream structure. The
//! order is the phenotype file's order of appearance, restricted to
//! ids present in all sources. Id matching is exact byte equality.

use std::collections::HashMap;

use crate::error::FastFamError;

/// The canonical sample order plus the permutations back into each
/// input source.
#[derive(Debug, Clone)]
pub struct SampleAlignment {
    /// Canonical sample ids.
    pub ids: Vec<String>,
    /// For each canonical position, the index into the phenotype order.
    pub pheno_indices: Vec<usize>,
    /// For each canonical position, the index into the covariate order.
    pub covar_indices: Option<Vec<usize>>,
    /// For each GRM row, the canonical position it maps to (None when
    /// the sample was dropped from the analysis).
    pub grm_map: Option<Vec<Option<usize>>>,
}

impl SampleAlignment {
    pub fn n_samples(&self) -> usize {
        self.ids.len()
    }
}

fn index_of(ids: &[String]) -> HashMap<&str, usize> {
    let mut map = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        map.entry(id.as_str()).or_insert(i);
    }
    map
}

/// Compute the canonical sample order.
pub fn align_samples(
    pheno_ids: &[String],
    covar_ids: Option<&[String]>,
    grm_ids: Option<&[String]>,
) -> Result<SampleAlignment, FastFamError> {
    let covar_lookup = covar_ids.map(index_of);
    let grm_lookup = grm_ids.map(index_of);

    let mut ids = Vec::new();
    let mut pheno_indices = Vec::new();
    let mut covar_indices = covar_lookup.as_ref().map(|_| Vec::new());
    let mut grm_positions = grm_lookup.as_ref().map(|_| Vec::new());

    for (p, id) in pheno_ids.iter().enumerate() {
        let covar_pos = match &covar_lookup {
            Some(lookup) => match lookup.get(id.as_str()) {
                Some(&c) => Some(c),
                None => continue,
            },
            None => None,
        };
        let grm_pos = match &grm_lookup {
            Some(lookup) => match lookup.get(id.as_str()) {
                Some(&g) => Some(g),
                None => continue,
            },
            None => None,
        };

        ids.push(id.clone());
        pheno_indices.push(p);
        if let (Some(list), Some(c)) = (covar_indices.as_mut(), covar_pos) {
            list.push(c);
        }
        if let (Some(list), Some(g)) = (grm_positions.as_mut(), grm_pos) {
            list.push(g);
        }
    }

    if ids.is_empty() {
        return Err(FastFamError::Align(
            "no samples remain after intersecting phenotype, covariate, and GRM ids".into(),
        ));
    }

    let grm_map = match (grm_ids, grm_positions) {
        (Some(all), Some(positions)) => {
            let mut map = vec![None; all.len()];
            for (canonical, grm_row) in positions.into_iter().enumerate() {
                map[grm_row] = Some(canonical);
            }
            Some(map)
        }
        _ => None,
    };

    Ok(SampleAlignment {
        ids,
        pheno_indices,
        covar_indices,
        grm_map,
    })
}

/// Gather values into canonical order through a permutation.
pub fn reorder(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}
