//! Measurement table: one row per feature, one column per sample

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{PadeError, Result};

/// Deduplicate feature ids by appending _1, _2, etc. to repeats
fn deduplicate_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for id in &ids {
        *seen.entry(id.clone()).or_insert(0) += 1;
    }
    if !seen.values().any(|&c| c > 1) {
        return ids;
    }
    seen.clear();
    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        let count = seen.entry(id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(id);
        } else {
            let renamed = format!("{}_{}", id, *count - 1);
            log::warn!("Duplicate feature id '{}' renamed to '{}'", id, renamed);
            result.push(renamed);
        }
    }
    result
}

/// Features x samples matrix of measured values.
///
/// The row count is fixed for the lifetime of a job. Values must be finite;
/// missing values are not supported.
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    values: Array2<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl MeasurementTable {
    /// Create a new measurement table
    pub fn new(
        values: Array2<f64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_features, n_samples) = values.dim();

        if feature_ids.len() != n_features {
            return Err(PadeError::DimensionMismatch {
                expected: format!("{} feature ids", n_features),
                got: format!("{} feature ids", feature_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(PadeError::DimensionMismatch {
                expected: format!("{} sample ids", n_samples),
                got: format!("{} sample ids", sample_ids.len()),
            });
        }

        if n_features == 0 || n_samples == 0 {
            return Err(PadeError::EmptyData {
                reason: format!("table has {} features and {} samples", n_features, n_samples),
            });
        }

        if let Some(((i, j), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PadeError::InvalidMeasurementTable {
                reason: format!(
                    "value {} for feature '{}' in sample '{}' is not finite; missing values are not supported",
                    v, feature_ids[i], sample_ids[j]
                ),
            });
        }

        {
            let mut seen = std::collections::HashSet::new();
            for id in &sample_ids {
                if !seen.insert(id) {
                    return Err(PadeError::InvalidMeasurementTable {
                        reason: format!("duplicate sample id '{}'", id),
                    });
                }
            }
        }

        let feature_ids = deduplicate_ids(feature_ids);

        Ok(Self {
            values,
            feature_ids,
            sample_ids,
        })
    }

    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    /// Get the raw values as a view
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the values for a single feature
    pub fn feature_values(&self, feature_idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(feature_idx)
    }

    pub fn feature_index(&self, feature_id: &str) -> Option<usize> {
        self.feature_ids.iter().position(|id| id == feature_id)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Restrict the table to a contiguous block of features.
    ///
    /// Every downstream table is decomposable by feature range, so callers
    /// with a memory budget can process a large table block by block.
    pub fn feature_block(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.n_features() {
            return Err(PadeError::InvalidInput {
                reason: format!(
                    "feature block {}..{} is out of range for {} features",
                    start,
                    end,
                    self.n_features()
                ),
            });
        }
        let idx: Vec<usize> = (start..end).collect();
        Ok(Self {
            values: self.values.select(Axis(0), &idx),
            feature_ids: self.feature_ids[start..end].to_vec(),
            sample_ids: self.sample_ids.clone(),
        })
    }
}
