//! Resampled replicates and the statistic table they feed
//!
//! Every replicate applies one arrangement of sample indexes to all
//! features. In raw mode the measured values are rearranged and both models
//! are refit. In residual mode the full-model residuals are rearranged and
//! added to fixed fitted values, by default those of the full model.

mod indexes;

pub use indexes::{ResamplingStrategy, SampleIndexes};

use ndarray::{s, Array2, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::MeasurementTable;
use crate::model::{layout_rss, Design, FitResult};
use crate::testing::{FTest, StatisticTable};

/// Fitted values that resampled residuals are added to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FittedBase {
    /// Reduced-model fit: replicates follow the null hypothesis
    Reduced,
    /// Full-model fit: replicates keep the observed condition effect
    #[default]
    Full,
}

/// What gets rearranged to build a replicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleSource {
    /// Measured values, refit per replicate
    Raw,
    /// Full-model residuals on top of fixed fitted values
    Residuals(FittedBase),
}

/// Builds replicate datasets and their statistics
pub struct Resampler<'a> {
    design: &'a Design,
    indexes: SampleIndexes,
    source: ResampleSource,
}

impl<'a> Resampler<'a> {
    pub fn new(design: &'a Design, indexes: SampleIndexes, source: ResampleSource) -> Self {
        Self {
            design,
            indexes,
            source,
        }
    }

    pub fn indexes(&self) -> &SampleIndexes {
        &self.indexes
    }

    pub fn n_replicates(&self) -> usize {
        self.indexes.n_replicates()
    }

    /// Write the synthetic values of `feature` for replicate `k + 1` into `out`.
    ///
    /// Returns false when the residual pool of the feature is all zero; the
    /// replicate statistic of such a feature is zero.
    pub fn synthetic_values(
        &self,
        table: &MeasurementTable,
        fit: &FitResult,
        feature: usize,
        k: usize,
        out: &mut [f64],
    ) -> bool {
        let idx = self.indexes.row(k);
        match self.source {
            ResampleSource::Raw => {
                let values = table.feature_values(feature);
                for (slot, &src) in out.iter_mut().zip(idx.iter()) {
                    *slot = values[src];
                }
                true
            }
            ResampleSource::Residuals(base) => {
                let residuals = fit.full.residuals.row(feature);
                if residuals.iter().all(|&r| r == 0.0) {
                    return false;
                }
                let fitted = match base {
                    FittedBase::Reduced => fit.reduced.fitted.row(feature),
                    FittedBase::Full => fit.full.fitted.row(feature),
                };
                for (j, (slot, &src)) in out.iter_mut().zip(idx.iter()).enumerate() {
                    *slot = fitted[j] + residuals[src];
                }
                true
            }
        }
    }

    /// Statistics of every feature (features x tuning params) for replicate `k + 1`
    pub fn replicate_statistics(
        &self,
        table: &MeasurementTable,
        fit: &FitResult,
        ftest: &FTest,
        k: usize,
    ) -> Array2<f64> {
        let n_features = table.n_features();
        let n_params = ftest.tuning_params().len();
        let mut stats = Array2::zeros((n_features, n_params));
        let mut synthetic = vec![0.0; table.n_samples()];
        let mut row = vec![0.0; n_params];

        for i in 0..n_features {
            if !self.synthetic_values(table, fit, i, k, &mut synthetic) {
                continue;
            }
            let rss_full = layout_rss(&synthetic, self.design.full_layout());
            let rss_reduced = layout_rss(&synthetic, self.design.reduced_layout());
            ftest.statistics_into(rss_full, rss_reduced, &mut row);
            for (a, &v) in row.iter().enumerate() {
                stats[[i, a]] = v;
            }
        }
        stats
    }

    /// Full statistic table: replicate 0 from the observed fits, then one
    /// slice per resampled replicate, computed in parallel.
    pub fn statistic_table(
        &self,
        table: &MeasurementTable,
        fit: &FitResult,
        ftest: &FTest,
    ) -> StatisticTable {
        let n_features = table.n_features();
        let n_params = ftest.tuning_params().len();
        let n_replicates = self.n_replicates();

        log::info!(
            "Computing statistics for {} replicates ({:?})",
            n_replicates,
            self.source
        );

        let replicates: Vec<Array2<f64>> = (0..n_replicates)
            .into_par_iter()
            .map(|k| self.replicate_statistics(table, fit, ftest, k))
            .collect();

        let mut values = Array3::zeros((n_features, n_params, n_replicates + 1));
        values.slice_mut(s![.., .., 0]).assign(&ftest.compute(fit));
        for (k, rep) in replicates.iter().enumerate() {
            values.slice_mut(s![.., .., k + 1]).assign(rep);
        }
        StatisticTable::new(values)
    }
}
