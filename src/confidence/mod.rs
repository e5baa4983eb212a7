//! Binning and confidence estimation
//!
//! For each tuning parameter the statistic space is cut into uniform bins.
//! The number of unpermuted features at or above each bin is compared with the
//! mean number of resampled features there; the corrected ratio gives the
//! confidence (1 - estimated FDR) of every feature in the bin.

mod adjust;
mod bins;

pub use adjust::{adjust_num_diff, adjust_perm_counts, confidence_scores};
pub use bins::{accumulate_from_top, assign_bin, BinScheme, BinTally};

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::testing::StatisticTable;

/// Per-bin counts and confidence scores (tuning params x bins)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinCounts {
    /// Unpermuted features in the bin or above
    pub unperm: Array2<f64>,
    /// Mean over replicates of resampled features in the bin or above
    pub mean_perm: Array2<f64>,
    /// Corrected, monotone version of `mean_perm`
    pub adjusted_perm: Array2<f64>,
    /// Confidence assigned to features in the bin
    pub scores: Array2<f64>,
}

impl BinCounts {
    /// Turn a complete tally into cumulative counts and scores.
    ///
    /// The bin walk is sequential; tuning parameters run in parallel.
    pub fn from_tally(tally: &BinTally) -> Self {
        let n_params = tally.n_tuning_params();
        let num_bins = tally.num_bins();
        let n_features = tally.n_features();

        let rows: Vec<[Vec<f64>; 4]> = (0..n_params)
            .into_par_iter()
            .map(|a| {
                let unperm = tally.unperm_cumulative(a);
                let mean_perm = tally.mean_perm_cumulative(a);
                let adjusted = adjust_perm_counts(&mean_perm, &unperm, n_features);
                let scores = confidence_scores(&unperm, &adjusted);
                [unperm, mean_perm, adjusted, scores]
            })
            .collect();

        let mut counts = Self {
            unperm: Array2::zeros((n_params, num_bins)),
            mean_perm: Array2::zeros((n_params, num_bins)),
            adjusted_perm: Array2::zeros((n_params, num_bins)),
            scores: Array2::zeros((n_params, num_bins)),
        };
        for (a, [unperm, mean_perm, adjusted, scores]) in rows.into_iter().enumerate() {
            for b in 0..num_bins {
                counts.unperm[[a, b]] = unperm[b];
                counts.mean_perm[[a, b]] = mean_perm[b];
                counts.adjusted_perm[[a, b]] = adjusted[b];
                counts.scores[[a, b]] = scores[b];
            }
        }
        counts
    }

    pub fn num_bins(&self) -> usize {
        self.scores.ncols()
    }

    pub fn score(&self, param: usize, bin: usize) -> f64 {
        self.scores[[param, bin]]
    }
}

/// Confidence of every feature at every tuning parameter (features x tuning params)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTable {
    values: Array2<f64>,
}

impl ConfidenceTable {
    /// Look up each feature's unpermuted bin score
    pub fn from_counts(stats: &StatisticTable, scheme: &BinScheme, counts: &BinCounts) -> Self {
        let (n_features, n_params, _) = stats.shape();
        let values = Array2::from_shape_fn((n_features, n_params), |(i, a)| {
            counts.score(a, scheme.bin(a, stats.get(i, a, 0)))
        });
        Self { values }
    }

    pub fn new(values: Array2<f64>) -> Self {
        Self { values }
    }

    pub fn get(&self, feature: usize, param: usize) -> f64 {
        self.values[[feature, param]]
    }

    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_tuning_params(&self) -> usize {
        self.values.ncols()
    }

    pub fn feature(&self, feature: usize) -> ArrayView1<'_, f64> {
        self.values.row(feature)
    }

    pub fn column(&self, param: usize) -> ArrayView1<'_, f64> {
        self.values.column(param)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }
}

/// Everything the confidence stage produces
#[derive(Debug, Clone)]
pub struct ConfidenceEstimate {
    pub scheme: BinScheme,
    pub counts: BinCounts,
    pub table: ConfidenceTable,
}

/// Bin the statistics, count tails and score every feature
pub fn estimate_confidence(stats: &StatisticTable, num_bins: usize) -> ConfidenceEstimate {
    log::info!(
        "Estimating confidence: {} bins, {} tuning parameters, {} replicates",
        num_bins,
        stats.n_tuning_params(),
        stats.n_replicates()
    );
    let scheme = BinScheme::from_statistics(stats, num_bins);
    let tally = BinTally::from_statistics(&scheme, stats);
    let counts = BinCounts::from_tally(&tally);
    let table = ConfidenceTable::from_counts(stats, &scheme, &counts);
    ConfidenceEstimate {
        scheme,
        counts,
        table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 20 features: 5 with large unpermuted statistics, replicates all small
    fn separated() -> StatisticTable {
        let mut v = Array3::zeros((20, 2, 6));
        for i in 0..20 {
            for a in 0..2 {
                let base = if i < 5 { 10.0 + i as f64 } else { i as f64 * 0.1 };
                v[[i, a, 0]] = base / (a + 1) as f64;
                for r in 1..6 {
                    v[[i, a, r]] = ((i * r) % 7) as f64 * 0.1 / (a + 1) as f64;
                }
            }
        }
        StatisticTable::new(v)
    }

    #[test]
    fn test_separated_features_get_full_confidence() {
        let est = estimate_confidence(&separated(), 10);
        for i in 0..5 {
            assert!((est.table.get(i, 0) - 1.0).abs() < 1e-12);
        }
        // Below the first bin edge every replicate matches it
        assert_eq!(est.table.get(5, 0), 0.0);
    }

    #[test]
    fn test_confidence_bounded_and_top_bin_highest() {
        let stats = separated();
        let est = estimate_confidence(&stats, 10);
        for a in 0..2 {
            let top = est.counts.score(a, 9);
            for b in 0..10 {
                assert!(est.counts.score(a, b) <= top);
                assert!(est.counts.adjusted_perm[[a, b]] <= est.counts.unperm[[a, b]]);
            }
        }
        assert!(est.table.values().iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn test_all_zero_statistics() {
        let stats = StatisticTable::new(Array3::zeros((4, 1, 3)));
        let est = estimate_confidence(&stats, 5);
        // Everything in bin 0, where the permuted tail equals the unpermuted one
        assert_eq!(est.counts.unperm[[0, 0]], 4.0);
        for i in 0..4 {
            assert_eq!(est.table.get(i, 0), 0.0);
        }
    }
}
