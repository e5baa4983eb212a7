//! Discretization of statistic space and per-bin feature tallies
//!
//! Bins are uniform on `[0, max]`, where `max` is the largest unpermuted
//! statistic for the tuning parameter. The same scale is used for the
//! unpermuted replicate and every resampled one, so a permuted statistic above
//! `max` lands in the top bin.

use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::testing::{StatisticTable, STAT_SENTINEL};

/// Bin index of `stat` on a uniform `[0, max]` scale with `num_bins` bins
pub fn assign_bin(stat: f64, max: f64, num_bins: usize) -> usize {
    let top = num_bins - 1;
    if stat >= STAT_SENTINEL {
        return top;
    }
    if max <= 0.0 {
        return if stat > 0.0 { top } else { 0 };
    }
    let scaled = (stat / max * num_bins as f64).floor();
    if scaled <= 0.0 {
        0
    } else {
        (scaled as usize).min(top)
    }
}

/// Number of bins and the normalizing maximum for each tuning parameter
#[derive(Debug, Clone, PartialEq)]
pub struct BinScheme {
    num_bins: usize,
    max_stats: Vec<f64>,
}

impl BinScheme {
    pub fn new(num_bins: usize, max_stats: Vec<f64>) -> Self {
        Self { num_bins, max_stats }
    }

    /// Scale every tuning parameter by its largest unpermuted statistic
    pub fn from_statistics(stats: &StatisticTable, num_bins: usize) -> Self {
        let max_stats: Vec<f64> = (0..stats.n_tuning_params())
            .map(|a| stats.max_unpermuted(a))
            .collect();
        for (a, max) in max_stats.iter().enumerate() {
            log::debug!("Tuning parameter {}: max unpermuted statistic {:.4}", a, max);
        }
        Self::new(num_bins, max_stats)
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn n_tuning_params(&self) -> usize {
        self.max_stats.len()
    }

    pub fn max_stat(&self, param: usize) -> f64 {
        self.max_stats[param]
    }

    pub fn max_stats(&self) -> &[f64] {
        &self.max_stats
    }

    /// Bin of `stat` for tuning parameter `param`
    pub fn bin(&self, param: usize, stat: f64) -> usize {
        assign_bin(stat, self.max_stats[param], self.num_bins)
    }

    /// Bin of every cell of a statistic table (features x tuning params x replicates)
    pub fn assignments(&self, stats: &StatisticTable) -> Array3<usize> {
        let (n_features, n_params, n_reps) = stats.shape();
        Array3::from_shape_fn((n_features, n_params, n_reps), |(i, a, r)| {
            self.bin(a, stats.get(i, a, r))
        })
    }
}

/// Per-bin feature counts (not cumulative) for one or more feature blocks.
///
/// Tallies of disjoint feature blocks add up to the tally of the whole
/// table, so a large job can be counted one block at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTally {
    /// Unpermuted features per bin (tuning params x bins)
    unperm: Array2<u64>,
    /// Resampled features per bin summed over all replicates (tuning params x bins)
    perm: Array2<u64>,
    n_features: usize,
    n_replicates: usize,
}

impl BinTally {
    pub fn empty(n_params: usize, num_bins: usize, n_replicates: usize) -> Self {
        Self {
            unperm: Array2::zeros((n_params, num_bins)),
            perm: Array2::zeros((n_params, num_bins)),
            n_features: 0,
            n_replicates,
        }
    }

    /// Count the features of `stats` into bins.
    ///
    /// Tuning parameters are counted in parallel; within one, the replicates
    /// are folded into partial histograms that are summed at the end.
    pub fn from_statistics(scheme: &BinScheme, stats: &StatisticTable) -> Self {
        let num_bins = scheme.num_bins();
        let n_params = stats.n_tuning_params();
        let n_replicates = stats.n_replicates();

        let rows: Vec<(Vec<u64>, Vec<u64>)> = (0..n_params)
            .into_par_iter()
            .map(|a| {
                let mut unperm = vec![0u64; num_bins];
                for &v in stats.column(a, 0).iter() {
                    unperm[scheme.bin(a, v)] += 1;
                }
                let perm = (1..=n_replicates)
                    .into_par_iter()
                    .fold(
                        || vec![0u64; num_bins],
                        |mut acc, r| {
                            for &v in stats.column(a, r).iter() {
                                acc[scheme.bin(a, v)] += 1;
                            }
                            acc
                        },
                    )
                    .reduce(
                        || vec![0u64; num_bins],
                        |mut x, y| {
                            for (slot, c) in x.iter_mut().zip(y) {
                                *slot += c;
                            }
                            x
                        },
                    );
                (unperm, perm)
            })
            .collect();

        let mut tally = Self::empty(n_params, num_bins, n_replicates);
        tally.n_features = stats.n_features();
        for (a, (unperm, perm)) in rows.into_iter().enumerate() {
            for b in 0..num_bins {
                tally.unperm[[a, b]] = unperm[b];
                tally.perm[[a, b]] = perm[b];
            }
        }
        tally
    }

    /// Add the tally of another feature block
    pub fn merge(&mut self, other: &BinTally) {
        self.unperm += &other.unperm;
        self.perm += &other.perm;
        self.n_features += other.n_features;
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_replicates(&self) -> usize {
        self.n_replicates
    }

    pub fn num_bins(&self) -> usize {
        self.unperm.ncols()
    }

    pub fn n_tuning_params(&self) -> usize {
        self.unperm.nrows()
    }

    /// Unpermuted features in `bin` or above
    pub fn unperm_cumulative(&self, param: usize) -> Vec<f64> {
        accumulate_from_top(self.unperm.row(param).iter().map(|&c| c as f64))
    }

    /// Mean over replicates of the resampled features in `bin` or above
    pub fn mean_perm_cumulative(&self, param: usize) -> Vec<f64> {
        let reps = self.n_replicates.max(1) as f64;
        accumulate_from_top(self.perm.row(param).iter().map(|&c| c as f64 / reps))
    }
}

/// Cumulative sums taken from the highest bin down
pub fn accumulate_from_top(counts: impl DoubleEndedIterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = counts
        .rev()
        .scan(0.0, |acc, c| {
            *acc += c;
            Some(*acc)
        })
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_bin_boundaries() {
        assert_eq!(assign_bin(0.0, 10.0, 10), 0);
        assert_eq!(assign_bin(0.99, 10.0, 10), 0);
        assert_eq!(assign_bin(1.0, 10.0, 10), 1);
        assert_eq!(assign_bin(9.99, 10.0, 10), 9);
        // The maximum itself goes to the top bin
        assert_eq!(assign_bin(10.0, 10.0, 10), 9);
        assert_eq!(assign_bin(55.0, 10.0, 10), 9);
        assert_eq!(assign_bin(STAT_SENTINEL, 10.0, 10), 9);
    }

    #[test]
    fn test_assign_bin_without_scale() {
        assert_eq!(assign_bin(0.0, 0.0, 5), 0);
        assert_eq!(assign_bin(0.3, 0.0, 5), 4);
    }

    #[test]
    fn test_accumulate_from_top() {
        let c = accumulate_from_top(vec![1.0, 0.0, 2.0, 3.0].into_iter());
        assert_eq!(c, vec![6.0, 5.0, 5.0, 3.0]);
    }

    fn stats() -> StatisticTable {
        // 4 features, 1 tuning param, unpermuted + 2 replicates
        let mut v = Array3::zeros((4, 1, 3));
        for (i, s) in [0.0, 2.5, 5.0, 10.0].iter().enumerate() {
            v[[i, 0, 0]] = *s;
        }
        for (i, s) in [1.0, 1.0, 6.0, 0.0].iter().enumerate() {
            v[[i, 0, 1]] = *s;
        }
        for (i, s) in [0.0, 20.0, 3.0, 2.0].iter().enumerate() {
            v[[i, 0, 2]] = *s;
        }
        StatisticTable::new(v)
    }

    #[test]
    fn test_tally_counts() {
        let stats = stats();
        let scheme = BinScheme::from_statistics(&stats, 4);
        assert_eq!(scheme.max_stat(0), 10.0);
        let tally = BinTally::from_statistics(&scheme, &stats);
        // bins of 2.5 each: unpermuted -> 0, 1, 2, 3
        assert_eq!(tally.unperm_cumulative(0), vec![4.0, 3.0, 2.0, 1.0]);
        // replicate 1 -> 0, 0, 2, 0; replicate 2 -> 0, 3, 1, 0
        assert_eq!(tally.mean_perm_cumulative(0), vec![4.0, 1.5, 1.0, 0.5]);
        assert_eq!(tally.n_features(), 4);
    }

    #[test]
    fn test_merged_blocks_match_whole() {
        let stats = stats();
        let scheme = BinScheme::from_statistics(&stats, 4);
        let whole = BinTally::from_statistics(&scheme, &stats);

        let head = StatisticTable::new(stats.values().slice(ndarray::s![..2, .., ..]).to_owned());
        let tail = StatisticTable::new(stats.values().slice(ndarray::s![2.., .., ..]).to_owned());
        let mut merged = BinTally::empty(1, 4, 2);
        merged.merge(&BinTally::from_statistics(&scheme, &head));
        merged.merge(&BinTally::from_statistics(&scheme, &tail));
        assert_eq!(merged, whole);
    }

    #[test]
    fn test_assignments_shape() {
        let stats = stats();
        let scheme = BinScheme::from_statistics(&stats, 4);
        let bins = scheme.assignments(&stats);
        assert_eq!(bins.dim(), (4, 1, 3));
        assert_eq!(bins[[3, 0, 0]], 3);
        assert_eq!(bins[[1, 0, 2]], 3);
    }
}
