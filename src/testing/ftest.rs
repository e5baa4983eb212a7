//! Tuned F statistic comparing the full and reduced model fits
//!
//! statistic(alpha) = (RSS_reduced - RSS_full) / (RSS_full / df_full + alpha)
//!
//! The tuning parameter alpha keeps features with almost no within-group
//! variance from producing huge statistics. The value is non-negative and
//! non-increasing in alpha. When the denominator is zero (alpha = 0 and a
//! perfect full-model fit) the statistic is capped at `STAT_SENTINEL`, which
//! always lands in the top bin.

use ndarray::{Array2, Array3, ArrayView1};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::model::{Design, FitResult};

/// Stand-in for an infinite statistic
pub const STAT_SENTINEL: f64 = f64::MAX;

/// Tuned F statistic from residual sums of squares
pub fn tuned_f(rss_full: f64, rss_reduced: f64, df_full: usize, alpha: f64) -> f64 {
    let numer = (rss_reduced - rss_full).max(0.0);
    if numer == 0.0 {
        return 0.0;
    }
    let denom = rss_full / df_full as f64 + alpha;
    if denom <= 0.0 {
        return STAT_SENTINEL;
    }
    let stat = numer / denom;
    if stat.is_finite() {
        stat
    } else {
        STAT_SENTINEL
    }
}

/// The F statistic evaluated at every tuning parameter of a job
#[derive(Debug, Clone)]
pub struct FTest {
    tuning_params: Vec<f64>,
    df_full: usize,
}

impl FTest {
    pub fn new(design: &Design, tuning_params: &[f64]) -> Self {
        Self {
            tuning_params: tuning_params.to_vec(),
            df_full: design.df_full(),
        }
    }

    pub fn tuning_params(&self) -> &[f64] {
        &self.tuning_params
    }

    pub fn df_full(&self) -> usize {
        self.df_full
    }

    /// Statistic for each tuning parameter, written into `out`
    pub fn statistics_into(&self, rss_full: f64, rss_reduced: f64, out: &mut [f64]) {
        for (slot, &alpha) in out.iter_mut().zip(self.tuning_params.iter()) {
            *slot = tuned_f(rss_full, rss_reduced, self.df_full, alpha);
        }
    }

    /// Unpermuted statistics (features x tuning params) from model fits
    pub fn compute(&self, fit: &FitResult) -> Array2<f64> {
        let rss_full = fit.full.rss();
        let rss_reduced = fit.reduced.rss();
        let n_features = fit.n_features();
        let mut stats = Array2::zeros((n_features, self.tuning_params.len()));
        for i in 0..n_features {
            let mut row = vec![0.0; self.tuning_params.len()];
            self.statistics_into(rss_full[i], rss_reduced[i], &mut row);
            for (a, v) in row.into_iter().enumerate() {
                stats[[i, a]] = v;
            }
        }
        stats
    }
}

/// Statistics for every feature, tuning parameter and replicate.
///
/// Replicate 0 is the unpermuted data; replicates 1..=R are resampled.
#[derive(Debug, Clone)]
pub struct StatisticTable {
    values: Array3<f64>,
}

impl StatisticTable {
    /// Wrap a (features x tuning params x (1 + R)) array
    pub fn new(values: Array3<f64>) -> Self {
        Self { values }
    }

    /// (features, tuning params, 1 + replicates)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    pub fn n_features(&self) -> usize {
        self.values.dim().0
    }

    pub fn n_tuning_params(&self) -> usize {
        self.values.dim().1
    }

    /// Number of resampled replicates, not counting replicate 0
    pub fn n_replicates(&self) -> usize {
        self.values.dim().2 - 1
    }

    pub fn get(&self, feature: usize, param: usize, replicate: usize) -> f64 {
        self.values[[feature, param, replicate]]
    }

    /// Statistics of every feature for one tuning parameter and replicate
    pub fn column(&self, param: usize, replicate: usize) -> ArrayView1<'_, f64> {
        self.values.slice(ndarray::s![.., param, replicate])
    }

    /// Unpermuted statistics (features x tuning params)
    pub fn unpermuted(&self) -> Array2<f64> {
        self.values.slice(ndarray::s![.., .., 0]).to_owned()
    }

    /// Largest unpermuted statistic for a tuning parameter, ignoring sentinels
    pub fn max_unpermuted(&self, param: usize) -> f64 {
        self.column(param, 0)
            .iter()
            .copied()
            .filter(|&v| v < STAT_SENTINEL)
            .fold(0.0, f64::max)
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }
}

/// Flat per-feature F-test value at a single reference tuning parameter
pub fn flat_ftest(fit: &FitResult, design: &Design, alpha: f64) -> Vec<f64> {
    let rss_full = fit.full.rss();
    let rss_reduced = fit.reduced.rss();
    rss_full
        .iter()
        .zip(rss_reduced.iter())
        .map(|(&f, &r)| tuned_f(f, r, design.df_full(), alpha))
        .collect()
}

/// Upper-tail p-values of the classical F ratio
/// ((RSS_reduced - RSS_full) / df_between) / (RSS_full / df_full)
pub fn ftest_pvalues(fit: &FitResult, design: &Design) -> Vec<f64> {
    let df1 = design.df_between() as f64;
    let df2 = design.df_full() as f64;
    let dist = match FisherSnedecor::new(df1, df2) {
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!("Cannot build F({}, {}) distribution: {}", df1, df2, e);
            None
        }
    };
    let rss_full = fit.full.rss();
    let rss_reduced = fit.reduced.rss();
    let pairs: Vec<(f64, f64)> = rss_full.iter().copied().zip(rss_reduced.iter().copied()).collect();

    pairs
        .par_iter()
        .map(|&(full, reduced)| {
            let dist = match &dist {
                Some(d) => d,
                None => return f64::NAN,
            };
            let numer = (reduced - full).max(0.0);
            if numer == 0.0 {
                return 1.0;
            }
            if full <= 0.0 {
                return 0.0;
            }
            let f = (numer / df1) / (full / df2);
            dist.sf(f)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MeasurementTable, Schema};
    use crate::model::{fit_models, ModelSpec};
    use ndarray::array;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn fit(values: Array2<f64>) -> (FitResult, Design) {
        let n = values.nrows();
        let samples = s(&["s1", "s2", "s3", "s4"]);
        let table = MeasurementTable::new(
            values,
            (0..n).map(|i| format!("f{}", i)).collect(),
            samples.clone(),
        )
        .unwrap();
        let mut schema = Schema::new(samples).unwrap();
        schema.add_factor("treatment", s(&["ctl", "ctl", "drug", "drug"])).unwrap();
        let design = Design::new(&table, &schema, &ModelSpec::new("treatment")).unwrap();
        (fit_models(&table, &design), design)
    }

    #[test]
    fn test_untuned_value() {
        // RSS_full = 5, RSS_reduced = 14, df_full = 2 -> 9 / 2.5
        let (fit, design) = fit(array![[1.0, 2.0, 3.0, 6.0]]);
        let ftest = FTest::new(&design, &[0.0, 1.0]);
        let stats = ftest.compute(&fit);
        assert!((stats[[0, 0]] - 3.6).abs() < 1e-12);
        assert!((stats[[0, 1]] - 9.0 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_increasing_in_alpha() {
        let (fit, design) = fit(array![
            [1.0, 2.0, 3.0, 6.0],
            [2.0, 1.0, 1.0, 1.0],
            [3.0, 1.0, 10.0, 4.0],
            [5.0, 5.1, 4.9, 5.0]
        ]);
        let ftest = FTest::new(&design, &[0.0, 0.01, 0.1, 1.0, 10.0]);
        let stats = ftest.compute(&fit);
        for row in stats.outer_iter() {
            for a in 1..row.len() {
                assert!(row[a] <= row[a - 1]);
                assert!(row[a] >= 0.0);
            }
        }
    }

    #[test]
    fn test_degenerate_feature_is_zero() {
        let (fit, design) = fit(array![[0.3, 0.3, 0.3, 0.3]]);
        let ftest = FTest::new(&design, &[0.0, 0.5]);
        let stats = ftest.compute(&fit);
        assert_eq!(stats[[0, 0]], 0.0);
        assert_eq!(stats[[0, 1]], 0.0);
        assert_eq!(ftest_pvalues(&fit, &design)[0], 1.0);
    }

    #[test]
    fn test_perfect_fit_hits_sentinel_only_without_tuning() {
        let (fit, design) = fit(array![[1.0, 1.0, 4.0, 4.0]]);
        let ftest = FTest::new(&design, &[0.0, 0.5]);
        let stats = ftest.compute(&fit);
        assert_eq!(stats[[0, 0]], STAT_SENTINEL);
        assert!((stats[[0, 1]] - 9.0 / 0.5).abs() < 1e-12);
        assert_eq!(ftest_pvalues(&fit, &design)[0], 0.0);
    }

    #[test]
    fn test_pvalue_matches_f_distribution() {
        let (fit, design) = fit(array![[1.0, 2.0, 3.0, 6.0]]);
        let p = ftest_pvalues(&fit, &design)[0];
        let expected = FisherSnedecor::new(1.0, 2.0).unwrap().sf(3.6);
        assert!((p - expected).abs() < 1e-12);
        assert!(p > 0.0 && p < 1.0);
    }

    #[test]
    fn test_statistic_table_accessors() {
        let mut values = Array3::zeros((2, 1, 3));
        values[[0, 0, 0]] = 2.0;
        values[[1, 0, 0]] = STAT_SENTINEL;
        values[[1, 0, 2]] = 7.0;
        let table = StatisticTable::new(values);
        assert_eq!(table.shape(), (2, 1, 3));
        assert_eq!(table.n_replicates(), 2);
        assert_eq!(table.max_unpermuted(0), 2.0);
        assert_eq!(table.get(1, 0, 2), 7.0);
        assert_eq!(table.unpermuted().dim(), (2, 1));
    }
}
