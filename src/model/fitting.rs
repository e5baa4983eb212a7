//! Per-feature fits of the full and reduced group-means models

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use super::layout::{Design, Layout};
use crate::data::MeasurementTable;

/// Fit of one model for every feature
#[derive(Debug, Clone)]
pub struct ModelFit {
    /// Fitted value for each sample (features x samples)
    pub fitted: Array2<f64>,
    /// Measured minus fitted (features x samples)
    pub residuals: Array2<f64>,
    /// Mean of each layout group (features x groups)
    pub coefficients: Array2<f64>,
}

impl ModelFit {
    /// Residual sum of squares per feature
    pub fn rss(&self) -> Array1<f64> {
        self.residuals
            .outer_iter()
            .map(|row| row.iter().map(|r| r * r).sum())
            .collect()
    }
}

/// Full and reduced model fits plus per-class effect summaries
#[derive(Debug, Clone)]
pub struct FitResult {
    pub full: ModelFit,
    pub reduced: ModelFit,
    /// Block-averaged difference between each class and the baseline (features x classes)
    pub class_effects: Array2<f64>,
    /// Mean of each class over the baseline mean (features x classes)
    pub fold_change: Array2<f64>,
}

impl FitResult {
    pub fn n_features(&self) -> usize {
        self.full.fitted.nrows()
    }
}

/// Single-feature fit of one layout
struct LayoutFit {
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    means: Vec<f64>,
}

/// Fit group means for one feature
fn fit_layout(values: ArrayView1<f64>, layout: &Layout) -> LayoutFit {
    let n = values.len();
    let mut fitted = vec![0.0; n];
    let mut means = Vec::with_capacity(layout.len());
    for group in layout {
        let mean = group_mean(|j| values[j], group);
        for &j in group {
            fitted[j] = mean;
        }
        means.push(mean);
    }
    let residuals = values.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect();
    LayoutFit {
        fitted,
        residuals,
        means,
    }
}

/// Mean of the values at `group`; exact when every value is equal, so a
/// constant group leaves residuals of exactly zero.
fn group_mean(value: impl Fn(usize) -> f64, group: &[usize]) -> f64 {
    let first = value(group[0]);
    if group.iter().all(|&j| value(j) == first) {
        return first;
    }
    group.iter().map(|&j| value(j)).sum::<f64>() / group.len() as f64
}

/// Residual sum of squares of `values` around the group means of `layout`
pub(crate) fn layout_rss(values: &[f64], layout: &Layout) -> f64 {
    let mut rss = 0.0;
    for group in layout {
        let mean = group_mean(|j| values[j], group);
        rss += group
            .iter()
            .map(|&j| {
                let d = values[j] - mean;
                d * d
            })
            .sum::<f64>();
    }
    rss
}

fn mean_of(values: ArrayView1<f64>, group: &[usize]) -> f64 {
    group_mean(|j| values[j], group)
}

/// Fit the full and reduced models for every feature.
///
/// Each feature is fit independently; the result depends only on the
/// table and the design.
pub fn fit_models(table: &MeasurementTable, design: &Design) -> FitResult {
    let values = table.values();
    let n_features = table.n_features();
    let n_samples = table.n_samples();
    let n_levels = design.condition_levels().len();
    let n_classes = design.n_classes();
    let n_blocks = design.n_blocks();

    log::debug!(
        "Fitting {} features: {} full-model groups, {} reduced-model groups",
        n_features,
        design.full_layout().len(),
        design.reduced_layout().len()
    );

    let fits: Vec<(LayoutFit, LayoutFit, Vec<f64>, Vec<f64>)> = (0..n_features)
        .into_par_iter()
        .map(|i| {
            let row = values.row(i);
            let full = fit_layout(row, design.full_layout());
            let reduced = fit_layout(row, design.reduced_layout());

            let effects: Vec<f64> = (1..n_levels)
                .map(|level| {
                    (0..n_blocks)
                        .map(|b| {
                            full.means[design.cell(b, level)] - full.means[design.cell(b, 0)]
                        })
                        .sum::<f64>()
                        / n_blocks as f64
                })
                .collect();

            let baseline_mean = mean_of(row, &design.condition_layout()[0]);
            let fold: Vec<f64> = (1..n_levels)
                .map(|level| {
                    let class_mean = mean_of(row, &design.condition_layout()[level]);
                    if baseline_mean == 0.0 {
                        f64::NAN
                    } else {
                        class_mean / baseline_mean
                    }
                })
                .collect();

            (full, reduced, effects, fold)
        })
        .collect();

    let n_full = design.full_layout().len();
    let n_reduced = design.reduced_layout().len();
    let mut full = ModelFit {
        fitted: Array2::zeros((n_features, n_samples)),
        residuals: Array2::zeros((n_features, n_samples)),
        coefficients: Array2::zeros((n_features, n_full)),
    };
    let mut reduced = ModelFit {
        fitted: Array2::zeros((n_features, n_samples)),
        residuals: Array2::zeros((n_features, n_samples)),
        coefficients: Array2::zeros((n_features, n_reduced)),
    };
    let mut class_effects = Array2::zeros((n_features, n_classes));
    let mut fold_change = Array2::zeros((n_features, n_classes));

    for (i, (f, r, effects, fold)) in fits.into_iter().enumerate() {
        for j in 0..n_samples {
            full.fitted[[i, j]] = f.fitted[j];
            full.residuals[[i, j]] = f.residuals[j];
            reduced.fitted[[i, j]] = r.fitted[j];
            reduced.residuals[[i, j]] = r.residuals[j];
        }
        for (g, m) in f.means.iter().enumerate() {
            full.coefficients[[i, g]] = *m;
        }
        for (g, m) in r.means.iter().enumerate() {
            reduced.coefficients[[i, g]] = *m;
        }
        for c in 0..n_classes {
            class_effects[[i, c]] = effects[c];
            fold_change[[i, c]] = fold[c];
        }
    }

    FitResult {
        full,
        reduced,
        class_effects,
        fold_change,
    }
}
