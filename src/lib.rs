//! RustPaDE: permutation-based differential expression in Rust
//!
//! For every feature of a measurement table this crate fits a full and a
//! reduced group-means model, computes a tuned F statistic at several tuning
//! parameters, and estimates by resampling the confidence (1 - FDR) that the
//! feature differs between conditions. The tuning parameter that calls the
//! most features is then chosen per confidence level, class and direction.
//!
//! # Example
//!
//! ```ignore
//! use rust_pade::prelude::*;
//!
//! let table = read_measurement_table("table.tsv")?;
//! let schema = read_schema("schema.tsv")?;
//!
//! let mut settings = Settings::default();
//! settings.condition_variable = Some("treatment".to_string());
//!
//! let results = run_pade(&table, &schema, &settings)?;
//! println!("{}", results.summary());
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod confidence;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod optimizer;
pub mod resample;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{
        aggregate, best_scores, order_by_confidence, BestScore, Determination, DeterminationTable,
    };
    pub use crate::config::Settings;
    pub use crate::confidence::{
        estimate_confidence, BinCounts, BinScheme, BinTally, ConfidenceEstimate, ConfidenceTable,
    };
    pub use crate::data::{MeasurementTable, Schema};
    pub use crate::error::{PadeError, Result};
    pub use crate::io::{
        read_measurement_table, read_schema, write_results, write_results_json, PadeResults,
        ResultsSummary,
    };
    pub use crate::model::{fit_models, Design, FitResult, ModelSpec};
    pub use crate::optimizer::{optimize_tuning_params, Direction, TuningChoice, TuningSelection};
    pub use crate::resample::{
        FittedBase, ResampleSource, Resampler, ResamplingStrategy, SampleIndexes,
    };
    pub use crate::testing::{flat_ftest, ftest_pvalues, FTest, StatisticTable};
}

use prelude::*;

/// Intermediate tables of a job alongside its results
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub design: Design,
    pub fit: FitResult,
    pub statistics: StatisticTable,
    pub confidence: ConfidenceEstimate,
    pub results: PadeResults,
}

/// Run the complete pipeline and keep every intermediate table.
///
/// `sample_indexes`, when given, replaces the seeded draw: one row of source
/// sample positions per replicate. All configuration is checked before any
/// numeric work starts.
pub fn run_engine(
    table: &MeasurementTable,
    schema: &Schema,
    settings: &Settings,
    sample_indexes: Option<Vec<Vec<usize>>>,
) -> Result<EngineOutput> {
    // Step 1: Configuration
    settings.validate()?;
    let spec = settings.model_spec(schema)?;
    let design = Design::new(table, schema, &spec)?;
    let n_samples = table.n_samples();

    let indexes = match sample_indexes {
        Some(rows) => {
            if rows.is_empty() {
                return Err(PadeError::InvalidSampleIndexes {
                    reason: "no replicate rows given".to_string(),
                });
            }
            if rows.len() != settings.num_samples {
                log::warn!(
                    "Using {} supplied sample index rows instead of {} replicates",
                    rows.len(),
                    settings.num_samples
                );
            }
            SampleIndexes::from_rows(rows, design.reduced_layout(), n_samples, settings.strategy)?
        }
        None => SampleIndexes::generate(
            design.reduced_layout(),
            n_samples,
            settings.strategy,
            settings.num_samples,
            settings.seed,
        ),
    };

    log::info!(
        "Testing '{}' ({} vs. baseline '{}') on {} features x {} samples",
        spec.condition_variable,
        design.classes().join(", "),
        design.baseline(),
        table.n_features(),
        n_samples
    );

    // Step 2: Fit full and reduced models
    let fit = fit_models(table, &design);
    let constant = fit.reduced.rss().iter().filter(|&&r| r == 0.0).count();
    if constant > 0 {
        log::warn!(
            "{} feature(s) have identical values in every sample and will be called baseline",
            constant
        );
    }

    // Step 3: Statistics for the observed data and every replicate
    let ftest = FTest::new(&design, &settings.tuning_params);
    let resampler = Resampler::new(&design, indexes, settings.resample_source());
    let statistics = resampler.statistic_table(table, &fit, &ftest);

    // Step 4: Bin, count and score
    let confidence = estimate_confidence(&statistics, settings.num_bins);

    // Step 5: Choose tuning parameters and classify features
    let unpermuted = statistics.unpermuted();
    let selection = optimize_tuning_params(
        &confidence.table,
        &fit.class_effects,
        &settings.tuning_params,
        &settings.confidence_levels,
    );
    let determinations = aggregate(&confidence.table, &unpermuted, &fit.class_effects, &selection);

    let results = PadeResults {
        feature_ids: table.feature_ids().to_vec(),
        tuning_params: settings.tuning_params.clone(),
        confidence_levels: settings.confidence_levels.clone(),
        baseline: design.baseline().to_string(),
        classes: design.classes().to_vec(),
        group_names: design.full_group_names().to_vec(),
        reference_tuning_param: settings.reference_tuning_param,
        ftest: flat_ftest(&fit, &design, settings.reference_tuning_param),
        ftest_pvalues: ftest_pvalues(&fit, &design),
        best: best_scores(&confidence.table, &unpermuted),
        orderings: (0..settings.tuning_params.len())
            .map(|a| order_by_confidence(&confidence.table, &unpermuted, a))
            .collect(),
        statistics: unpermuted,
        confidence: confidence.table.clone(),
        max_stats: confidence.scheme.max_stats().to_vec(),
        bin_counts: confidence.counts.clone(),
        selection,
        determinations,
        group_means: fit.full.coefficients.clone(),
        coefficients: fit.class_effects.clone(),
        fold_change: fit.fold_change.clone(),
    };

    log::info!("Done: {} features, {} confidence levels", results.n_features(), results.confidence_levels.len());

    Ok(EngineOutput {
        design,
        fit,
        statistics,
        confidence,
        results,
    })
}

/// Run the complete PaDE pipeline with seeded resampling
pub fn run_pade(table: &MeasurementTable, schema: &Schema, settings: &Settings) -> Result<PadeResults> {
    Ok(run_engine(table, schema, settings, None)?.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    /// 100 features x 8 samples: features 0..20 up in class "b", 20..30 down,
    /// feature 99 constant, the rest noise only.
    fn scenario() -> (MeasurementTable, Schema) {
        let values = Array2::from_shape_fn((100, 8), |(i, j)| {
            if i == 99 {
                return 5.0;
            }
            let noise = ((i * 31 + j * 17) % 13) as f64 / 13.0;
            let shift = match i {
                0..=19 if j >= 4 => 3.0,
                20..=29 if j >= 4 => -3.0,
                _ => 0.0,
            };
            10.0 + noise + shift
        });
        let samples = ids("s", 8);
        let table = MeasurementTable::new(values, ids("feature", 100), samples.clone()).unwrap();
        let mut schema = Schema::new(samples).unwrap();
        let classes = ["a", "a", "a", "a", "b", "b", "b", "b"];
        schema
            .add_factor("treatment", classes.iter().map(|c| c.to_string()).collect())
            .unwrap();
        (table, schema)
    }

    fn settings() -> Settings {
        Settings {
            condition_variable: Some("treatment".to_string()),
            tuning_params: vec![0.1, 1.0, 10.0],
            num_samples: 10,
            num_bins: 10,
            confidence_levels: vec![0.8, 0.9],
            seed: 17,
            ..Settings::default()
        }
    }

    #[test]
    fn test_full_pipeline() {
        let (table, schema) = scenario();
        let out = run_engine(&table, &schema, &settings(), None).unwrap();
        let results = &out.results;

        // (a) statistic table shape
        assert_eq!(out.statistics.shape(), (100, 3, 11));

        // (b) statistics non-increasing in alpha
        for i in 0..100 {
            for r in 0..=10 {
                assert!(out.statistics.get(i, 1, r) <= out.statistics.get(i, 0, r));
                assert!(out.statistics.get(i, 2, r) <= out.statistics.get(i, 1, r));
            }
        }

        // (c) chosen alpha maximizes the count, and the calls agree with it
        for l in 0..2 {
            for d in Direction::BOTH {
                let choice = results.chosen(l, 0, d);
                for &c in &choice.counts_by_param {
                    assert!(choice.count >= c);
                }
                assert_eq!(results.determinations.count(l, 0, d), choice.count);
            }
        }

        // Confidence bounds and monotone adjusted counts
        assert!(results.confidence.values().iter().all(|c| (0.0..=1.0).contains(c)));
        let counts = &results.bin_counts;
        for a in 0..3 {
            for b in 0..10 {
                assert!(counts.adjusted_perm[[a, b]] <= counts.unperm[[a, b]]);
                if b > 0 {
                    assert!(counts.adjusted_perm[[a, b - 1]] >= counts.adjusted_perm[[a, b]]);
                }
            }
        }

        // Strong effects are called in the right direction
        assert_eq!(results.classes, vec!["b"]);
        assert_eq!(results.determination(0, 0, 0).direction(), Some(Direction::Up));
        assert_eq!(results.determination(0, 0, 25).direction(), Some(Direction::Down));
    }

    #[test]
    fn test_degenerate_feature_is_baseline() {
        let (table, schema) = scenario();
        let out = run_engine(&table, &schema, &settings(), None).unwrap();
        for a in 0..3 {
            assert_eq!(out.statistics.get(99, a, 0), 0.0);
        }
        for l in 0..2 {
            assert!(out.results.determination(l, 0, 99).is_baseline());
        }
        assert_eq!(out.results.ftest[99], 0.0);
        assert_eq!(out.results.ftest_pvalues[99], 1.0);
    }

    #[test]
    fn test_deterministic_across_runs_and_threads() {
        let (table, schema) = scenario();
        let first = run_engine(&table, &schema, &settings(), None).unwrap();
        let second = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| run_engine(&table, &schema, &settings(), None).unwrap());

        assert_eq!(first.statistics.values(), second.statistics.values());
        assert_eq!(first.results.confidence, second.results.confidence);
        assert_eq!(first.results.determinations, second.results.determinations);
    }

    #[test]
    fn test_feature_blocks_tally_like_whole_table() {
        let (table, schema) = scenario();
        let s = settings();
        let out = run_engine(&table, &schema, &s, None).unwrap();
        let indexes = SampleIndexes::generate(
            out.design.reduced_layout(),
            8,
            s.strategy,
            s.num_samples,
            s.seed,
        );
        let ftest = FTest::new(&out.design, &s.tuning_params);
        let scheme = &out.confidence.scheme;

        let mut merged = BinTally::empty(3, s.num_bins, s.num_samples);
        for (start, end) in [(0, 40), (40, 100)] {
            let block = table.feature_block(start, end).unwrap();
            let fit = fit_models(&block, &out.design);
            let stats = Resampler::new(&out.design, indexes.clone(), s.resample_source())
                .statistic_table(&block, &fit, &ftest);
            merged.merge(&BinTally::from_statistics(scheme, &stats));
        }
        let whole = BinTally::from_statistics(scheme, &out.statistics);
        assert_eq!(merged, whole);
    }

    #[test]
    fn test_blocked_design_with_residual_resampling() {
        let (table, _) = scenario();
        let samples = ids("s", 8);
        let mut schema = Schema::new(samples).unwrap();
        let treatment = ["a", "a", "b", "b", "a", "a", "b", "b"];
        let batch = ["x", "x", "x", "x", "y", "y", "y", "y"];
        schema
            .add_factor("treatment", treatment.iter().map(|c| c.to_string()).collect())
            .unwrap();
        schema
            .add_factor("batch", batch.iter().map(|c| c.to_string()).collect())
            .unwrap();

        let s = Settings {
            block_variables: vec!["batch".to_string()],
            sample_from_residuals: true,
            strategy: ResamplingStrategy::Bootstrap,
            ..settings()
        };
        let out = run_engine(&table, &schema, &s, None).unwrap();
        assert_eq!(out.design.full_layout().len(), 4);
        assert_eq!(out.results.group_names.len(), 4);
        assert_eq!(out.statistics.shape(), (100, 3, 11));
        assert!(out.results.confidence.values().iter().all(|c| (0.0..=1.0).contains(c)));
        assert_eq!(out.results.orderings.len(), 3);
        assert_eq!(out.results.summary().rows.len(), 2);
    }

    #[test]
    fn test_configuration_errors_before_computation() {
        let (table, schema) = scenario();

        let mut s = settings();
        s.num_samples = 0;
        assert!(matches!(
            run_pade(&table, &schema, &s),
            Err(PadeError::InvalidSettings { .. })
        ));

        let mut s = settings();
        s.tuning_params.clear();
        assert!(run_pade(&table, &schema, &s).is_err());

        let mut s = settings();
        s.condition_variable = Some("dose".to_string());
        assert!(matches!(
            run_pade(&table, &schema, &s),
            Err(PadeError::UnknownFactor { .. })
        ));

        let bad_rows = vec![vec![0, 1, 2]];
        assert!(matches!(
            run_engine(&table, &schema, &settings(), Some(bad_rows)),
            Err(PadeError::InvalidSampleIndexes { .. })
        ));
    }

    #[test]
    fn test_supplied_sample_indexes() {
        let (table, schema) = scenario();
        let rows: Vec<Vec<usize>> = vec![vec![7, 6, 5, 4, 3, 2, 1, 0], vec![1, 0, 3, 2, 5, 4, 7, 6]];
        let out = run_engine(&table, &schema, &settings(), Some(rows)).unwrap();
        assert_eq!(out.statistics.shape(), (100, 3, 3));
    }
}
