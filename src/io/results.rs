//! Results of a PaDE job

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::aggregate::{BestScore, Determination, DeterminationTable};
use crate::confidence::{BinCounts, ConfidenceTable};
use crate::optimizer::{best_param, Direction, TuningChoice, TuningSelection};

/// Everything the reporting layer needs from a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PadeResults {
    /// Feature identifiers, in table order
    pub feature_ids: Vec<String>,
    /// Tuning parameters, in job order
    pub tuning_params: Vec<f64>,
    pub confidence_levels: Vec<f64>,
    /// Baseline condition level
    pub baseline: String,
    /// Non-baseline condition levels
    pub classes: Vec<String>,
    /// Names of the full-model groups
    pub group_names: Vec<String>,
    /// Alpha used for `ftest`
    pub reference_tuning_param: f64,
    /// Flat F-test value per feature
    pub ftest: Vec<f64>,
    /// F-distribution p-value per feature
    pub ftest_pvalues: Vec<f64>,
    /// Unpermuted statistics (features x tuning params)
    pub statistics: Array2<f64>,
    pub confidence: ConfidenceTable,
    /// Largest unpermuted statistic per tuning parameter
    pub max_stats: Vec<f64>,
    pub bin_counts: BinCounts,
    pub selection: TuningSelection,
    pub determinations: DeterminationTable,
    /// Highest-confidence tuning parameter per feature
    pub best: Vec<BestScore>,
    /// Per tuning parameter, features by descending confidence
    pub orderings: Vec<Vec<usize>>,
    /// Mean of each full-model group (features x groups)
    pub group_means: Array2<f64>,
    /// Class effect relative to the baseline (features x classes)
    pub coefficients: Array2<f64>,
    /// Class mean over baseline mean (features x classes), NaN for a zero
    /// baseline mean; written as `null` in JSON
    #[serde(with = "nan_as_null")]
    pub fold_change: Array2<f64>,
}

/// JSON has no NaN: store it as `null` and read `null` back as NaN
mod nan_as_null {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        values
            .mapv(|v| if v.is_nan() { None } else { Some(v) })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
        let values = Array2::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.mapv(|v| v.unwrap_or(f64::NAN)))
    }
}

impl PadeResults {
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn determination(&self, level: usize, class: usize, feature: usize) -> &Determination {
        self.determinations.get(level, class, feature)
    }

    pub fn chosen(&self, level: usize, class: usize, direction: Direction) -> &TuningChoice {
        self.selection.get(level, class, direction)
    }

    /// Counts by confidence level, overall and per class
    pub fn summary(&self) -> ResultsSummary {
        let rows = self
            .confidence_levels
            .iter()
            .enumerate()
            .map(|(l, &level)| {
                let counts: Vec<usize> = (0..self.tuning_params.len())
                    .map(|a| self.confidence.column(a).iter().filter(|&&c| c >= level).count())
                    .collect();
                let best = best_param(&counts, &self.tuning_params);
                let classes = self
                    .classes
                    .iter()
                    .enumerate()
                    .map(|(c, name)| ClassCounts {
                        class: name.clone(),
                        up_param: self.chosen(l, c, Direction::Up).tuning_param,
                        up_count: self.determinations.count(l, c, Direction::Up),
                        down_param: self.chosen(l, c, Direction::Down).tuning_param,
                        down_count: self.determinations.count(l, c, Direction::Down),
                    })
                    .collect();
                SummaryRow {
                    level,
                    tuning_param: self.tuning_params[best],
                    count: counts[best],
                    classes,
                }
            })
            .collect();
        ResultsSummary {
            n_features: self.n_features(),
            baseline: self.baseline.clone(),
            rows,
        }
    }
}

/// Up and down calls for one class at one level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCounts {
    pub class: String,
    pub up_param: f64,
    pub up_count: usize,
    pub down_param: f64,
    pub down_count: usize,
}

/// One confidence level of the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub level: f64,
    /// Tuning parameter reaching the level for the most features
    pub tuning_param: f64,
    pub count: usize,
    pub classes: Vec<ClassCounts>,
}

/// Summary of features by confidence level
#[derive(Debug, Clone, Serialize)]
pub struct ResultsSummary {
    pub n_features: usize,
    pub baseline: String,
    pub rows: Vec<SummaryRow>,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Summary of {} features by confidence level:", self.n_features)?;
        writeln!(f)?;
        writeln!(f, "Confidence |   Num.   | Tuning")?;
        writeln!(f, "   Level   | Features | Param.")?;
        writeln!(f, "-----------+----------+-------")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>9.1}% | {:>8} | {:.4}",
                row.level * 100.0,
                row.count,
                row.tuning_param
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Calls against baseline '{}':", self.baseline)?;
        writeln!(f)?;
        writeln!(f, "Confidence | Class                |    Up    | Up param |   Down   | Down param")?;
        writeln!(f, "-----------+----------------------+----------+----------+----------+-----------")?;
        for row in &self.rows {
            for c in &row.classes {
                writeln!(
                    f,
                    "{:>9.1}% | {:<20} | {:>8} | {:>8.4} | {:>8} | {:>10.4}",
                    row.level * 100.0,
                    c.class,
                    c.up_count,
                    c.up_param,
                    c.down_count,
                    c.down_param
                )?;
            }
        }
        Ok(())
    }
}
