//! Per-feature determinations and feature rankings

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceTable;
use crate::optimizer::{Direction, TuningSelection};

/// Call for one feature, class and confidence level.
///
/// Only regulated features carry a confidence; a baseline call has none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Determination {
    Baseline,
    UpRegulated {
        tuning_param: f64,
        confidence: f64,
        statistic: f64,
    },
    DownRegulated {
        tuning_param: f64,
        confidence: f64,
        statistic: f64,
    },
}

impl Determination {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Determination::Baseline => None,
            Determination::UpRegulated { .. } => Some(Direction::Up),
            Determination::DownRegulated { .. } => Some(Direction::Down),
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, Determination::Baseline)
    }

    pub fn confidence(&self) -> Option<f64> {
        match *self {
            Determination::Baseline => None,
            Determination::UpRegulated { confidence, .. }
            | Determination::DownRegulated { confidence, .. } => Some(confidence),
        }
    }
}

/// Determinations indexed by (level, class, feature)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminationTable {
    n_levels: usize,
    n_classes: usize,
    n_features: usize,
    calls: Vec<Determination>,
}

impl DeterminationTable {
    fn offset(&self, level: usize, class: usize, feature: usize) -> usize {
        (level * self.n_classes + class) * self.n_features + feature
    }

    pub fn get(&self, level: usize, class: usize, feature: usize) -> &Determination {
        &self.calls[self.offset(level, class, feature)]
    }

    /// Calls of every feature for one level and class
    pub fn calls(&self, level: usize, class: usize) -> &[Determination] {
        let start = self.offset(level, class, 0);
        &self.calls[start..start + self.n_features]
    }

    pub fn count(&self, level: usize, class: usize, direction: Direction) -> usize {
        self.calls(level, class)
            .iter()
            .filter(|d| d.direction() == Some(direction))
            .count()
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Classify every feature at every level for every class.
///
/// A feature's effect sign picks the direction; the tuning parameter chosen
/// for that direction decides its confidence and statistic. Zero effects and
/// confidences below the level are baseline.
pub fn aggregate(
    confidence: &ConfidenceTable,
    statistics: &Array2<f64>,
    class_effects: &Array2<f64>,
    selection: &TuningSelection,
) -> DeterminationTable {
    let n_levels = selection.levels().len();
    let n_classes = class_effects.ncols();
    let n_features = confidence.n_features();
    let mut calls = Vec::with_capacity(n_levels * n_classes * n_features);

    for (l, &level) in selection.levels().iter().enumerate() {
        for class in 0..n_classes {
            for i in 0..n_features {
                let effect = class_effects[[i, class]];
                let direction = if Direction::Up.matches(effect) {
                    Direction::Up
                } else if Direction::Down.matches(effect) {
                    Direction::Down
                } else {
                    calls.push(Determination::Baseline);
                    continue;
                };
                let choice = selection.get(l, class, direction);
                let conf = confidence.get(i, choice.param_idx);
                if conf < level {
                    calls.push(Determination::Baseline);
                    continue;
                }
                let statistic = statistics[[i, choice.param_idx]];
                calls.push(match direction {
                    Direction::Up => Determination::UpRegulated {
                        tuning_param: choice.tuning_param,
                        confidence: conf,
                        statistic,
                    },
                    Direction::Down => Determination::DownRegulated {
                        tuning_param: choice.tuning_param,
                        confidence: conf,
                        statistic,
                    },
                });
            }
        }
    }

    DeterminationTable {
        n_levels,
        n_classes,
        n_features,
        calls,
    }
}

/// Feature indexes by descending confidence at `param`, ties by descending
/// statistic, then by index
pub fn order_by_confidence(
    confidence: &ConfidenceTable,
    statistics: &Array2<f64>,
    param: usize,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..confidence.n_features()).collect();
    order.sort_by(|&a, &b| {
        confidence
            .get(b, param)
            .total_cmp(&confidence.get(a, param))
            .then_with(|| statistics[[b, param]].total_cmp(&statistics[[a, param]]))
            .then_with(|| a.cmp(&b))
    });
    order
}

/// Highest confidence reached by a feature over all tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestScore {
    pub param_idx: usize,
    pub confidence: f64,
    pub statistic: f64,
}

/// Best tuning parameter per feature; the first one wins ties
pub fn best_scores(confidence: &ConfidenceTable, statistics: &Array2<f64>) -> Vec<BestScore> {
    (0..confidence.n_features())
        .map(|i| {
            let row = confidence.feature(i);
            let mut best = 0;
            for a in 1..row.len() {
                if row[a] > row[best] {
                    best = a;
                }
            }
            BestScore {
                param_idx: best,
                confidence: row[best],
                statistic: statistics[[i, best]],
            }
        })
        .collect()
}
