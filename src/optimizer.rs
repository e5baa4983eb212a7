//! Choice of tuning parameter per confidence level, class and direction
//!
//! For every (level, class, direction) the tuning parameter that lets the most
//! features reach the level in that direction wins. Ties go to the smallest
//! tuning parameter value.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceTable;

/// Direction of a class effect relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Up, Direction::Down];

    /// Whether an effect of this sign points in this direction; zero points nowhere
    pub fn matches(self, effect: f64) -> bool {
        match self {
            Direction::Up => effect > 0.0,
            Direction::Down => effect < 0.0,
        }
    }

    fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Winning tuning parameter for one (level, class, direction)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningChoice {
    /// Index into the job's tuning parameters
    pub param_idx: usize,
    pub tuning_param: f64,
    /// Qualifying features at the winning parameter
    pub count: usize,
    /// Qualifying features at every parameter, in job order
    pub counts_by_param: Vec<usize>,
}

/// Features reaching `level` in `direction` for `class` at tuning parameter `param`
pub fn count_qualifying(
    confidence: &ConfidenceTable,
    class_effects: &Array2<f64>,
    param: usize,
    class: usize,
    level: f64,
    direction: Direction,
) -> usize {
    confidence
        .column(param)
        .iter()
        .zip(class_effects.column(class).iter())
        .filter(|&(&conf, &effect)| conf >= level && direction.matches(effect))
        .count()
}

/// Index of the largest count; ties resolve to the smallest tuning parameter
pub(crate) fn best_param(counts: &[usize], tuning_params: &[f64]) -> usize {
    let mut best = 0;
    for a in 1..counts.len() {
        let better = counts[a] > counts[best]
            || (counts[a] == counts[best] && tuning_params[a] < tuning_params[best]);
        if better {
            best = a;
        }
    }
    best
}

/// Choices for every confidence level, class and direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningSelection {
    levels: Vec<f64>,
    /// [level][class][direction]
    choices: Vec<Vec<[TuningChoice; 2]>>,
}

impl TuningSelection {
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn n_classes(&self) -> usize {
        self.choices.first().map_or(0, |c| c.len())
    }

    pub fn get(&self, level: usize, class: usize, direction: Direction) -> &TuningChoice {
        &self.choices[level][class][direction.index()]
    }
}

/// Pick the tuning parameter for every (level, class, direction).
///
/// Levels are evaluated in parallel; each choice is independent of the others.
pub fn optimize_tuning_params(
    confidence: &ConfidenceTable,
    class_effects: &Array2<f64>,
    tuning_params: &[f64],
    levels: &[f64],
) -> TuningSelection {
    let n_classes = class_effects.ncols();
    let n_params = tuning_params.len();

    let choices: Vec<Vec<[TuningChoice; 2]>> = levels
        .par_iter()
        .map(|&level| {
            (0..n_classes)
                .map(|class| {
                    Direction::BOTH.map(|direction| {
                        let counts_by_param: Vec<usize> = (0..n_params)
                            .map(|a| {
                                count_qualifying(confidence, class_effects, a, class, level, direction)
                            })
                            .collect();
                        let param_idx = best_param(&counts_by_param, tuning_params);
                        TuningChoice {
                            param_idx,
                            tuning_param: tuning_params[param_idx],
                            count: counts_by_param[param_idx],
                            counts_by_param,
                        }
                    })
                })
                .collect()
        })
        .collect();

    for (l, level) in levels.iter().enumerate() {
        for (class, dirs) in choices[l].iter().enumerate() {
            log::debug!(
                "Level {:.2}, class {}: up alpha={} ({}), down alpha={} ({})",
                level,
                class,
                dirs[0].tuning_param,
                dirs[0].count,
                dirs[1].tuning_param,
                dirs[1].count
            );
        }
    }

    TuningSelection {
        levels: levels.to_vec(),
        choices,
    }
}
