//! Job configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Schema;
use crate::error::{PadeError, Result};
use crate::model::ModelSpec;
use crate::resample::{FittedBase, ResampleSource, ResamplingStrategy};

/// Tuning parameters searched when none are given
pub const DEFAULT_TUNING_PARAMS: [f64; 10] = [0.0001, 0.01, 0.1, 0.3, 0.5, 1.0, 1.5, 2.0, 3.0, 10.0];

pub const DEFAULT_NUM_SAMPLES: usize = 1000;
pub const DEFAULT_NUM_BINS: usize = 1000;
pub const DEFAULT_SUMMARY_MIN_CONF: f64 = 0.5;
pub const DEFAULT_SUMMARY_STEP_SIZE: f64 = 0.05;
/// Smallest step between generated confidence levels
pub const MIN_SUMMARY_STEP_SIZE: f64 = 0.001;
/// Upper bound on the number of confidence levels a job reports
pub const MAX_CONFIDENCE_LEVELS: usize = 1000;

/// Everything a job needs besides the measurement table and the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Factor tested for differential effects; may be omitted when the
    /// schema has a single factor
    pub condition_variable: Option<String>,
    /// Nuisance factors shared by the full and reduced models
    pub block_variables: Vec<String>,
    /// Baseline condition level; the first sorted level if unset
    pub reference_level: Option<String>,
    /// Values of alpha searched by the optimizer
    pub tuning_params: Vec<f64>,
    /// Alpha of the flat per-feature F-test value
    pub reference_tuning_param: f64,
    /// Number of resampled replicates
    pub num_samples: usize,
    /// Number of bins dividing statistic space
    pub num_bins: usize,
    /// Confidence levels reported in the determination tables
    pub confidence_levels: Vec<f64>,
    /// Seed of the resampling random source
    pub seed: u64,
    pub strategy: ResamplingStrategy,
    /// Resample full-model residuals instead of raw values
    pub sample_from_residuals: bool,
    /// Fitted values receiving resampled residuals
    pub fitted_base: FittedBase,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            condition_variable: None,
            block_variables: Vec::new(),
            reference_level: None,
            tuning_params: DEFAULT_TUNING_PARAMS.to_vec(),
            reference_tuning_param: 0.0,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_bins: DEFAULT_NUM_BINS,
            confidence_levels: confidence_levels_from_range(
                DEFAULT_SUMMARY_MIN_CONF,
                DEFAULT_SUMMARY_STEP_SIZE,
            ),
            seed: 0,
            strategy: ResamplingStrategy::default(),
            sample_from_residuals: false,
            fitted_base: FittedBase::default(),
        }
    }
}

/// Levels `min_conf, min_conf + step, ...` strictly below 1.
///
/// Empty when `step` is below `MIN_SUMMARY_STEP_SIZE` or `min_conf` is not
/// positive, so `validate` rejects it.
pub fn confidence_levels_from_range(min_conf: f64, step: f64) -> Vec<f64> {
    let mut levels: Vec<f64> = Vec::new();
    if step.is_nan() || step < MIN_SUMMARY_STEP_SIZE || !min_conf.is_finite() || min_conf <= 0.0 {
        return levels;
    }
    let mut k = 0usize;
    loop {
        // Rounded so 0.5 + 9 * 0.05 prints as 0.95
        let level = ((min_conf + k as f64 * step) * 1e9).round() / 1e9;
        if level >= 1.0 {
            break;
        }
        if levels.last() != Some(&level) {
            levels.push(level);
        }
        k += 1;
    }
    levels
}

impl Settings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no job can run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(PadeError::InvalidSettings { reason });

        if self.tuning_params.is_empty() {
            return invalid("at least one tuning parameter is required".to_string());
        }
        if let Some(bad) = self.tuning_params.iter().find(|a| !a.is_finite() || **a < 0.0) {
            return invalid(format!("tuning parameters must be finite and >= 0, got {}", bad));
        }
        if !self.reference_tuning_param.is_finite() || self.reference_tuning_param < 0.0 {
            return invalid(format!(
                "reference tuning parameter must be finite and >= 0, got {}",
                self.reference_tuning_param
            ));
        }
        if self.num_samples == 0 {
            return invalid("the number of resampled replicates must be positive".to_string());
        }
        if self.num_bins == 0 {
            return invalid("the number of bins must be positive".to_string());
        }
        if self.confidence_levels.is_empty() {
            return invalid("at least one confidence level is required".to_string());
        }
        if let Some(bad) = self
            .confidence_levels
            .iter()
            .find(|c| !(**c > 0.0 && **c <= 1.0))
        {
            return invalid(format!("confidence levels must be in (0, 1], got {}", bad));
        }
        if self.confidence_levels.len() > MAX_CONFIDENCE_LEVELS {
            return invalid(format!(
                "at most {} confidence levels are supported, got {}",
                MAX_CONFIDENCE_LEVELS,
                self.confidence_levels.len()
            ));
        }
        if self.condition_variable.as_deref() == Some("") {
            return invalid("the condition variable name is empty".to_string());
        }

        let mut sorted = self.tuning_params.clone();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();
        if sorted.len() < self.tuning_params.len() {
            log::warn!("Tuning parameters contain duplicates; ties resolve to the first");
        }
        Ok(())
    }

    pub fn resample_source(&self) -> ResampleSource {
        if self.sample_from_residuals {
            ResampleSource::Residuals(self.fitted_base)
        } else {
            ResampleSource::Raw
        }
    }

    /// Model spec for `schema`, picking its only factor when no condition is named
    pub fn model_spec(&self, schema: &Schema) -> Result<ModelSpec> {
        let condition = match &self.condition_variable {
            Some(c) => c.clone(),
            None => {
                let free: Vec<&str> = schema
                    .factor_names()
                    .into_iter()
                    .filter(|f| !self.block_variables.iter().any(|b| b == f))
                    .collect();
                match free.as_slice() {
                    [only] => only.to_string(),
                    _ => {
                        return Err(PadeError::InvalidSettings {
                            reason: format!(
                                "a condition variable is required; the schema has factors [{}]",
                                schema.factor_names().join(", ")
                            ),
                        })
                    }
                }
            }
        };
        Ok(ModelSpec {
            condition_variable: condition,
            block_variables: self.block_variables.clone(),
            reference_level: self.reference_level.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_levels() {
        let levels = confidence_levels_from_range(0.5, 0.05);
        assert_eq!(levels.len(), 10);
        assert_eq!(levels[0], 0.5);
        assert_eq!(levels[9], 0.95);
        assert_eq!(Settings::default().confidence_levels, levels);
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let mut s = Settings::default();
        s.tuning_params.clear();
        assert!(matches!(s.validate(), Err(PadeError::InvalidSettings { .. })));

        let mut s = Settings::default();
        s.num_samples = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.tuning_params = vec![0.1, -1.0];
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.confidence_levels = vec![0.9, 1.5];
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.num_bins = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_json_partial_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"tuning_params": [0.5, 2.0], "num_samples": 25, "strategy": "bootstrap"}}"#
        )
        .unwrap();
        let s = Settings::from_json_file(file.path()).unwrap();
        assert_eq!(s.tuning_params, vec![0.5, 2.0]);
        assert_eq!(s.num_samples, 25);
        assert_eq!(s.strategy, ResamplingStrategy::Bootstrap);
        assert_eq!(s.num_bins, DEFAULT_NUM_BINS);

        let back: Settings = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_model_spec_single_factor() {
        let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|x| x.to_string()).collect();
        let mut schema = Schema::new(ids).unwrap();
        schema
            .add_factor("treatment", ["x", "x", "y", "y"].iter().map(|x| x.to_string()).collect())
            .unwrap();
        let spec = Settings::default().model_spec(&schema).unwrap();
        assert_eq!(spec.condition_variable, "treatment");

        schema
            .add_factor("batch", ["1", "2", "1", "2"].iter().map(|x| x.to_string()).collect())
            .unwrap();
        assert!(Settings::default().model_spec(&schema).is_err());
        let mut s = Settings::default();
        s.block_variables = vec!["batch".to_string()];
        assert_eq!(s.model_spec(&schema).unwrap().condition_variable, "treatment");
    }

    #[test]
    fn test_resample_source() {
        let mut s = Settings::default();
        assert_eq!(s.resample_source(), ResampleSource::Raw);
        s.sample_from_residuals = true;
        assert_eq!(s.resample_source(), ResampleSource::Residuals(FittedBase::Full));
    }

    #[test]
    fn test_tiny_step_yields_no_levels() {
        assert!(confidence_levels_from_range(0.5, 1e-8).is_empty());
        assert!(confidence_levels_from_range(0.5, 0.0).is_empty());
        assert!(confidence_levels_from_range(-1e9, 0.01).is_empty());

        let mut s = Settings::default();
        s.confidence_levels = confidence_levels_from_range(0.5, 1e-8);
        assert!(matches!(s.validate(), Err(PadeError::InvalidSettings { .. })));

        let finest = confidence_levels_from_range(0.0005, MIN_SUMMARY_STEP_SIZE);
        assert_eq!(finest.len(), MAX_CONFIDENCE_LEVELS);
        assert!(finest.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_too_many_levels_rejected() {
        let mut s = Settings::default();
        s.confidence_levels = (1..=MAX_CONFIDENCE_LEVELS + 1)
            .map(|k| k as f64 / (MAX_CONFIDENCE_LEVELS + 2) as f64)
            .collect();
        assert!(matches!(s.validate(), Err(PadeError::InvalidSettings { .. })));
        s.confidence_levels.truncate(MAX_CONFIDENCE_LEVELS);
        assert!(s.validate().is_ok());
    }
}
