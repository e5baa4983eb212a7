//! Command-line interface for rust_pade

use clap::{Args, Parser, Subcommand};

use crate::config::{
    confidence_levels_from_range, Settings, DEFAULT_SUMMARY_MIN_CONF, DEFAULT_SUMMARY_STEP_SIZE,
    MIN_SUMMARY_STEP_SIZE,
};
use crate::error::{PadeError, Result};
use crate::resample::{FittedBase, ResamplingStrategy};

#[derive(Parser)]
#[command(name = "rust_pade")]
#[command(version)]
#[command(about = "Permutation-based differential expression analysis in Rust")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full PaDE analysis
    #[command(
        about = "Run a full PaDE analysis",
        long_about = "Run a full PaDE analysis\n\n\
            Fits full and reduced group-means models for every feature, computes a\n\
            tuned F statistic at each tuning parameter, resamples the samples to\n\
            estimate the confidence (1 - FDR) of every feature, and picks the best\n\
            tuning parameter per confidence level, class and direction.",
        after_long_help = "\
Examples:
  # Two-condition comparison
  rust_pade run -i table.tsv -s schema.tsv -c treatment -o results.tsv

  # Blocking on batch, resampling residuals with replacement
  rust_pade run -i table.tsv -s schema.tsv -c treatment -b batch \\
    --sample-from-residuals --sample-with-replacement

  # Custom tuning parameters and a JSON dump of all results
  rust_pade run -i table.tsv -s schema.tsv -c treatment \\
    --tuning-param 0.1 --tuning-param 1 --tuning-param 10 --json results.json"
    )]
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the measurement table
    #[arg(short, long,
        long_help = "Path to the measurement table.\n\
            Format: first column = feature IDs, remaining columns = one value per sample.\n\
            Supports both TSV (tab) and CSV (comma) delimiters (auto-detected).")]
    pub input: String,

    /// Path to the schema file
    #[arg(short, long,
        long_help = "Path to the schema file.\n\
            Format: first column = sample IDs (matching the table's columns),\n\
            remaining columns = one factor each. Lines starting with '#' are ignored.")]
    pub schema: String,

    /// Condition variable to test
    #[arg(short, long,
        long_help = "Factor whose levels are compared. May be omitted when the schema\n\
            has a single factor besides the block variables.")]
    pub condition: Option<String>,

    /// Block variable
    #[arg(short, long, value_name = "VAR",
        long_help = "Nuisance factor present in both models. Samples are only ever\n\
            exchanged within a block. Can be given more than once.")]
    pub block: Vec<String>,

    /// Baseline level of the condition
    #[arg(long, value_name = "LEVEL")]
    pub reference: Option<String>,

    /// Tuning parameter (repeatable)
    #[arg(short, long = "tuning-param", value_name = "ALPHA",
        long_help = "Tuning parameter added to the statistic's denominator. Specify it\n\
            more than once to search over several values; the one giving the most\n\
            calls is chosen at each confidence level.")]
    pub tuning_param: Vec<f64>,

    /// Alpha of the flat F-test column
    #[arg(long, value_name = "ALPHA")]
    pub reference_tuning_param: Option<f64>,

    /// Number of resampled replicates
    #[arg(short = 'R', long)]
    pub num_samples: Option<usize>,

    /// Number of bins
    #[arg(long,
        long_help = "Number of bins to divide statistic space into. You probably don't\n\
            need to change this.")]
    pub num_bins: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Draw replicates with replacement (bootstrap)
    #[arg(long)]
    pub sample_with_replacement: bool,

    /// Resample model residuals instead of raw values
    #[arg(long)]
    pub sample_from_residuals: bool,

    /// Fitted values receiving resampled residuals [default: full]
    #[arg(long, value_enum, value_name = "MODEL")]
    pub fitted_base: Option<FittedBase>,

    /// File of sample index rows, one replicate per line
    #[arg(long, value_name = "FILE")]
    pub sample_indexes: Option<String>,

    /// Lowest confidence level reported
    #[arg(long)]
    pub summary_min_conf: Option<f64>,

    /// Step between reported confidence levels
    #[arg(long)]
    pub summary_step_size: Option<f64>,

    /// JSON settings file; command-line options override it
    #[arg(long, value_name = "FILE")]
    pub settings: Option<String>,

    /// Number of threads (0 = auto) [default: 0]
    #[arg(long, default_value = "0")]
    pub threads: usize,

    /// Output path for the per-feature table
    #[arg(short, long, default_value = "pade_results.tsv")]
    pub output: String,

    /// Output path for the full JSON results
    #[arg(long, value_name = "FILE")]
    pub json: Option<String>,
}

impl RunArgs {
    /// Settings from the settings file (or defaults) with command-line overrides
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => Settings::from_json_file(path)?,
            None => Settings::default(),
        };

        if let Some(c) = &self.condition {
            settings.condition_variable = Some(c.clone());
        }
        if !self.block.is_empty() {
            settings.block_variables = self.block.clone();
        }
        if let Some(r) = &self.reference {
            settings.reference_level = Some(r.clone());
        }
        if !self.tuning_param.is_empty() {
            settings.tuning_params = self.tuning_param.clone();
        }
        if let Some(a) = self.reference_tuning_param {
            settings.reference_tuning_param = a;
        }
        if let Some(n) = self.num_samples {
            settings.num_samples = n;
        }
        if let Some(n) = self.num_bins {
            settings.num_bins = n;
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if self.sample_with_replacement {
            settings.strategy = ResamplingStrategy::Bootstrap;
        }
        if self.sample_from_residuals {
            settings.sample_from_residuals = true;
        }
        if let Some(base) = self.fitted_base {
            settings.fitted_base = base;
        }
        if self.summary_min_conf.is_some() || self.summary_step_size.is_some() {
            let step = self.summary_step_size.unwrap_or(DEFAULT_SUMMARY_STEP_SIZE);
            if step.is_nan() || step < MIN_SUMMARY_STEP_SIZE {
                return Err(PadeError::InvalidSettings {
                    reason: format!(
                        "summary step size must be at least {}, got {}",
                        MIN_SUMMARY_STEP_SIZE, step
                    ),
                });
            }
            settings.confidence_levels = confidence_levels_from_range(
                self.summary_min_conf.unwrap_or(DEFAULT_SUMMARY_MIN_CONF),
                step,
            );
        }
        Ok(settings)
    }
}
