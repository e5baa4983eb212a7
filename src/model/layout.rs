//! Sample layouts for the full and reduced models
//!
//! A layout is a list of groups of measurement-table column indexes; every
//! group shares one assignment of levels for a set of factors. The full model
//! groups samples by every combination of block and condition levels, the
//! reduced model by block levels only.

use serde::{Deserialize, Serialize};

use crate::data::{assignment_name, MeasurementTable, Schema};
use crate::error::{PadeError, Result};

/// Groups of measurement-table column indexes
pub type Layout = Vec<Vec<usize>>;

/// Which factors make up the full and reduced models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The factor tested for differential effects
    pub condition_variable: String,
    /// Nuisance factors present in both models
    pub block_variables: Vec<String>,
    /// Baseline level of the condition; the first sorted level if unset
    pub reference_level: Option<String>,
}

impl ModelSpec {
    pub fn new(condition_variable: &str) -> Self {
        Self {
            condition_variable: condition_variable.to_string(),
            block_variables: Vec::new(),
            reference_level: None,
        }
    }

    pub fn with_blocks(mut self, blocks: &[&str]) -> Self {
        self.block_variables = blocks.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn with_reference(mut self, level: &str) -> Self {
        self.reference_level = Some(level.to_string());
        self
    }
}

/// Experiment design resolved against a measurement table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    spec: ModelSpec,
    /// Condition levels, baseline first
    condition_levels: Vec<String>,
    block_names: Vec<String>,
    full_layout: Layout,
    full_names: Vec<String>,
    reduced_layout: Layout,
    condition_layout: Layout,
    n_samples: usize,
}

impl Design {
    /// Resolve the model spec against the schema for the table's samples.
    ///
    /// Fails if a table sample has no schema entry, a variable is unknown,
    /// the condition has fewer than two levels, or any block x condition
    /// group holds fewer than two samples.
    pub fn new(table: &MeasurementTable, schema: &Schema, spec: &ModelSpec) -> Result<Self> {
        if spec.block_variables.contains(&spec.condition_variable) {
            return Err(PadeError::InvalidInput {
                reason: format!(
                    "'{}' cannot be both the condition and a block variable",
                    spec.condition_variable
                ),
            });
        }
        let mut variables = spec.block_variables.clone();
        variables.push(spec.condition_variable.clone());
        schema.check_variables(&variables)?;

        // schema index -> table column
        let mut column_of = vec![None; schema.n_samples()];
        for (col, id) in table.sample_ids().iter().enumerate() {
            let idx = schema
                .sample_index(id)
                .ok_or_else(|| PadeError::SampleNotInSchema {
                    sample_id: id.clone(),
                })?;
            column_of[idx] = Some(col);
        }
        let unused = column_of.iter().filter(|c| c.is_none()).count();
        if unused > 0 {
            log::warn!(
                "{} schema sample(s) are not in the measurement table and will be ignored",
                unused
            );
        }

        let mut schema = schema.clone();
        if let Some(reference) = &spec.reference_level {
            schema.set_reference_level(&spec.condition_variable, reference)?;
        }

        let to_columns = |schema_idxs: Vec<usize>| -> Vec<usize> {
            let mut cols: Vec<usize> = schema_idxs.into_iter().filter_map(|i| column_of[i]).collect();
            cols.sort_unstable();
            cols
        };

        let condition_levels: Vec<String> = schema
            .levels(&spec.condition_variable)
            .map(|l| l.to_vec())
            .unwrap_or_default();
        let condition_layout: Layout = condition_levels
            .iter()
            .map(|level| {
                to_columns(schema.indexes_with_assignment(&[(
                    spec.condition_variable.clone(),
                    level.clone(),
                )]))
            })
            .collect();
        let present = condition_layout.iter().filter(|g| !g.is_empty()).count();
        if present < 2 {
            return Err(PadeError::UnsupportedLayout {
                reason: format!(
                    "condition '{}' needs at least two levels among the table's samples, found {}",
                    spec.condition_variable, present
                ),
            });
        }

        let block_assignments = schema.possible_assignments(&spec.block_variables)?;
        let full_assignments = schema.possible_assignments(&variables)?;

        let reduced_layout: Layout = block_assignments
            .iter()
            .map(|a| to_columns(schema.indexes_with_assignment(a)))
            .collect();
        let full_layout: Layout = full_assignments
            .iter()
            .map(|a| to_columns(schema.indexes_with_assignment(a)))
            .collect();
        let full_names: Vec<String> = full_assignments.iter().map(|a| assignment_name(a)).collect();

        if let Some((name, group)) = full_names
            .iter()
            .zip(full_layout.iter())
            .find(|(_, g)| g.len() < 2)
        {
            return Err(PadeError::UnsupportedLayout {
                reason: format!(
                    "the F-test needs at least two samples in every group, but group '{}' has {}",
                    name,
                    group.len()
                ),
            });
        }

        Ok(Self {
            spec: spec.clone(),
            condition_levels,
            block_names: block_assignments.iter().map(|a| assignment_name(a)).collect(),
            full_layout,
            full_names,
            reduced_layout,
            condition_layout,
            n_samples: table.n_samples(),
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Condition levels with the baseline first
    pub fn condition_levels(&self) -> &[String] {
        &self.condition_levels
    }

    pub fn baseline(&self) -> &str {
        &self.condition_levels[0]
    }

    /// Non-baseline condition levels; each one is a class with its own up/down calls
    pub fn classes(&self) -> &[String] {
        &self.condition_levels[1..]
    }

    pub fn n_classes(&self) -> usize {
        self.condition_levels.len() - 1
    }

    pub fn n_blocks(&self) -> usize {
        self.reduced_layout.len()
    }

    pub fn block_names(&self) -> &[String] {
        &self.block_names
    }

    /// Groups of the full model: block-major, condition level varying fastest
    pub fn full_layout(&self) -> &Layout {
        &self.full_layout
    }

    pub fn full_group_names(&self) -> &[String] {
        &self.full_names
    }

    /// Groups of the reduced model (one per block)
    pub fn reduced_layout(&self) -> &Layout {
        &self.reduced_layout
    }

    /// Samples grouped by condition level only, ignoring blocks
    pub fn condition_layout(&self) -> &Layout {
        &self.condition_layout
    }

    /// Index into the full layout of the group for `block` and condition `level`
    pub fn cell(&self, block: usize, level: usize) -> usize {
        block * self.condition_levels.len() + level
    }

    /// Residual degrees of freedom of the full model
    pub fn df_full(&self) -> usize {
        self.n_samples - self.full_layout.len()
    }

    /// Numerator degrees of freedom of the classical F ratio
    pub fn df_between(&self) -> usize {
        self.full_layout.len() - self.reduced_layout.len()
    }
}
