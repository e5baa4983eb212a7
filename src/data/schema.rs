//! Experiment schema: factors and their per-sample levels

use serde::{Deserialize, Serialize};

use crate::error::{PadeError, Result};

/// A categorical factor assigning one level to every sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factor {
    name: String,
    /// Level of each sample, in schema sample order
    values: Vec<String>,
    /// Distinct levels; sorted, except that a chosen reference level is moved first
    levels: Vec<String>,
}

impl Factor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }
}

/// A factor level assignment such as `treatment=drug`
pub type Assignment = Vec<(String, String)>;

/// Human-readable name for an assignment, e.g. "batch=b1, treatment=drug"
pub fn assignment_name(assignment: &[(String, String)]) -> String {
    if assignment.is_empty() {
        return "intercept".to_string();
    }
    assignment
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ordered set of factors describing every sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    sample_ids: Vec<String>,
    factors: Vec<Factor>,
}

impl Schema {
    /// Create a schema with no factors
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                return Err(PadeError::InvalidSchema {
                    reason: format!("duplicate sample id '{}'", id),
                });
            }
        }
        Ok(Self {
            sample_ids,
            factors: Vec::new(),
        })
    }

    /// Add a factor column. Factors keep their insertion order.
    pub fn add_factor(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(PadeError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if self.has_factor(name) {
            return Err(PadeError::InvalidSchema {
                reason: format!("factor '{}' is defined twice", name),
            });
        }
        if let Some(pos) = values.iter().position(|v| v.trim().is_empty()) {
            return Err(PadeError::InvalidSchema {
                reason: format!(
                    "sample '{}' has no level for factor '{}'",
                    self.sample_ids[pos], name
                ),
            });
        }
        let mut levels = values.clone();
        levels.sort();
        levels.dedup();
        self.factors.push(Factor {
            name: name.to_string(),
            values,
            levels,
        });
        Ok(())
    }

    /// Make `level` the first (baseline) level of factor `name`
    pub fn set_reference_level(&mut self, name: &str, level: &str) -> Result<()> {
        let factor = self
            .factors
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| PadeError::InvalidInput {
                reason: format!("factor '{}' not found", name),
            })?;
        let pos = factor
            .levels
            .iter()
            .position(|l| l == level)
            .ok_or_else(|| PadeError::InvalidInput {
                reason: format!(
                    "reference level '{}' is not a level of factor '{}' (levels: {:?})",
                    level, name, factor.levels
                ),
            })?;
        let reference = factor.levels.remove(pos);
        factor.levels.insert(0, reference);
        Ok(())
    }

    pub fn has_factor(&self, name: &str) -> bool {
        self.factors.iter().any(|f| f.name == name)
    }

    pub fn factor(&self, name: &str) -> Option<&Factor> {
        self.factors.iter().find(|f| f.name == name)
    }

    /// Factor names in schema order
    pub fn factor_names(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn levels(&self, name: &str) -> Option<&[String]> {
        self.factor(name).map(|f| f.levels())
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Check that every name is a known factor
    pub fn check_variables(&self, names: &[String]) -> Result<()> {
        let unknown: Vec<&String> = names.iter().filter(|n| !self.has_factor(n)).collect();
        if unknown.is_empty() {
            return Ok(());
        }
        let mut known: Vec<&str> = self.factor_names();
        known.sort();
        Err(PadeError::UnknownFactor {
            unknown: quote_and_join(unknown.iter().map(|s| s.as_str())),
            known: quote_and_join(known.into_iter()),
        })
    }

    /// Every combination of levels of the given factors, first factor varying slowest
    pub fn possible_assignments(&self, names: &[String]) -> Result<Vec<Assignment>> {
        self.check_variables(names)?;
        let mut assignments: Vec<Assignment> = vec![Vec::new()];
        for name in names {
            let levels = self.levels(name).unwrap_or(&[]);
            let mut next = Vec::with_capacity(assignments.len() * levels.len());
            for prefix in &assignments {
                for level in levels {
                    let mut a = prefix.clone();
                    a.push((name.clone(), level.clone()));
                    next.push(a);
                }
            }
            assignments = next;
        }
        Ok(assignments)
    }

    /// Schema sample indexes whose levels match every pair in the assignment
    pub fn indexes_with_assignment(&self, assignment: &[(String, String)]) -> Vec<usize> {
        (0..self.n_samples())
            .filter(|&i| {
                assignment.iter().all(|(name, level)| {
                    self.factor(name)
                        .map(|f| f.values[i] == *level)
                        .unwrap_or(false)
                })
            })
            .collect()
    }
}

fn quote_and_join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = items.map(|s| format!("\"{}\"", s)).collect();
    match quoted.len() {
        0 => String::new(),
        1 => quoted[0].clone(),
        2 => format!("{} and {}", quoted[0], quoted[1]),
        n => format!("{}, and {}", quoted[..n - 1].join(", "), quoted[n - 1]),
    }
}
