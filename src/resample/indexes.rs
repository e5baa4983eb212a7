//! Sample index arrangements for resampled replicates

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PadeError, Result};
use crate::model::Layout;

/// How replicate datasets are drawn from the observed samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingStrategy {
    /// Shuffle samples within each block (sampling without replacement)
    #[default]
    Permutation,
    /// Draw samples with replacement within each block
    Bootstrap,
}

/// One row of source sample indexes per replicate.
///
/// `row(k)[j]` is the observed sample whose value (or residual) fills
/// position `j` of replicate `k + 1`. Sources always come from the same
/// reduced-model group (block) as the position they fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIndexes {
    rows: Vec<Vec<usize>>,
}

/// Random source for one replicate: stream `replicate` of the job seed, so a
/// replicate's draw does not depend on which worker generates it.
fn replicate_rng(seed: u64, replicate: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(replicate as u64);
    rng
}

fn draw_row(
    blocks: &Layout,
    n_samples: usize,
    strategy: ResamplingStrategy,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let mut row: Vec<usize> = (0..n_samples).collect();
    for group in blocks {
        match strategy {
            ResamplingStrategy::Permutation => {
                let mut sources = group.clone();
                sources.shuffle(rng);
                for (&pos, src) in group.iter().zip(sources) {
                    row[pos] = src;
                }
            }
            ResamplingStrategy::Bootstrap => {
                for &pos in group {
                    row[pos] = group[rng.gen_range(0..group.len())];
                }
            }
        }
    }
    row
}

/// Number of distinct within-block permutations, saturating at `usize::MAX`
fn distinct_permutations(blocks: &Layout) -> usize {
    let mut total: usize = 1;
    for group in blocks {
        for k in 2..=group.len() {
            total = total.saturating_mul(k);
        }
    }
    total
}

impl SampleIndexes {
    /// Draw `n_replicates` arrangements within the blocks of `blocks`
    pub fn generate(
        blocks: &Layout,
        n_samples: usize,
        strategy: ResamplingStrategy,
        n_replicates: usize,
        seed: u64,
    ) -> Self {
        if strategy == ResamplingStrategy::Permutation {
            let distinct = distinct_permutations(blocks);
            if distinct < n_replicates {
                log::warn!(
                    "Only {} distinct permutations exist; {} replicates will repeat some of them",
                    distinct,
                    n_replicates
                );
            }
        }
        let rows = (0..n_replicates)
            .into_par_iter()
            .map(|k| {
                let mut rng = replicate_rng(seed, k);
                draw_row(blocks, n_samples, strategy, &mut rng)
            })
            .collect();
        Self { rows }
    }

    /// Use caller-supplied arrangements, checking that each row is valid for
    /// the blocks and strategy.
    pub fn from_rows(
        rows: Vec<Vec<usize>>,
        blocks: &Layout,
        n_samples: usize,
        strategy: ResamplingStrategy,
    ) -> Result<Self> {
        let mut block_of = vec![usize::MAX; n_samples];
        for (b, group) in blocks.iter().enumerate() {
            for &j in group {
                if j < n_samples {
                    block_of[j] = b;
                }
            }
        }

        for (k, row) in rows.iter().enumerate() {
            if row.len() != n_samples {
                return Err(PadeError::InvalidSampleIndexes {
                    reason: format!(
                        "row {} has {} indexes, expected {}",
                        k + 1,
                        row.len(),
                        n_samples
                    ),
                });
            }
            for (pos, &src) in row.iter().enumerate() {
                if src >= n_samples {
                    return Err(PadeError::InvalidSampleIndexes {
                        reason: format!("row {} refers to sample {} of {}", k + 1, src, n_samples),
                    });
                }
                if block_of[src] != block_of[pos] {
                    return Err(PadeError::InvalidSampleIndexes {
                        reason: format!(
                            "row {} moves sample {} into position {} of a different block",
                            k + 1,
                            src,
                            pos
                        ),
                    });
                }
            }
            if strategy == ResamplingStrategy::Permutation {
                let mut seen = vec![false; n_samples];
                for &src in row {
                    if std::mem::replace(&mut seen[src], true) {
                        return Err(PadeError::InvalidSampleIndexes {
                            reason: format!(
                                "row {} uses sample {} twice, which is not a permutation",
                                k + 1,
                                src
                            ),
                        });
                    }
                }
            }
        }
        Ok(Self { rows })
    }

    pub fn n_replicates(&self) -> usize {
        self.rows.len()
    }

    /// Arrangement for replicate `k + 1`
    pub fn row(&self, k: usize) -> &[usize] {
        &self.rows[k]
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }
}
