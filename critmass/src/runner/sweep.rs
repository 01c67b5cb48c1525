//! Sweep planning: parameter grids, job descriptors and seed derivation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pool::JobResult;
use super::record::{ResultRecord, ResultTable};
use crate::config::{Overrides, STEPS_KEY};
use crate::error::{ConfigError, WorkerError};
use crate::rng::mix_seed;

// === SEEDS ===

/// How a job's seed is derived.
///
/// The default seeds every job with its replication index alone, so the
/// same replication of two different combinations shares its noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// `seed = replication`
    #[default]
    Replication,
    /// `seed = base + replication`
    Offset(u64),
    /// Seed mixed from the base, the combination index and the replication,
    /// so no two jobs share noise.
    PerCombination(u64),
}

impl SeedPolicy {
    pub fn seed(&self, combination: usize, replication: usize) -> u64 {
        match *self {
            SeedPolicy::Replication => replication as u64,
            SeedPolicy::Offset(base) => base.wrapping_add(replication as u64),
            SeedPolicy::PerCombination(base) => {
                mix_seed(mix_seed(base, combination as u64), replication as u64)
            }
        }
    }
}

// === GRID ===

/// Named value lists; the sweep runs their Cartesian product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<Value>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis. Axes vary in insertion order, the last one fastest.
    pub fn axis<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(name, _)| name.as_str())
    }

    /// Number of combinations. An empty grid has exactly one (no overrides).
    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn combinations(&self) -> Vec<Overrides> {
        let mut combos = vec![Overrides::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values
                        .iter()
                        .map(move |value| combo.clone().with(name.clone(), value.clone()))
                })
                .collect();
        }
        combos
    }
}

// === JOBS ===

/// One independently seeded run of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentJob {
    /// Submission index; results are reported in this order.
    pub index: usize,
    /// Index of the parameter combination the job belongs to.
    pub combination: usize,
    /// This combination's values with the fixed options applied on top.
    pub overrides: Overrides,
    pub replication: usize,
    pub steps: usize,
    pub seed: u64,
}

/// Reject options the runner sets itself: the seed comes from `policy` and
/// the run length from the sweep's step count.
pub fn check_runner_owned(
    grid: &ParamGrid,
    fixed: &Overrides,
    policy: SeedPolicy,
) -> Result<(), ConfigError> {
    let owned = grid
        .names()
        .chain(fixed.iter().map(|(key, _)| key.as_str()))
        .find(|key| *key == "seed" || *key == STEPS_KEY);
    let Some(key) = owned else {
        return Ok(());
    };
    let owner = if key == STEPS_KEY {
        "the sweep's step count".to_string()
    } else {
        format!("seed policy {policy:?}")
    };
    Err(ConfigError::RunnerOwned {
        key: key.to_string(),
        owner,
    })
}

/// Build `combinations x replications` jobs, replications innermost. A key
/// both swept and fixed takes the fixed value.
pub fn plan_jobs(
    combinations: &[Overrides],
    fixed: &Overrides,
    replications: usize,
    steps: usize,
    policy: SeedPolicy,
) -> Vec<ExperimentJob> {
    let mut jobs = Vec::with_capacity(combinations.len() * replications);
    for (combination, values) in combinations.iter().enumerate() {
        let overrides = values.merged(fixed);
        for replication in 0..replications {
            jobs.push(ExperimentJob {
                index: jobs.len(),
                combination,
                overrides: overrides.clone(),
                replication,
                steps,
                seed: policy.seed(combination, replication),
            });
        }
    }
    jobs
}

/// Outcome of a parameter sweep: one entry per job, in submission order.
#[derive(Debug)]
pub struct SweepReport {
    pub jobs: Vec<ExperimentJob>,
    pub outcomes: Vec<JobResult<ResultRecord>>,
}

impl SweepReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.outcomes.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerError> {
        self.outcomes.iter().filter_map(|r| r.as_ref().err())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    /// Successful records only, still in submission order.
    pub fn into_table(self) -> ResultTable {
        ResultTable::new(self.outcomes.into_iter().filter_map(Result::ok).collect())
    }
}
