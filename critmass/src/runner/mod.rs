//! Single runs and parallel batches of runs.
//!
//! Every batch is a list of immutable [`ExperimentJob`]s dispatched to a
//! [`WorkerPool`]. Configuration problems are reported before any job
//! starts; failures while running are isolated to their own job.

mod bifurcation;
mod governance;
mod pool;
mod record;
mod sweep;

pub use bifurcation::*;
pub use governance::*;
pub use pool::*;
pub use record::*;
pub use sweep::*;

use instrument::Value;

use crate::agents::{CooperationConfig, PolycentricConfig};
use crate::collector::TimeSeries;
use crate::config::{ModelConfig, Overrides};
use crate::error::{Result, SimError, WorkerError};
use crate::model::{Metrics, Model};

/// History and final aggregates of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub time_series: TimeSeries,
    pub final_metrics: Metrics,
    pub seed: u64,
    pub steps: usize,
}

impl RunOutput {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.final_metrics.get(name).and_then(Value::as_f64)
    }
}

/// Run `config` for `steps` steps. Identical config and step count give
/// bit-identical output.
pub fn run<C: ModelConfig>(config: &C, steps: usize) -> Result<RunOutput> {
    let mut model = Model::<C::Agent>::new(config.clone())?;
    model.run(steps)?;
    let final_metrics = model.final_metrics();
    let seed = model.seed();
    Ok(RunOutput {
        time_series: model.into_time_series(),
        final_metrics,
        seed,
        steps,
    })
}

/// Resolve `overrides` against the defaults, reseed, and validate.
fn job_config<C: ModelConfig>(job: &ExperimentJob) -> Result<C> {
    let mut config = C::default().with_overrides(&job.overrides)?;
    config.set_seed(job.seed);
    config.validate()?;
    Ok(config)
}

fn record_for<C: ModelConfig>(
    job: &ExperimentJob,
    config: &C,
    output: RunOutput,
) -> ResultRecord {
    let resolved = config.to_params();
    let params = job
        .overrides
        .iter()
        .map(|(key, value)| {
            let canonical = C::canonical_key(key);
            let used = resolved.get(canonical).cloned().unwrap_or_else(|| value.clone());
            (canonical.to_string(), used)
        })
        .collect();
    ResultRecord {
        job: job.index,
        replication: job.replication,
        seed: output.seed,
        params,
        metrics: output.final_metrics,
    }
}

// === RUNNER ===

#[derive(Debug, Clone, Default)]
pub struct ExperimentRunner {
    pool: WorkerPool,
    seed_policy: SeedPolicy,
}

impl ExperimentRunner {
    /// Runner with one worker per available hardware thread.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        let cancel = self.pool.cancel_handle();
        self.pool = WorkerPool::new(workers).with_cancel_handle(cancel);
        self
    }

    pub fn with_seed_policy(mut self, policy: SeedPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    pub fn seed_policy(&self) -> SeedPolicy {
        self.seed_policy
    }

    /// Handle for abandoning jobs of the next batch by submission index.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.pool.cancel_handle()
    }

    pub fn run<C: ModelConfig>(&self, config: &C, steps: usize) -> Result<RunOutput> {
        run(config, steps)
    }

    /// Run every combination of `grid` (with `fixed` applied on top)
    /// `replications` times. One outcome per job, in submission order:
    /// combinations in grid order, replications innermost. `seed` and
    /// `n_steps` belong to the runner and are rejected as options.
    pub fn parameter_sweep<C: ModelConfig>(
        &self,
        grid: &ParamGrid,
        fixed: &Overrides,
        replications: usize,
        steps: usize,
    ) -> Result<SweepReport> {
        check_runner_owned(grid, fixed, self.seed_policy)?;
        let jobs = plan_jobs(
            &grid.combinations(),
            fixed,
            replications,
            steps,
            self.seed_policy,
        );
        let configs = jobs
            .iter()
            .map(job_config::<C>)
            .collect::<Result<Vec<C>>>()?;

        tracing::info!(
            model = C::MODEL,
            jobs = jobs.len(),
            workers = self.pool.workers(),
            "starting parameter sweep"
        );

        let tasks: Vec<_> = jobs
            .iter()
            .zip(&configs)
            .map(|(job, config)| {
                move || -> Result<ResultRecord> {
                    tracing::debug!(job = job.index, seed = job.seed, "running job");
                    let output = run(config, job.steps)?;
                    Ok(record_for(job, config, output))
                }
            })
            .collect();
        let outcomes = self.pool.execute(tasks);

        let report = SweepReport { jobs, outcomes };
        tracing::info!(
            completed = report.records().count(),
            failed = report.failures().count(),
            "parameter sweep finished"
        );
        Ok(report)
    }

    /// Vary only the initial cooperation rate of `base`. `None` uses the
    /// 17 default rates over `[0.1, 0.9]`.
    pub fn bifurcation_sweep(
        &self,
        base: &CooperationConfig,
        initial_rates: Option<&[f64]>,
        replications: usize,
        steps: usize,
    ) -> Result<BifurcationReport> {
        base.validate()?;
        let theta_crit = base.theta_crit();
        let rates = initial_rates.map_or_else(default_initial_rates, <[f64]>::to_vec);

        let mut configs = Vec::with_capacity(rates.len() * replications);
        for (combination, &rate) in rates.iter().enumerate() {
            for replication in 0..replications {
                let config = CooperationConfig {
                    initial_cooperation: rate,
                    seed: self.seed_policy.seed(combination, replication),
                    ..base.clone()
                };
                config.validate()?;
                configs.push((rate, replication, config));
            }
        }

        tracing::info!(
            rates = rates.len(),
            replications,
            theta_crit,
            "starting bifurcation sweep"
        );

        let tasks: Vec<_> = configs
            .iter()
            .map(|(rate, replication, config)| {
                move || -> Result<BifurcationRecord> {
                    let output = run(config, steps)?;
                    Ok(BifurcationRecord {
                        initial_rate: *rate,
                        final_rate: output.metric("final_cooperation_rate").unwrap_or(0.0),
                        theta_crit,
                        replication: *replication,
                    })
                }
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        let mut failures = Vec::new();
        for outcome in self.pool.execute(tasks) {
            match outcome {
                Ok(record) => results.push(record),
                Err(e) => failures.push(e),
            }
        }
        Ok(BifurcationReport {
            summary: BifurcationSummary::new(results),
            failures,
        })
    }

    /// Run the polycentric model under each governance preset for
    /// `replications` replications (seeded per the runner's seed policy) and
    /// summarise final corruption rates.
    pub fn compare_governance_systems(
        &self,
        common: &Overrides,
        replications: usize,
        steps: usize,
    ) -> Result<GovernanceComparison> {
        check_runner_owned(&ParamGrid::new(), common, self.seed_policy)?;
        let base = PolycentricConfig::default().with_overrides(common)?;

        let mut configs = Vec::with_capacity(GovernancePreset::ALL.len() * replications);
        for (combination, preset) in GovernancePreset::ALL.iter().enumerate() {
            for replication in 0..replications {
                let mut config = preset.apply(&base);
                config.set_seed(self.seed_policy.seed(combination, replication));
                config.validate()?;
                configs.push(config);
            }
        }

        let tasks: Vec<_> = configs
            .iter()
            .map(|config| {
                move || -> Result<f64> {
                    let output = run(config, steps)?;
                    Ok(output.metric("final_corruption_rate").unwrap_or(0.0))
                }
            })
            .collect();
        let outcomes = self.pool.execute(tasks);

        let mut rates: Vec<Vec<f64>> =
            vec![Vec::with_capacity(replications); GovernancePreset::ALL.len()];
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(rate) => rates[index / replications.max(1)].push(rate),
                Err(WorkerError::Failed { source, .. }) => return Err(source),
                Err(other) => return Err(SimError::Worker(Box::new(other))),
            }
        }

        let mut summaries = rates.into_iter().map(SystemSummary::from_values);
        Ok(GovernanceComparison {
            hierarchical: summaries.next().unwrap_or_default(),
            partial_ostrom: summaries.next().unwrap_or_default(),
            full_ostrom: summaries.next().unwrap_or_default(),
        })
    }
}
