//! A single simulation run: configuration, population, random stream and
//! recorded history, advanced one step at a time.

use std::collections::BTreeMap;

use instrument::Value;

use crate::agents::{Agent, Transition};
use crate::collector::{DataCollector, TimeSeries};
use crate::config::ModelConfig;
use crate::error::Result;
use crate::population::Population;
use crate::rng::RandomStream;

/// Flag changes counted over one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTally {
    /// Flagged agents when the step began.
    pub flagged_at_start: usize,
    pub entered: u64,
    pub left: u64,
}

impl StepTally {
    fn count(&mut self, transition: Transition) {
        match transition {
            Transition::Entered => self.entered += 1,
            Transition::Left => self.left += 1,
            Transition::Unchanged => {}
        }
    }
}

/// Cumulative flag changes since the run started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub entered: u64,
    pub left: u64,
}

/// Named final aggregates of a run.
pub type Metrics = BTreeMap<String, Value>;

pub struct Model<A: Agent> {
    config: A::Config,
    population: Population<A>,
    rng: RandomStream,
    steps_taken: u64,
    collector: DataCollector,
    last_step: StepTally,
    totals: Totals,
}

impl<A: Agent> Model<A> {
    /// Validate `config` and draw the initial population from a stream
    /// seeded with `config.seed()`.
    pub fn new(config: A::Config) -> Result<Self> {
        config.validate()?;
        let mut rng = RandomStream::new(config.seed());
        let population = Population::new(A::populate(&config, &mut rng));
        let collector = DataCollector::new(config.record_agents());

        tracing::debug!(
            model = <A::Config as ModelConfig>::MODEL,
            agents = population.len(),
            seed = config.seed(),
            "model initialised"
        );

        Ok(Self {
            config,
            population,
            rng,
            steps_taken: 0,
            collector,
            last_step: StepTally::default(),
            totals: Totals::default(),
        })
    }

    /// Record the pre-step snapshot, then activate every agent once in a
    /// freshly drawn random order. Activations run strictly one after
    /// another, each seeing all mutations made earlier in the step.
    pub fn step(&mut self) -> Result<()> {
        let step = self.steps_taken;

        let row = A::model_row(self);
        self.collector.record_model(step, row)?;
        if self.collector.records_agents() {
            let rows: Vec<_> = self.population.iter().map(A::agent_row).collect();
            self.collector.record_agents(step, rows)?;
        }

        let order = self.population.activation_order(&mut self.rng);
        let mut tally = StepTally {
            flagged_at_start: self.population.flagged_count(),
            ..StepTally::default()
        };
        for index in order {
            let transition = A::activate(
                index,
                &mut self.population,
                &self.config,
                step,
                &mut self.rng,
            );
            tally.count(transition);
        }

        self.totals.entered += tally.entered;
        self.totals.left += tally.left;
        self.last_step = tally;
        self.steps_taken += 1;
        Ok(())
    }

    pub fn run(&mut self, steps: usize) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &A::Config {
        &self.config
    }

    pub fn population(&self) -> &Population<A> {
        &self.population
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Flag changes of the most recent step (all zero before the first).
    pub fn last_step(&self) -> StepTally {
        self.last_step
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Current cooperation / corruption rate.
    pub fn rate(&self) -> f64 {
        self.population.flagged_rate()
    }

    pub fn collector(&self) -> &DataCollector {
        &self.collector
    }

    pub fn final_metrics(&self) -> Metrics {
        A::final_metrics(self)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    pub fn into_time_series(self) -> TimeSeries {
        self.collector.into_time_series()
    }
}
