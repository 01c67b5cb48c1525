//! Agent variants and the contract the scheduler drives them through.
//!
//! Each variant owns one scalar state (motivation or integrity) and one
//! boolean status flag (cooperating / corrupted / corrupt). Activation gets
//! the whole [`Population`] by mutable reference: the agent reads live
//! aggregates from it and, for contagion, writes to peers by index.

mod citizen;
mod enforcer;
mod participant;

pub use citizen::*;
pub use enforcer::*;
pub use participant::*;

use std::fmt::Debug;

use instrument::Value;

use crate::config::ModelConfig;
use crate::model::Model;
use crate::population::Population;
use crate::rng::RandomStream;

/// Named cells of one table row.
pub type Row = Vec<(&'static str, Value)>;

/// Change of an agent's status flag during one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Flag switched on (started cooperating / became corrupt).
    Entered,
    /// Flag switched off (stopped cooperating / reformed).
    Left,
}

impl Transition {
    pub fn between(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => Transition::Entered,
            (true, false) => Transition::Left,
            _ => Transition::Unchanged,
        }
    }
}

pub trait Agent: Clone + Debug + Send + Sync + 'static {
    type Config: ModelConfig<Agent = Self>;

    /// Build the initial population, drawing from `rng` in index order.
    fn populate(config: &Self::Config, rng: &mut RandomStream) -> Vec<Self>;

    /// Activate the agent at `index` once. Draws only from `rng`, mutates
    /// only through `population`.
    fn activate(
        index: usize,
        population: &mut Population<Self>,
        config: &Self::Config,
        step: u64,
        rng: &mut RandomStream,
    ) -> Transition;

    /// The status flag the population rate is computed over.
    fn is_flagged(&self) -> bool;

    /// The scalar state (motivation or integrity).
    fn state(&self) -> f64;

    /// Model-level reporters, evaluated on the pre-step state.
    fn model_row(model: &Model<Self>) -> Row;

    /// Agent-level reporters, without the `step` / `agent` keys.
    fn agent_row(&self) -> Row;

    /// Aggregates reported when a run finishes.
    fn final_metrics(model: &Model<Self>) -> Row;
}
