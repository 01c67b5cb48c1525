//! Agent-based critical-mass simulations of cooperation and corruption.
//!
//! Three model variants share one scheduler: a [`Model`] owns a fixed
//! [`Population`] and a single seeded [`RandomStream`], and each step
//! activates every agent once in a fresh random order. The
//! [`ExperimentRunner`] fans independent runs out over a worker pool for
//! parameter sweeps, bifurcation sweeps and governance comparisons.
//!
//! ```ignore
//! use critmass::{CooperationConfig, ExperimentRunner, ModelConfig, Overrides};
//!
//! let config = CooperationConfig::from_overrides(&Overrides::new().with("n_agents", 200))?;
//! let output = critmass::run(&config, 100)?;
//! println!("{:?}", output.final_metrics);
//!
//! let report = ExperimentRunner::new().bifurcation_sweep(&config, None, 5, 100)?;
//! println!("{}", report.summary.to_json()?);
//! ```

pub mod analysis;
pub mod logging;

mod agents;
mod collector;
mod config;
mod error;
mod model;
mod population;
mod rng;
mod runner;

pub use agents::*;
pub use collector::*;
pub use config::*;
pub use error::*;
pub use model::*;
pub use population::*;
pub use rng::*;
pub use runner::*;
