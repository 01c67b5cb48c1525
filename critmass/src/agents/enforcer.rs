//! Enforcers in an oversight hierarchy, who may turn corrupt.
//!
//! An enforcer extracts when the opportunity beats its integrity plus the
//! expected cost of being caught. Corruption is irreversible here, and each
//! corrupt act can erode the integrity of a few honest peers (contagion).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Agent, Row, Transition};
use crate::config::ModelConfig;
use crate::error::{
    ConfigError, ValidationError, require_finite, require_non_negative, require_positive_count,
    require_unit_interval,
};
use crate::model::Model;
use crate::population::{Population, mean};
use crate::rng::RandomStream;

/// Peers exposed to one corrupt act.
const CONTAGION_SAMPLE: usize = 5;
/// Population corruption rate above which honesty earns a reputation boost.
const REINFORCEMENT_THRESHOLD: f64 = 0.3;
/// Floor of a freshly drawn integrity.
const MIN_INTEGRITY: f64 = 0.1;
const FLAT_OVERSIGHT: f64 = 0.8;

// === OVERSIGHT ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversightStructure {
    /// Same oversight for everyone.
    Flat,
    /// Oversight thins out towards the top ranks.
    #[default]
    Hierarchical,
    /// No oversight at all: nothing is ever detected.
    None,
}

impl OversightStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            OversightStructure::Flat => "flat",
            OversightStructure::Hierarchical => "hierarchical",
            OversightStructure::None => "none",
        }
    }
}

impl fmt::Display for OversightStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OversightStructure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(OversightStructure::Flat),
            "hierarchical" => Ok(OversightStructure::Hierarchical),
            "none" => Ok(OversightStructure::None),
            other => Err(ConfigError::InvalidValue {
                key: "oversight_structure".to_string(),
                value: other.to_string(),
                reason: "expected one of flat, hierarchical, none".to_string(),
            }),
        }
    }
}

/// Oversight level per rank index. Index 0 is the top of the hierarchy.
///
/// Hierarchical bands by `rank = i / n`: top 10% get 0.1, the next 20% get
/// 0.4, the next 20% get 0.6 and the bottom half 0.9.
pub fn oversight_levels(structure: OversightStructure, n: usize) -> Vec<f64> {
    match structure {
        OversightStructure::Flat => vec![FLAT_OVERSIGHT; n],
        OversightStructure::None => vec![0.0; n],
        OversightStructure::Hierarchical => (0..n)
            .map(|i| {
                let rank = i as f64 / n as f64;
                if rank < 0.1 {
                    0.1
                } else if rank < 0.3 {
                    0.4
                } else if rank < 0.5 {
                    0.6
                } else {
                    0.9
                }
            })
            .collect(),
    }
}

// === CONFIG ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorruptionConfig {
    pub n_enforcers: usize,
    pub integrity_mean: f64,
    pub integrity_std: f64,
    pub extraction_mean: f64,
    pub extraction_std: f64,
    pub base_detection_prob: f64,
    pub detection_cost: f64,
    pub oversight_structure: OversightStructure,
    pub integrity_decay: bool,
    pub integrity_decay_rate: f64,
    pub corruption_contagion: bool,
    pub contagion_rate: f64,
    pub integrity_reinforcement: bool,
    pub reinforcement_rate: f64,
    pub seed: u64,
    pub record_agents: bool,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            n_enforcers: 100,
            integrity_mean: 5.0,
            integrity_std: 2.0,
            extraction_mean: 3.0,
            extraction_std: 1.5,
            base_detection_prob: 0.3,
            detection_cost: 10.0,
            oversight_structure: OversightStructure::Hierarchical,
            integrity_decay: true,
            integrity_decay_rate: 0.05,
            corruption_contagion: true,
            contagion_rate: 0.02,
            integrity_reinforcement: false,
            reinforcement_rate: 0.02,
            seed: 42,
            record_agents: false,
        }
    }
}

impl ModelConfig for CorruptionConfig {
    type Agent = Enforcer;

    const MODEL: &'static str = "corruption";

    fn validate(&self) -> Result<(), ValidationError> {
        require_positive_count("n_enforcers", self.n_enforcers)?;
        require_finite("integrity_mean", self.integrity_mean)?;
        require_non_negative("integrity_std", self.integrity_std)?;
        require_finite("extraction_mean", self.extraction_mean)?;
        require_non_negative("extraction_std", self.extraction_std)?;
        require_unit_interval("base_detection_prob", self.base_detection_prob)?;
        require_non_negative("detection_cost", self.detection_cost)?;
        require_unit_interval("integrity_decay_rate", self.integrity_decay_rate)?;
        require_unit_interval("contagion_rate", self.contagion_rate)?;
        require_non_negative("reinforcement_rate", self.reinforcement_rate)?;
        Ok(())
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    fn population_size(&self) -> usize {
        self.n_enforcers
    }

    fn record_agents(&self) -> bool {
        self.record_agents
    }
}

// === AGENT ===

#[derive(Debug, Clone, PartialEq)]
pub struct Enforcer {
    pub integrity: f64,
    pub corrupted: bool,
    pub extraction_events: u64,
    /// Fixed at construction from the enforcer's rank.
    pub oversight_level: f64,
}

impl Enforcer {
    pub fn new(integrity: f64, oversight_level: f64) -> Self {
        Self {
            integrity,
            corrupted: false,
            extraction_events: 0,
            oversight_level,
        }
    }

    pub fn detection_prob(&self, config: &CorruptionConfig) -> f64 {
        config.base_detection_prob * self.oversight_level
    }

    /// Less oversight means more power, and so bigger opportunities.
    fn extraction_opportunity(&self, draw: f64) -> f64 {
        (draw * (1.0 + (1.0 - self.oversight_level))).max(0.0)
    }
}

/// Erode the integrity of up to five random honest peers of `source`.
fn spread_corruption(
    source: usize,
    population: &mut Population<Enforcer>,
    config: &CorruptionConfig,
    step: u64,
    rng: &mut RandomStream,
) {
    let peers = rng.sample_others(population.len(), source, CONTAGION_SAMPLE);
    for peer in peers {
        let affected = population
            .update(peer, |enforcer| {
                if enforcer.corrupted {
                    return false;
                }
                enforcer.integrity *= 1.0 - config.contagion_rate;
                true
            })
            .unwrap_or(false);

        #[cfg(feature = "instrument")]
        if affected {
            tracing::info!(
                target: "contagion",
                step = step,
                source = source as u64,
                peer = peer as u64,
            );
        }
        let _ = (affected, step); // Suppress unused warnings
    }
}

impl Agent for Enforcer {
    type Config = CorruptionConfig;

    fn populate(config: &CorruptionConfig, rng: &mut RandomStream) -> Vec<Self> {
        oversight_levels(config.oversight_structure, config.n_enforcers)
            .into_iter()
            .map(|level| {
                let integrity = rng
                    .normal(config.integrity_mean, config.integrity_std)
                    .max(MIN_INTEGRITY);
                Enforcer::new(integrity, level)
            })
            .collect()
    }

    fn activate(
        index: usize,
        population: &mut Population<Self>,
        config: &CorruptionConfig,
        step: u64,
        rng: &mut RandomStream,
    ) -> Transition {
        let Some(enforcer) = population.get(index) else {
            return Transition::Unchanged;
        };
        let draw = rng.normal(config.extraction_mean, config.extraction_std);
        let opportunity = enforcer.extraction_opportunity(draw);
        if opportunity <= 0.0 {
            return Transition::Unchanged;
        }

        let expected_cost = config.detection_cost * enforcer.detection_prob(config);
        let integrity = enforcer.integrity;

        if opportunity > expected_cost + integrity {
            let transition = population
                .update(index, |enforcer| {
                    let before = enforcer.corrupted;
                    enforcer.corrupted = true;
                    enforcer.extraction_events += 1;
                    if config.integrity_decay {
                        enforcer.integrity *= 1.0 - config.integrity_decay_rate;
                    }
                    Transition::between(before, true)
                })
                .unwrap_or(Transition::Unchanged);

            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "extraction",
                step = step,
                agent = index as u64,
                opportunity = opportunity,
                expected_cost = expected_cost,
                integrity = integrity,
            );

            if config.corruption_contagion {
                spread_corruption(index, population, config, step, rng);
            }
            return transition;
        }

        if config.integrity_reinforcement {
            let rate = population.flagged_rate();
            if rate > REINFORCEMENT_THRESHOLD {
                let boost = config.reinforcement_rate * rate;
                let cap = 2.0 * config.integrity_mean;
                population.update(index, |enforcer| {
                    enforcer.integrity = (enforcer.integrity * (1.0 + boost)).min(cap);
                });
            }
        }
        Transition::Unchanged
    }

    fn is_flagged(&self) -> bool {
        self.corrupted
    }

    fn state(&self) -> f64 {
        self.integrity
    }

    fn model_row(model: &Model<Self>) -> Row {
        let population = model.population();
        let config = model.config();
        let total_extractions: u64 = population.iter().map(|e| e.extraction_events).sum();
        vec![
            ("corruption_rate", population.flagged_rate().into()),
            ("mean_integrity", population.mean_state().into()),
            ("std_integrity", population.std_state().into()),
            ("total_extractions", total_extractions.into()),
            ("corrupted_agents", population.flagged_count().into()),
            (
                "mean_detection_prob",
                mean(population.iter().map(|e| e.detection_prob(config))).into(),
            ),
        ]
    }

    fn agent_row(&self) -> Row {
        vec![
            ("integrity", self.integrity.into()),
            ("corrupted", self.corrupted.into()),
            ("extractions", self.extraction_events.into()),
            ("oversight_level", self.oversight_level.into()),
        ]
    }

    fn final_metrics(model: &Model<Self>) -> Row {
        let population = model.population();
        let total_extractions: u64 = population.iter().map(|e| e.extraction_events).sum();
        vec![
            ("final_corruption_rate", population.flagged_rate().into()),
            ("final_mean_integrity", population.mean_state().into()),
            ("total_extractions", total_extractions.into()),
        ]
    }
}
