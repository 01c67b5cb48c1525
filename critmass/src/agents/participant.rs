//! Participants in a polycentric commons: peer monitoring, graduated
//! sanctions and collective choice as switchable design principles.
//!
//! Each participant is a two-state machine, Honest <-> Corrupt. The way
//! back (reform) only exists under graduated sanctions; otherwise Corrupt
//! is absorbing.

use serde::{Deserialize, Serialize};

use super::{Agent, Row, Transition};
use crate::config::ModelConfig;
use crate::error::{
    ValidationError, require_finite, require_non_negative, require_positive_count,
    require_unit_interval,
};
use crate::model::Model;
use crate::population::Population;
use crate::rng::RandomStream;

const DECISION_NOISE: f64 = 0.1;
const MAX_PEER_DETECTION: f64 = 0.95;
/// Flat penalty multiple when sanctions are not graduated.
const FLAT_PENALTY_MULTIPLE: f64 = 5.0;
/// Per-sanction decay of what continued corruption is worth.
const GAIN_DECAY: f64 = 0.9;
const INTEGRITY_PULL: f64 = 0.1;
const MIN_INTEGRITY: f64 = 0.1;

// === CONFIG ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolycentricConfig {
    pub n_participants: usize,
    pub n_groups: usize,
    /// Peer monitoring: detection rises with visible corruption. When off,
    /// detection is hierarchical and falls as corruption spreads.
    #[serde(alias = "ostrom_monitoring")]
    pub peer_monitoring: bool,
    pub graduated_sanctions: bool,
    pub collective_choice: bool,
    pub base_detection_prob: f64,
    pub vigilance_factor: f64,
    pub sanction_base: f64,
    pub social_pressure_factor: f64,
    pub corruption_gain: f64,
    pub stake_factor: f64,
    pub integrity_weight: f64,
    pub integrity_mean: f64,
    pub integrity_std: f64,
    pub integrity_decay_rate: f64,
    pub integrity_recovery_rate: f64,
    /// Peer detection, stake and social pressure weaken once a group
    /// outgrows `optimal_group_size`.
    pub scale_effects: bool,
    pub monitoring_decay_rate: f64,
    /// Decay of both the collective-choice stake and reform social pressure.
    pub social_pressure_decay: f64,
    pub optimal_group_size: f64,
    pub seed: u64,
    pub record_agents: bool,
}

impl Default for PolycentricConfig {
    fn default() -> Self {
        Self {
            n_participants: 100,
            n_groups: 5,
            peer_monitoring: true,
            graduated_sanctions: true,
            collective_choice: true,
            base_detection_prob: 0.2,
            vigilance_factor: 0.4,
            sanction_base: 0.5,
            social_pressure_factor: 0.3,
            corruption_gain: 2.0,
            stake_factor: 0.2,
            integrity_weight: 0.1,
            integrity_mean: 5.0,
            integrity_std: 1.0,
            integrity_decay_rate: 0.05,
            integrity_recovery_rate: 0.1,
            scale_effects: false,
            monitoring_decay_rate: 0.5,
            social_pressure_decay: 0.3,
            optimal_group_size: 20.0,
            seed: 42,
            record_agents: false,
        }
    }
}

impl PolycentricConfig {
    /// Weight of a group effect at `group_size`: 1 up to the optimal size,
    /// then `exp(-decay * excess / optimal)`. Always 1 without scale effects.
    pub fn scale_multiplier(&self, group_size: usize, decay: f64) -> f64 {
        let size = group_size as f64;
        if !self.scale_effects || size <= self.optimal_group_size {
            return 1.0;
        }
        let excess = size - self.optimal_group_size;
        (-decay * excess / self.optimal_group_size).exp()
    }
}

impl ModelConfig for PolycentricConfig {
    type Agent = Participant;

    const MODEL: &'static str = "polycentric";

    fn validate(&self) -> Result<(), ValidationError> {
        require_positive_count("n_participants", self.n_participants)?;
        require_positive_count("n_groups", self.n_groups)?;
        require_unit_interval("base_detection_prob", self.base_detection_prob)?;
        require_non_negative("vigilance_factor", self.vigilance_factor)?;
        require_non_negative("sanction_base", self.sanction_base)?;
        require_finite("social_pressure_factor", self.social_pressure_factor)?;
        require_finite("corruption_gain", self.corruption_gain)?;
        require_finite("stake_factor", self.stake_factor)?;
        require_finite("integrity_weight", self.integrity_weight)?;
        require_finite("integrity_mean", self.integrity_mean)?;
        require_non_negative("integrity_std", self.integrity_std)?;
        require_unit_interval("integrity_decay_rate", self.integrity_decay_rate)?;
        require_unit_interval("integrity_recovery_rate", self.integrity_recovery_rate)?;
        require_non_negative("monitoring_decay_rate", self.monitoring_decay_rate)?;
        require_non_negative("social_pressure_decay", self.social_pressure_decay)?;
        if !(self.optimal_group_size.is_finite() && self.optimal_group_size > 0.0) {
            return Err(ValidationError::NonPositive {
                param: "optimal_group_size",
                value: self.optimal_group_size.to_string(),
            });
        }
        Ok(())
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    fn population_size(&self) -> usize {
        self.n_participants
    }

    fn record_agents(&self) -> bool {
        self.record_agents
    }

    fn canonical_key(key: &str) -> &str {
        match key {
            "ostrom_monitoring" => "peer_monitoring",
            other => other,
        }
    }
}

// === AGENT ===

/// What a participant sees of its own group when it acts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupView {
    /// Fraction of the group currently corrupt, self included.
    pub corruption: f64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub integrity: f64,
    pub base_integrity: f64,
    pub corrupt: bool,
    pub group_id: usize,
    pub sanctions_received: u64,
}

impl Participant {
    pub fn new(integrity: f64, group_id: usize) -> Self {
        Self {
            integrity,
            base_integrity: integrity,
            corrupt: false,
            group_id,
            sanctions_received: 0,
        }
    }

    pub fn detection_prob(&self, group: GroupView, config: &PolycentricConfig) -> f64 {
        let g = group.corruption;
        if config.peer_monitoring {
            let scale = config.scale_multiplier(group.size, config.monitoring_decay_rate);
            ((config.base_detection_prob + config.vigilance_factor * g) * scale)
                .min(MAX_PEER_DETECTION)
        } else {
            config.base_detection_prob * (1.0 - g)
        }
    }

    pub fn expected_penalty(&self, config: &PolycentricConfig) -> f64 {
        if config.graduated_sanctions {
            config.sanction_base * (1.0 + self.sanctions_received as f64)
        } else {
            config.sanction_base * FLAT_PENALTY_MULTIPLE
        }
    }

    /// Everything that weighs against turning corrupt.
    pub fn corruption_cost(&self, group: GroupView, config: &PolycentricConfig) -> f64 {
        let stake = if config.collective_choice {
            config.stake_factor
                * (1.0 - group.corruption)
                * config.scale_multiplier(group.size, config.social_pressure_decay)
        } else {
            0.0
        };
        self.detection_prob(group, config) * self.expected_penalty(config)
            + self.integrity * config.integrity_weight
            + stake
    }

    pub fn reform_benefit(&self, group: GroupView, config: &PolycentricConfig) -> f64 {
        let pressure = config.social_pressure_factor
            * (1.0 - group.corruption)
            * config.scale_multiplier(group.size, config.social_pressure_decay);
        pressure + self.base_integrity * INTEGRITY_PULL
    }

    /// What staying corrupt is still worth; shrinks with every sanction.
    pub fn reform_cost(&self, config: &PolycentricConfig) -> f64 {
        config.corruption_gain * GAIN_DECAY.powf(self.sanctions_received as f64)
    }

    fn reform(&mut self) {
        self.corrupt = false;
        self.sanctions_received = self.sanctions_received.saturating_sub(1);
    }

    fn update_integrity(&mut self, config: &PolycentricConfig) {
        if self.corrupt {
            self.integrity *= 1.0 - config.integrity_decay_rate;
            self.sanctions_received += 1;
        } else if config.graduated_sanctions {
            let recovery = (self.base_integrity - self.integrity) * config.integrity_recovery_rate;
            self.integrity = (self.integrity + recovery).min(self.base_integrity);
        }
    }
}

impl Agent for Participant {
    type Config = PolycentricConfig;

    fn populate(config: &PolycentricConfig, rng: &mut RandomStream) -> Vec<Self> {
        (0..config.n_participants)
            .map(|i| {
                let integrity = rng
                    .normal(config.integrity_mean, config.integrity_std)
                    .max(MIN_INTEGRITY);
                Participant::new(integrity, i % config.n_groups)
            })
            .collect()
    }

    fn activate(
        index: usize,
        population: &mut Population<Self>,
        config: &PolycentricConfig,
        step: u64,
        rng: &mut RandomStream,
    ) -> Transition {
        let Some(participant) = population.get(index) else {
            return Transition::Unchanged;
        };
        let group = participant.group_id;
        let view = GroupView {
            corruption: population.flagged_rate_where(|p| p.group_id == group),
            size: population.count_where(|p| p.group_id == group),
        };

        let transition = if participant.corrupt {
            if config.graduated_sanctions
                && participant.reform_benefit(view, config)
                    > participant.reform_cost(config) + rng.normal(0.0, DECISION_NOISE)
            {
                Transition::Left
            } else {
                Transition::Unchanged
            }
        } else {
            let noise = rng.normal(0.0, DECISION_NOISE);
            if config.corruption_gain + noise > participant.corruption_cost(view, config) {
                Transition::Entered
            } else {
                Transition::Unchanged
            }
        };

        let sanctions = population
            .update(index, |participant| {
                match transition {
                    Transition::Entered => participant.corrupt = true,
                    Transition::Left => participant.reform(),
                    Transition::Unchanged => {}
                }
                participant.update_integrity(config);
                participant.sanctions_received
            })
            .unwrap_or_default();

        #[cfg(feature = "instrument")]
        if transition == Transition::Left {
            tracing::info!(
                target: "reform",
                step = step,
                agent = index as u64,
                group = group as u64,
                group_corruption = view.corruption,
                sanctions = sanctions,
            );
        }
        let _ = (step, sanctions); // Suppress unused warnings

        transition
    }

    fn is_flagged(&self) -> bool {
        self.corrupt
    }

    fn state(&self) -> f64 {
        self.integrity
    }

    fn model_row(model: &Model<Self>) -> Row {
        let population = model.population();
        let last = model.last_step();
        let reform_rate = if last.flagged_at_start == 0 {
            0.0
        } else {
            last.left as f64 / last.flagged_at_start as f64
        };
        let total_sanctions: u64 = population.iter().map(|p| p.sanctions_received).sum();
        vec![
            ("corruption_rate", population.flagged_rate().into()),
            ("mean_integrity", population.mean_state().into()),
            ("std_integrity", population.std_state().into()),
            ("reform_rate", reform_rate.into()),
            ("total_reforms", model.totals().left.into()),
            ("total_sanctions", total_sanctions.into()),
        ]
    }

    fn agent_row(&self) -> Row {
        vec![
            ("integrity", self.integrity.into()),
            ("corrupt", self.corrupt.into()),
            ("group", self.group_id.into()),
            ("sanctions", self.sanctions_received.into()),
        ]
    }

    fn final_metrics(model: &Model<Self>) -> Row {
        let population = model.population();
        vec![
            ("final_corruption_rate", population.flagged_rate().into()),
            ("final_mean_integrity", population.mean_state().into()),
            ("total_reforms", model.totals().left.into()),
        ]
    }
}
