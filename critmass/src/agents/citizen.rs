//! Cooperative citizens: threshold cooperation with a critical mass.
//!
//! A citizen cooperates when its (socially boosted) motivation beats the
//! net cost of cooperating, and that cost falls as more of the population
//! cooperates. The theoretical tipping point is
//! `theta_crit = cost / (benefit_multiplier + motivation_mean)`.

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

/// Motivation is never reinforced beyond this multiple of its baseline.
const MOTIVATION_CAP: f64 = 2.0;
/// Population rate above which cooperating is reinforcing rather than discouraging.
const REINFORCING_RATE: f64 = 0.5;
/// Per-step pull of a defector's motivation back to its baseline.
const RELAXATION: f64 = 0.01;

// === CONFIG ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CooperationConfig {
    pub n_agents: usize,
    pub cooperation_cost: f64,
    pub benefit_multiplier: f64,
    pub motivation_mean: f64,
    pub motivation_std: f64,
    pub initial_cooperation: f64,
    /// Fraction of agents (lowest indices first) with boosted motivation.
    pub transformed_fraction: f64,
    pub transformation_boost: f64,
    pub network_effects: bool,
    pub network_strength: f64,
    pub motivation_dynamics: bool,
    pub reinforcement_rate: f64,
    pub discouragement_rate: f64,
    pub decision_noise: f64,
    pub seed: u64,
    pub record_agents: bool,
}

impl Default for CooperationConfig {
    fn default() -> Self {
        Self {
            n_agents: 1000,
            cooperation_cost: 1.0,
            benefit_multiplier: 2.0,
            motivation_mean: 0.5,
            motivation_std: 0.3,
            initial_cooperation: 0.5,
            transformed_fraction: 0.0,
            transformation_boost: 1.0,
            network_effects: true,
            network_strength: 0.5,
            motivation_dynamics: true,
            reinforcement_rate: 0.02,
            discouragement_rate: 0.01,
            decision_noise: 0.1,
            seed: 42,
            record_agents: false,
        }
    }
}

impl CooperationConfig {
    /// Theoretical critical cooperation rate. Depends only on the cost,
    /// the benefit multiplier and the mean motivation.
    pub fn theta_crit(&self) -> f64 {
        self.cooperation_cost / (self.benefit_multiplier + self.motivation_mean)
    }

    pub fn transformed_count(&self) -> usize {
        (self.n_agents as f64 * self.transformed_fraction).floor() as usize
    }
}

impl ModelConfig for CooperationConfig {
    type Agent = Citizen;

    const MODEL: &'static str = "cooperation";

    fn validate(&self) -> Result<(), ValidationError> {
        require_positive_count("n_agents", self.n_agents)?;
        require_finite("cooperation_cost", self.cooperation_cost)?;
        require_finite("benefit_multiplier", self.benefit_multiplier)?;
        require_finite("motivation_mean", self.motivation_mean)?;
        require_non_negative("motivation_std", self.motivation_std)?;
        require_unit_interval("initial_cooperation", self.initial_cooperation)?;
        require_unit_interval("transformed_fraction", self.transformed_fraction)?;
        require_finite("transformation_boost", self.transformation_boost)?;
        require_finite("network_strength", self.network_strength)?;
        require_non_negative("reinforcement_rate", self.reinforcement_rate)?;
        require_unit_interval("discouragement_rate", self.discouragement_rate)?;
        require_non_negative("decision_noise", self.decision_noise)?;

        if self.benefit_multiplier + self.motivation_mean == 0.0 {
            return Err(ValidationError::Undefined {
                statistic: "theta_crit",
                reason: format!(
                    "benefit_multiplier ({}) + motivation_mean ({}) is zero",
                    self.benefit_multiplier, self.motivation_mean
                ),
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
        self.n_agents
    }

    fn record_agents(&self) -> bool {
        self.record_agents
    }
}

// === AGENT ===

#[derive(Debug, Clone, PartialEq)]
pub struct Citizen {
    pub motivation: f64,
    /// Motivation at construction, after any transformation boost.
    pub base_motivation: f64,
    pub cooperating: bool,
    pub transformed: bool,
}

impl Citizen {
    pub fn new(motivation: f64, cooperating: bool, transformed: bool) -> Self {
        Self {
            motivation,
            base_motivation: motivation,
            cooperating,
            transformed,
        }
    }

    /// Cooperation pays off when motivation plus the social boost exceeds
    /// `cost - benefit * rate`.
    fn decide(&self, rate: f64, noise: f64, config: &CooperationConfig) -> bool {
        let threshold = config.cooperation_cost - config.benefit_multiplier * rate;
        let social_boost = if config.network_effects {
            config.network_strength * rate
        } else {
            0.0
        };
        self.motivation + social_boost + noise > threshold
    }

    fn adapt_motivation(&mut self, rate: f64, config: &CooperationConfig) {
        if self.cooperating {
            if rate > REINFORCING_RATE {
                self.motivation = (self.motivation * (1.0 + config.reinforcement_rate))
                    .min(MOTIVATION_CAP * self.base_motivation);
            } else {
                self.motivation *= 1.0 - config.discouragement_rate;
            }
        } else {
            self.motivation =
                self.motivation * (1.0 - RELAXATION) + self.base_motivation * RELAXATION;
        }
    }
}

impl Agent for Citizen {
    type Config = CooperationConfig;

    fn populate(config: &CooperationConfig, rng: &mut RandomStream) -> Vec<Self> {
        let transformed = config.transformed_count();
        (0..config.n_agents)
            .map(|i| {
                let drawn = rng
                    .normal(config.motivation_mean, config.motivation_std)
                    .max(0.0);
                let is_transformed = i < transformed;
                let motivation = if is_transformed {
                    drawn + config.transformation_boost
                } else {
                    drawn
                };
                let cooperating = rng.uniform() < config.initial_cooperation;
                Citizen::new(motivation, cooperating, is_transformed)
            })
            .collect()
    }

    fn activate(
        index: usize,
        population: &mut Population<Self>,
        config: &CooperationConfig,
        _step: u64,
        rng: &mut RandomStream,
    ) -> Transition {
        let rate = population.flagged_rate();
        let noise = rng.normal(0.0, config.decision_noise);

        population
            .update(index, |citizen| {
                let before = citizen.cooperating;
                citizen.cooperating = citizen.decide(rate, noise, config);
                if config.motivation_dynamics {
                    citizen.adapt_motivation(rate, config);
                }
                Transition::between(before, citizen.cooperating)
            })
            .unwrap_or(Transition::Unchanged)
    }

    fn is_flagged(&self) -> bool {
        self.cooperating
    }

    fn state(&self) -> f64 {
        self.motivation
    }

    fn model_row(model: &Model<Self>) -> Row {
        let population = model.population();
        let rate = population.flagged_rate();
        let theta_crit = model.config().theta_crit();
        let last = model.last_step();
        vec![
            ("cooperation_rate", rate.into()),
            ("mean_motivation", population.mean_state().into()),
            ("std_motivation", population.std_state().into()),
            ("theta_crit", theta_crit.into()),
            ("above_threshold", (rate > theta_crit).into()),
            ("switched_on", last.entered.into()),
            ("switched_off", last.left.into()),
        ]
    }

    fn agent_row(&self) -> Row {
        vec![
            ("motivation", self.motivation.into()),
            ("cooperating", self.cooperating.into()),
            ("transformed", self.transformed.into()),
        ]
    }

    fn final_metrics(model: &Model<Self>) -> Row {
        let rate = model.population().flagged_rate();
        let theta_crit = model.config().theta_crit();
        vec![
            ("final_cooperation_rate", rate.into()),
            ("final_mean_motivation", model.population().mean_state().into()),
            ("theta_crit", theta_crit.into()),
            ("stable", (rate > theta_crit).into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> CooperationConfig {
        CooperationConfig {
            decision_noise: 0.0,
            network_effects: false,
            motivation_dynamics: false,
            ..CooperationConfig::default()
        }
    }

    #[test]
    fn test_theta_crit_from_defaults() {
        assert_eq!(CooperationConfig::default().theta_crit(), 0.4);
    }

    #[test]
    fn test_undefined_theta_crit_is_rejected() {
        let config = CooperationConfig {
            benefit_multiplier: 0.5,
            motivation_mean: -0.5,
            ..CooperationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Undefined { statistic: "theta_crit", .. })
        ));
    }

    #[test]
    fn test_decision_against_threshold() {
        let config = quiet_config();
        // threshold at rate 0.25: 1.0 - 2.0 * 0.25 = 0.5
        assert!(Citizen::new(0.51, false, false).decide(0.25, 0.0, &config));
        assert!(!Citizen::new(0.5, false, false).decide(0.25, 0.0, &config));

        let social = CooperationConfig {
            network_effects: true,
            network_strength: 0.4,
            ..config
        };
        assert!(Citizen::new(0.45, false, false).decide(0.25, 0.0, &social));
    }

    #[test]
    fn test_reinforcement_is_capped_at_twice_base() {
        let config = CooperationConfig {
            reinforcement_rate: 0.5,
            ..CooperationConfig::default()
        };
        let mut citizen = Citizen::new(1.0, true, false);
        for _ in 0..10 {
            citizen.adapt_motivation(0.9, &config);
            assert!(citizen.motivation <= 2.0 * citizen.base_motivation);
        }
        assert_eq!(citizen.motivation, 2.0);
    }

    #[test]
    fn test_lonely_cooperation_discourages_and_defection_relaxes() {
        let config = CooperationConfig::default();
        let mut citizen = Citizen::new(1.0, true, false);
        citizen.adapt_motivation(0.2, &config);
        assert!((citizen.motivation - 0.99).abs() < 1e-12);

        citizen.cooperating = false;
        citizen.motivation = 0.0;
        citizen.adapt_motivation(0.2, &config);
        assert!((citizen.motivation - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_transformed_agents_come_first_with_boosted_base() {
        let config = CooperationConfig {
            n_agents: 10,
            transformed_fraction: 0.3,
            transformation_boost: 5.0,
            motivation_std: 0.0,
            ..CooperationConfig::default()
        };
        let agents = Citizen::populate(&config, &mut RandomStream::new(1));
        assert_eq!(agents.len(), 10);
        for (i, agent) in agents.iter().enumerate() {
            assert_eq!(agent.transformed, i < 3);
            let expected = if i < 3 { 5.5 } else { 0.5 };
            assert_eq!(agent.motivation, expected);
            assert_eq!(agent.base_motivation, expected);
        }
    }

    #[test]
    fn test_drawn_motivation_is_never_negative() {
        let config = CooperationConfig {
            n_agents: 500,
            motivation_mean: -0.2,
            motivation_std: 0.5,
            ..CooperationConfig::default()
        };
        let agents = Citizen::populate(&config, &mut RandomStream::new(9));
        assert!(agents.iter().all(|a| a.motivation >= 0.0));
        assert!(agents.iter().any(|a| a.motivation == 0.0));
    }

    #[test]
    fn test_activation_reports_transition() {
        let config = quiet_config();
        let mut population = Population::new(vec![
            Citizen::new(2.0, false, false),
            Citizen::new(0.0, true, false),
        ]);
        let mut rng = RandomStream::new(0);

        assert_eq!(
            Citizen::activate(0, &mut population, &config, 0, &mut rng),
            Transition::Entered
        );
        // rate is now 1.0, threshold -1.0: a zero-motivation citizen still cooperates
        assert_eq!(
            Citizen::activate(1, &mut population, &config, 0, &mut rng),
            Transition::Unchanged
        );
        assert_eq!(population.flagged_count(), 2);
    }
}
