//! Fixed-size, index-addressed agent storage.

use crate::agents::Agent;
use crate::rng::RandomStream;

/// Dense array of agents. An agent's index is its identity for the whole
/// run; peers refer to each other by index only.
///
/// The number of flagged agents is cached and kept current by [`update`],
/// so the population rate an agent reads mid-step always reflects every
/// earlier activation of that step.
///
/// [`update`]: Population::update
#[derive(Debug, Clone)]
pub struct Population<A: Agent> {
    agents: Vec<A>,
    /// Always equals the number of agents with `is_flagged()`. Agents are
    /// only reachable mutably through `update`, which adjusts this count.
    flagged: usize,
}

impl<A: Agent> Population<A> {
    pub fn new(agents: Vec<A>) -> Self {
        let flagged = agents.iter().filter(|a| a.is_flagged()).count();
        Self { agents, flagged }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&A> {
        self.agents.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.agents.iter()
    }

    /// Mutate one agent. Returns `None` when `index` is out of range.
    pub fn update<R>(&mut self, index: usize, f: impl FnOnce(&mut A) -> R) -> Option<R> {
        let agent = self.agents.get_mut(index)?;
        let before = agent.is_flagged();
        let result = f(agent);
        let after = agent.is_flagged();
        if after && !before {
            self.flagged += 1;
        } else if before && !after {
            self.flagged -= 1;
        }
        Some(result)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged
    }

    /// Fraction of flagged agents; 0.0 for an empty population.
    pub fn flagged_rate(&self) -> f64 {
        if self.agents.is_empty() {
            return 0.0;
        }
        self.flagged as f64 / self.agents.len() as f64
    }

    pub fn count_where(&self, member: impl Fn(&A) -> bool) -> usize {
        self.agents.iter().filter(|a| member(a)).count()
    }

    /// Fraction of agents matching `member` that are flagged; 0.0 if none match.
    pub fn flagged_rate_where(&self, member: impl Fn(&A) -> bool) -> f64 {
        let (members, flagged) = self
            .agents
            .iter()
            .filter(|a| member(a))
            .fold((0usize, 0usize), |(m, f), a| {
                (m + 1, f + usize::from(a.is_flagged()))
            });
        if members == 0 {
            return 0.0;
        }
        flagged as f64 / members as f64
    }

    pub fn mean_state(&self) -> f64 {
        mean(self.agents.iter().map(A::state))
    }

    /// Population (not sample) standard deviation of the scalar state.
    pub fn std_state(&self) -> f64 {
        if self.agents.is_empty() {
            return 0.0;
        }
        let mean = self.mean_state();
        let var = self
            .agents
            .iter()
            .map(|a| (a.state() - mean).powi(2))
            .sum::<f64>()
            / self.agents.len() as f64;
        var.sqrt()
    }

    /// Fresh activation order for one step.
    pub fn activation_order(&self, rng: &mut RandomStream) -> Vec<usize> {
        rng.permutation(self.agents.len())
    }
}

/// Arithmetic mean; 0.0 for no values.
pub(crate) fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (count, sum) = values.fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Citizen;

    fn citizens(states: &[(f64, bool)]) -> Population<Citizen> {
        Population::new(
            states
                .iter()
                .map(|&(motivation, cooperating)| Citizen::new(motivation, cooperating, false))
                .collect(),
        )
    }

    #[test]
    fn test_empty_population_aggregates_are_zero() {
        let population = citizens(&[]);
        assert_eq!(population.flagged_rate(), 0.0);
        assert_eq!(population.mean_state(), 0.0);
        assert_eq!(population.std_state(), 0.0);
        assert_eq!(population.flagged_rate_where(|_| true), 0.0);
    }

    #[test]
    fn test_update_keeps_flagged_count_current() {
        let mut population = citizens(&[(1.0, true), (2.0, false), (3.0, false)]);
        assert_eq!(population.flagged_count(), 1);

        population.update(1, |c| c.cooperating = true);
        assert_eq!(population.flagged_count(), 2);
        population.update(0, |c| c.cooperating = false);
        population.update(0, |c| c.cooperating = false);
        assert_eq!(population.flagged_count(), 1);
        assert!((population.flagged_rate() - 1.0 / 3.0).abs() < 1e-12);

        assert!(population.update(7, |c| c.cooperating = true).is_none());
        assert_eq!(population.flagged_count(), 1);
    }

    #[test]
    fn test_cached_count_matches_a_recount() {
        let mut population = citizens(&[(0.5, false); 40]);
        let mut rng = RandomStream::new(6);
        for _ in 0..500 {
            let index = rng.permutation(40)[0];
            let flip = rng.uniform() < 0.5;
            population.update(index, |c| c.cooperating = flip);
            let recount = population.count_where(|c| c.cooperating);
            assert_eq!(population.flagged_count(), recount);
        }
        assert_eq!(population.count_where(|c| c.motivation == 0.5), 40);
    }

    #[test]
    fn test_state_statistics() {
        let population = citizens(&[(1.0, false), (3.0, false)]);
        assert_eq!(population.mean_state(), 2.0);
        assert_eq!(population.std_state(), 1.0);
    }
}
