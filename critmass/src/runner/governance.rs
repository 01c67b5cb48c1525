//! Side-by-side comparison of governance regimes in the polycentric model.

use serde::{Deserialize, Serialize};

use crate::agents::PolycentricConfig;
use crate::analysis::mean_std;

/// Governance regimes, from plain hierarchy to every design principle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernancePreset {
    /// One group, hierarchical detection, flat sanctions, no collective choice.
    Hierarchical,
    /// Peer monitoring only, five groups.
    PartialOstrom,
    /// Peer monitoring, graduated sanctions and collective choice, five groups.
    FullOstrom,
}

impl GovernancePreset {
    pub const ALL: [GovernancePreset; 3] = [
        GovernancePreset::Hierarchical,
        GovernancePreset::PartialOstrom,
        GovernancePreset::FullOstrom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GovernancePreset::Hierarchical => "hierarchical",
            GovernancePreset::PartialOstrom => "partial_ostrom",
            GovernancePreset::FullOstrom => "full_ostrom",
        }
    }

    /// `base` with this regime's switches and group count.
    pub fn apply(&self, base: &PolycentricConfig) -> PolycentricConfig {
        let (peer_monitoring, graduated_sanctions, collective_choice, n_groups) = match self {
            GovernancePreset::Hierarchical => (false, false, false, 1),
            GovernancePreset::PartialOstrom => (true, false, false, 5),
            GovernancePreset::FullOstrom => (true, true, true, 5),
        };
        PolycentricConfig {
            peer_monitoring,
            graduated_sanctions,
            collective_choice,
            n_groups,
            ..base.clone()
        }
    }
}

/// Final corruption rates of one regime across replications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub values: Vec<f64>,
}

impl SystemSummary {
    pub fn from_values(values: Vec<f64>) -> Self {
        let (mean, std) = mean_std(&values);
        Self { mean, std, values }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceComparison {
    pub hierarchical: SystemSummary,
    pub partial_ostrom: SystemSummary,
    pub full_ostrom: SystemSummary,
}

impl GovernanceComparison {
    pub fn get(&self, preset: GovernancePreset) -> &SystemSummary {
        match preset {
            GovernancePreset::Hierarchical => &self.hierarchical,
            GovernancePreset::PartialOstrom => &self.partial_ostrom,
            GovernancePreset::FullOstrom => &self.full_ostrom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_switch_principles() {
        let base = PolycentricConfig {
            n_participants: 40,
            ..PolycentricConfig::default()
        };
        let hierarchical = GovernancePreset::Hierarchical.apply(&base);
        assert!(!hierarchical.peer_monitoring && !hierarchical.graduated_sanctions);
        assert_eq!(hierarchical.n_groups, 1);
        assert_eq!(hierarchical.n_participants, 40);

        let partial = GovernancePreset::PartialOstrom.apply(&base);
        assert!(partial.peer_monitoring);
        assert!(!partial.graduated_sanctions && !partial.collective_choice);

        let full = GovernancePreset::FullOstrom.apply(&base);
        assert!(full.peer_monitoring && full.graduated_sanctions && full.collective_choice);
        assert_eq!(full.n_groups, 5);
    }

    #[test]
    fn test_summary_statistics() {
        let summary = SystemSummary::from_values(vec![0.2, 0.4]);
        assert!((summary.mean - 0.3).abs() < 1e-12);
        assert!((summary.std - 0.1).abs() < 1e-12);
        assert_eq!(SystemSummary::from_values(Vec::new()).mean, 0.0);
    }
}
