//! Bifurcation sweep results and their JSON interchange format.
//!
//! The wire shape is fixed:
//!
//! ```json
//! {
//!   "results": [
//!     { "initial_rate": 0.1, "final_rate": 0.0, "theta_crit": 0.4, "replication": 0 }
//!   ],
//!   "theta_crit": 0.4
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError, WorkerError};

pub const DEFAULT_RATE_POINTS: usize = 17;
const DEFAULT_RATE_MIN: f64 = 0.1;
const DEFAULT_RATE_MAX: f64 = 0.9;

/// `points` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            let mut values: Vec<f64> = (0..points).map(|i| start + step * i as f64).collect();
            if let Some(last) = values.last_mut() {
                *last = end;
            }
            values
        }
    }
}

/// 17 evenly spaced initial cooperation rates over `[0.1, 0.9]`.
pub fn default_initial_rates() -> Vec<f64> {
    linspace(DEFAULT_RATE_MIN, DEFAULT_RATE_MAX, DEFAULT_RATE_POINTS)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BifurcationRecord {
    pub initial_rate: f64,
    pub final_rate: f64,
    pub theta_crit: f64,
    pub replication: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BifurcationSummary {
    pub results: Vec<BifurcationRecord>,
    /// `null` when there are no results.
    pub theta_crit: Option<f64>,
}

impl BifurcationSummary {
    pub fn new(results: Vec<BifurcationRecord>) -> Self {
        let theta_crit = results.first().map(|r| r.theta_crit);
        Self {
            results,
            theta_crit,
        }
    }

    /// Mean final rate per distinct initial rate, in first-seen order.
    pub fn mean_final_rates(&self) -> Vec<(f64, f64)> {
        let mut groups: Vec<(f64, f64, usize)> = Vec::new();
        for record in &self.results {
            match groups
                .iter_mut()
                .find(|(rate, _, _)| *rate == record.initial_rate)
            {
                Some((_, sum, count)) => {
                    *sum += record.final_rate;
                    *count += 1;
                }
                None => groups.push((record.initial_rate, record.final_rate, 1)),
            }
        }
        groups
            .into_iter()
            .map(|(rate, sum, count)| (rate, sum / count as f64))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// Summary of the successful jobs plus the jobs that failed.
#[derive(Debug)]
pub struct BifurcationReport {
    pub summary: BifurcationSummary,
    pub failures: Vec<WorkerError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let rates = default_initial_rates();
        assert_eq!(rates.len(), 17);
        assert_eq!(rates[0], 0.1);
        assert_eq!(rates[16], 0.9);
        assert!((rates[8] - 0.5).abs() < 1e-12);
        assert!(rates.windows(2).all(|w| (w[1] - w[0] - 0.05).abs() < 1e-12));
    }

    #[test]
    fn test_linspace_edges() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(0.3, 1.0, 1), vec![0.3]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_wire_field_names() {
        let summary = BifurcationSummary::new(vec![BifurcationRecord {
            initial_rate: 0.5,
            final_rate: 0.75,
            theta_crit: 0.4,
            replication: 2,
        }]);
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["theta_crit"], 0.4);
        assert_eq!(value["results"][0]["initial_rate"], 0.5);
        assert_eq!(value["results"][0]["final_rate"], 0.75);
        assert_eq!(value["results"][0]["theta_crit"], 0.4);
        assert_eq!(value["results"][0]["replication"], 2);
    }

    #[test]
    fn test_parses_externally_produced_summary() {
        let text = r#"{
            "results": [
                {"initial_rate": 0.1, "final_rate": 0.0, "theta_crit": 0.4, "replication": 0},
                {"initial_rate": 0.1, "final_rate": 0.5, "theta_crit": 0.4, "replication": 1},
                {"initial_rate": 0.9, "final_rate": 1.0, "theta_crit": 0.4, "replication": 0}
            ],
            "theta_crit": 0.4
        }"#;
        let summary = BifurcationSummary::from_json(text).unwrap();
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.theta_crit, Some(0.4));
        assert_eq!(summary.mean_final_rates(), vec![(0.1, 0.25), (0.9, 1.0)]);
    }

    #[test]
    fn test_empty_summary_has_null_theta() {
        let empty = BifurcationSummary::new(Vec::new());
        assert!(empty.to_json().unwrap().contains("\"theta_crit\": null"));
        let parsed =
            BifurcationSummary::from_json(r#"{"results": [], "theta_crit": null}"#).unwrap();
        assert_eq!(parsed, empty);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bifurcation.json");
        let summary = BifurcationSummary::new(vec![BifurcationRecord {
            initial_rate: 0.3,
            final_rate: 0.1,
            theta_crit: 0.4,
            replication: 0,
        }]);
        summary.write_json(&path).unwrap();
        assert_eq!(BifurcationSummary::read_json(&path).unwrap(), summary);
        assert!(matches!(
            BifurcationSummary::read_json(&dir.path().join("missing.json")),
            Err(SimError::Io { .. })
        ));
    }
}
