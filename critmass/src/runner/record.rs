//! One row per batch job: its parameters plus the run's final metrics.

use std::collections::BTreeMap;
use std::path::Path;

use instrument::{DataFrame, DynamicTable, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::model::Metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Submission index within the batch.
    pub job: usize,
    pub replication: usize,
    pub seed: u64,
    /// The options this job set, with the values the run actually used.
    pub params: BTreeMap<String, serde_json::Value>,
    pub metrics: Metrics,
}

impl ResultRecord {
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.get(name)
    }

    /// Numeric view of a final metric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }

    /// Flat row: `job, replication, seed`, then parameters, then metrics.
    pub fn to_row(&self) -> Vec<(String, Value)> {
        let mut row = vec![
            ("job".to_string(), Value::from(self.job)),
            ("replication".to_string(), Value::from(self.replication)),
            ("seed".to_string(), Value::U64(self.seed)),
        ];
        row.extend(
            self.params
                .iter()
                .map(|(name, value)| (name.clone(), json_cell(value))),
        );
        row.extend(
            self.metrics
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        row
    }
}

/// Table cell for a configuration value.
pub(crate) fn json_cell(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Value::U64(u)
            } else if let Some(i) = n.as_i64() {
                Value::I64(i)
            } else {
                Value::F64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

/// Successful records of a batch, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTable {
    records: Vec<ResultRecord>,
}

impl ResultTable {
    pub fn new(records: Vec<ResultRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_table(&self) -> Result<DynamicTable> {
        let mut table = DynamicTable::default();
        for record in &self.records {
            table.push_row(record.to_row())?;
        }
        Ok(table)
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        Ok(self.to_table()?.to_dataframe()?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        instrument::write_csv(&mut df, path)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl From<Vec<ResultRecord>> for ResultTable {
    fn from(records: Vec<ResultRecord>) -> Self {
        Self::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(job: usize, integrity: f64, rate: f64) -> ResultRecord {
        ResultRecord {
            job,
            replication: job % 2,
            seed: (job % 2) as u64,
            params: BTreeMap::from([
                ("integrity_mean".to_string(), json!(integrity)),
                ("oversight_structure".to_string(), json!("flat")),
            ]),
            metrics: Metrics::from([
                ("final_corruption_rate".to_string(), Value::F64(rate)),
                ("total_extractions".to_string(), Value::U64(7)),
            ]),
        }
    }

    #[test]
    fn test_flat_row_column_order() {
        let table = ResultTable::new(vec![record(0, 2.5, 0.4), record(1, 3.5, 0.2)])
            .to_table()
            .unwrap();
        assert_eq!(
            table.column_names(),
            [
                "job",
                "replication",
                "seed",
                "integrity_mean",
                "oversight_structure",
                "final_corruption_rate",
                "total_extractions"
            ]
        );
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.f64_column("integrity_mean").unwrap(), &[2.5, 3.5]);
    }

    #[test]
    fn test_json_round_trip_and_csv() {
        let table = ResultTable::new(vec![record(0, 2.5, 0.4)]);
        let parsed = ResultTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(parsed.records()[0].metric("total_extractions"), Some(7.0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        table.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("job,replication,seed,integrity_mean"));
    }

    #[test]
    fn test_json_cells() {
        assert_eq!(json_cell(&json!(3)), Value::U64(3));
        assert_eq!(json_cell(&json!(-3)), Value::I64(-3));
        assert_eq!(json_cell(&json!(0.5)), Value::F64(0.5));
        assert_eq!(json_cell(&json!(true)), Value::Bool(true));
        assert_eq!(json_cell(&json!("none")), Value::Str("none".to_string()));
    }
}
