//! Per-step snapshot tables.

use std::collections::HashMap;
use std::path::Path;

use instrument::{DataFrame, DynamicTable, PolarsResult, TableError, Value};

use crate::agents::Row;

/// Records one model-level row per step and, when enabled, one agent-level
/// row per agent per step. Tables only ever grow.
#[derive(Debug, Clone, Default)]
pub struct DataCollector {
    model: DynamicTable,
    agents: Option<DynamicTable>,
}

impl DataCollector {
    pub fn new(record_agents: bool) -> Self {
        Self {
            model: DynamicTable::default(),
            agents: record_agents.then(DynamicTable::default),
        }
    }

    pub fn records_agents(&self) -> bool {
        self.agents.is_some()
    }

    pub fn record_model(&mut self, step: u64, row: Row) -> Result<(), TableError> {
        self.model
            .push_row(std::iter::once(("step", Value::U64(step))).chain(row))
    }

    /// Rows keyed by (`step`, `agent`). A no-op when agent recording is off.
    pub fn record_agents<I>(&mut self, step: u64, rows: I) -> Result<(), TableError>
    where
        I: IntoIterator<Item = Row>,
    {
        let Some(table) = self.agents.as_mut() else {
            return Ok(());
        };
        for (index, row) in rows.into_iter().enumerate() {
            table.push_row(
                [("step", Value::U64(step)), ("agent", Value::from(index))]
                    .into_iter()
                    .chain(row),
            )?;
        }
        Ok(())
    }

    pub fn model_table(&self) -> &DynamicTable {
        &self.model
    }

    pub fn agent_table(&self) -> Option<&DynamicTable> {
        self.agents.as_ref()
    }

    pub fn into_time_series(self) -> TimeSeries {
        TimeSeries {
            model: self.model,
            agents: self.agents,
        }
    }
}

/// The recorded history of one finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub model: DynamicTable,
    pub agents: Option<DynamicTable>,
}

impl TimeSeries {
    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.model.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    /// Values of one numeric model-level column, in step order.
    pub fn series(&self, column: &str) -> Option<Vec<f64>> {
        let column = self.model.column(column)?;
        (0..column.len())
            .map(|row| column.get(row).and_then(|v| v.as_f64()))
            .collect()
    }

    pub fn model_dataframe(&self) -> PolarsResult<DataFrame> {
        self.model.to_dataframe()
    }

    pub fn agent_dataframe(&self) -> Option<PolarsResult<DataFrame>> {
        self.agents.as_ref().map(DynamicTable::to_dataframe)
    }

    /// Write `model.csv` (and `agents.csv` when recorded) into `dir`.
    pub fn write_csv(&self, dir: &Path) -> PolarsResult<()> {
        self.model.write_csv(&dir.join("model.csv"))?;
        if let Some(agents) = &self.agents {
            agents.write_csv(&dir.join("agents.csv"))?;
        }
        Ok(())
    }

    /// Write `model.parquet` (and `agents.parquet`) into `dir`.
    pub fn write_parquet(&self, dir: &Path) -> PolarsResult<()> {
        let mut frames = HashMap::from([("model".to_string(), self.model_dataframe()?)]);
        if let Some(agents) = self.agent_dataframe() {
            frames.insert("agents".to_string(), agents?);
        }
        instrument::save_parquet(&mut frames, dir)
    }
}
