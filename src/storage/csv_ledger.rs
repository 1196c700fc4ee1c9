use std::path::{Path, PathBuf};

use super::{LedgerStore, conform, write_atomically};
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::ledger::{Cell, Ledger};
use crate::schema::ColumnSchema;

/// Ledger stored as a CSV file with a header row.
///
/// Missing cells are written as empty fields. Rows shorter than the header
/// are padded with missing cells on load. Only parameter, objective and
/// `trial_index` cells are read as numbers; all other cells keep their text.
#[derive(Clone, Debug)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, schema: &ColumnSchema) -> Result<Ledger> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let numeric: Vec<bool> = columns.iter().map(|c| schema.is_numeric(c)).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let row = record?
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    if numeric.get(i).copied().unwrap_or(false) {
                        Cell::parse(text)
                    } else {
                        Cell::parse_text(text)
                    }
                })
                .collect();
            rows.push(row);
        }
        Ok(Ledger::from_rows(columns, rows))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self, config: &ExperimentConfig) -> Result<Ledger> {
        let ledger = if self.path.exists() {
            self.read(&ColumnSchema::from_config(config))?
        } else {
            trace_debug!(path = %self.path.display(), "no ledger on disk, starting empty");
            Ledger::default()
        };
        Ok(conform(ledger, config))
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        write_atomically(&self.path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(ledger.columns())?;
            for row in ledger.rows() {
                writer.write_record(row.iter().map(Cell::render))?;
            }
            writer.flush()?;
            Ok(())
        })?;
        trace_debug!(path = %self.path.display(), rows = ledger.len(), "ledger saved");
        Ok(())
    }
}
