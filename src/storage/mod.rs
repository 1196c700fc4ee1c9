//! Ledger and snapshot persistence.
//!
//! The [`LedgerStore`] trait defines how the trial table is loaded and saved.
//! Loading always conforms the table to the current configuration: every
//! required column is present (missing cells where it was added) and columns
//! are ordered by [`ColumnSchema::resolve`]. Column order is therefore never
//! stored separately; it is re-derived on every load.
//!
//! # Available backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`CsvLedgerStore`] | A single CSV file, replaced atomically on save |
//! | [`MemoryLedgerStore`] | A table behind a read-write lock, for tests and embedding |
//!
//! The engine snapshot is kept separately in a [`SnapshotFile`].

mod csv_ledger;
mod memory;
mod snapshot;

use std::io::Write;
use std::path::{Path, PathBuf};

pub use csv_ledger::CsvLedgerStore;
pub use memory::MemoryLedgerStore;
pub use snapshot::SnapshotFile;

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::schema::ColumnSchema;

/// Trait for loading and saving the trial table.
pub trait LedgerStore {
    /// Load the table, conformed to `config`. A store that holds nothing yet
    /// yields an empty table with exactly the required columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if the backing
    /// resource exists but cannot be read.
    fn load(&self, config: &ExperimentConfig) -> Result<Ledger>;

    /// Replace the stored table with `ledger`, row order included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if writing fails.
    fn save(&self, ledger: &Ledger) -> Result<()>;
}

/// Add every required column and apply the canonical column order.
pub(crate) fn conform(mut ledger: Ledger, config: &ExperimentConfig) -> Ledger {
    let schema = ColumnSchema::from_config(config);
    for column in schema.required_columns() {
        ledger.ensure_column(&column);
    }
    let order = schema.resolve(ledger.columns());
    ledger.reorder(&order);
    ledger
}

/// Write through a temp file in the same directory, then rename over `path`,
/// so a crash mid-write never leaves a truncated file behind.
pub(crate) fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut std::fs::File) -> Result<()>,
) -> Result<()> {
    let tmp_path = temp_path(path);
    let mut file = std::fs::File::create(&tmp_path)?;
    write(&mut file)?;
    file.flush()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObjectiveDef, ParameterDef};
    use crate::ledger::Cell;

    #[test]
    fn temp_file_sits_next_to_target() {
        let tmp = temp_path(Path::new("/data/run/experiment_data.csv"));
        assert_eq!(tmp, PathBuf::from("/data/run/.experiment_data.csv.tmp"));
    }

    #[test]
    fn conform_adds_required_and_keeps_unknown_columns() {
        let config = ExperimentConfig {
            parameters: vec![ParameterDef::new("temp", 0.0, 10.0)],
            objectives: vec![ObjectiveDef::new("yield", true)],
            ..ExperimentConfig::default()
        };
        let ledger = Ledger::from_rows(
            vec!["notes".to_string(), "temp".to_string()],
            vec![vec![Cell::Text("first".to_string()), Cell::Number(1.5)]],
        );
        let ledger = conform(ledger, &config);
        assert_eq!(ledger.columns(), ["trial_index", "temp", "yield", "notes"]);
        assert_eq!(ledger.get(0, "yield"), &Cell::Missing);
        assert_eq!(ledger.get(0, "notes"), &Cell::Text("first".to_string()));
    }
}
