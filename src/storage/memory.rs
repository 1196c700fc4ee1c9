use parking_lot::RwLock;

use super::{LedgerStore, conform};
use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::ledger::Ledger;

/// In-memory ledger store.
///
/// A thin wrapper around `RwLock<Option<Ledger>>`; `None` behaves like a
/// ledger file that does not exist yet.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: RwLock<Option<Ledger>>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `ledger`.
    #[must_use]
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: RwLock::new(Some(ledger)),
        }
    }

    /// The last saved table, as saved.
    #[must_use]
    pub fn contents(&self) -> Option<Ledger> {
        self.ledger.read().clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self, config: &ExperimentConfig) -> Result<Ledger> {
        let ledger = self.ledger.read().clone().unwrap_or_default();
        Ok(conform(ledger, config))
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        *self.ledger.write() = Some(ledger.clone());
        Ok(())
    }
}
