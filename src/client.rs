//! Creating, restoring and persisting the live engine.
//!
//! A [`Client`] starts [`Phase::Absent`] and is brought to life by
//! [`Client::ensure`] through one of three paths:
//!
//! | Path | When | What happens |
//! |------|------|--------------|
//! | Sobol | no snapshot on disk and a [`SobolRequest`] | declare with `count` Sobol arms then the model phase, replay the ledger, save the snapshot |
//! | Reload | a snapshot exists | restore it, forget its trials, replay the ledger, switch to the model phase only |
//! | Fresh | neither | declare model-only, replay the ledger, save the snapshot |
//!
//! Once an engine is live every further call is a no-op.

use crate::config::ExperimentConfig;
use crate::engine::{Engine, Experiment, GenerationStrategy};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::reconcile::{ReplayReport, replay_ledger};
use crate::storage::SnapshotFile;

/// Name under which experiments are declared.
pub const EXPERIMENT_NAME: &str = "seqdesign";

/// Lifecycle state of the [`Client`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No engine yet.
    Absent,
    /// Declared with a Sobol step that is followed by the model phase.
    Sobol,
    /// Model-based generation only.
    Model,
}

/// Seed and size of the initial quasi-random phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SobolRequest {
    pub seed: Option<u64>,
    pub count: usize,
}

/// Holder of the one live engine of a session.
pub struct Client<E> {
    engine: Option<E>,
    phase: Phase,
    replay: ReplayReport,
}

impl<E> Default for Client<E> {
    fn default() -> Self {
        Self {
            engine: None,
            phase: Phase::Absent,
            replay: ReplayReport::default(),
        }
    }
}

impl<E: Engine> Client<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// The replay that brought the engine to life. Empty before
    /// [`ensure`](Self::ensure) has run.
    #[must_use]
    pub fn replay(&self) -> &ReplayReport {
        &self.replay
    }

    /// Make sure an engine is live and return it.
    ///
    /// `sobol` is only consulted when no engine is live and no snapshot
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyRequest`] for a Sobol request of zero arms,
    /// propagates snapshot, declaration and replay errors.
    pub fn ensure(
        &mut self,
        ledger: &Ledger,
        config: &ExperimentConfig,
        sobol: Option<SobolRequest>,
        snapshot: &SnapshotFile,
    ) -> Result<&mut E> {
        if self.engine.is_none() {
            let (engine, phase, replay) = build(ledger, config, sobol, snapshot)?;
            self.phase = phase;
            self.replay = replay;
            self.engine = Some(engine);
        }
        self.engine.as_mut().ok_or(Error::Internal("engine missing after ensure"))
    }
}

fn build<E: Engine>(
    ledger: &Ledger,
    config: &ExperimentConfig,
    sobol: Option<SobolRequest>,
    snapshot: &SnapshotFile,
) -> Result<(E, Phase, ReplayReport)> {
    if snapshot.exists() {
        let mut engine: E = snapshot.load()?;
        engine.clear_trials();
        let replay = replay_ledger(&mut engine, ledger, config)?;
        engine.set_generation_strategy(GenerationStrategy::model_only());
        trace_info!(attached = replay.attached, "client reloaded from snapshot");
        return Ok((engine, Phase::Model, replay));
    }

    let experiment = Experiment::from_config(EXPERIMENT_NAME, config);
    let (strategy, phase) = match sobol {
        Some(SobolRequest { count: 0, .. }) => return Err(Error::EmptyRequest),
        Some(SobolRequest { seed, count }) => {
            (GenerationStrategy::sobol_then_model(seed, count), Phase::Sobol)
        }
        None => (GenerationStrategy::model_only(), Phase::Model),
    };
    let mut engine = E::declare(experiment, strategy)?;
    let replay = replay_ledger(&mut engine, ledger, config)?;
    snapshot.save(&engine)?;
    trace_info!(?phase, "client declared");
    Ok((engine, phase, replay))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{ObjectiveDef, ParameterDef};
    use crate::engine::{Model, NativeEngine};
    use crate::ledger::Cell;
    use crate::storage::{LedgerStore, MemoryLedgerStore};
    use crate::types::TrialId;

    fn snapshot(tag: &str) -> SnapshotFile {
        use core::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir: PathBuf = std::env::temp_dir().join(format!(
            "seqdesign_client_test_{tag}_{}_{id}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        SnapshotFile::new(dir.join("engine_snapshot.json"))
    }

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            parameters: vec![ParameterDef::new("temp", 0.0, 10.0).digits(1)],
            objectives: vec![ObjectiveDef::new("yield", true)],
            ..ExperimentConfig::default()
        }
    }

    fn ledger_with(rows: &[(f64, Option<f64>)]) -> Ledger {
        let mut ledger = MemoryLedgerStore::new().load(&config()).unwrap();
        for (i, (temp, yield_)) in rows.iter().enumerate() {
            let params = [("temp".to_string(), *temp)].into_iter().collect();
            let row = ledger.append_trial(&params, &TrialId::Index(i as u64));
            if let Some(y) = yield_ {
                ledger.set(row, "yield", Cell::Number(*y)).unwrap();
            }
        }
        ledger
    }

    #[test]
    fn sobol_path_declares_and_persists() {
        let snapshot = snapshot("sobol");
        let mut client = Client::<NativeEngine>::new();
        assert_eq!(client.phase(), Phase::Absent);

        let request = SobolRequest {
            seed: Some(42),
            count: 3,
        };
        let engine = client
            .ensure(&Ledger::default(), &config(), Some(request), &snapshot)
            .unwrap();
        assert_eq!(
            engine.strategy().steps[0].model,
            Model::Sobol { seed: Some(42) }
        );
        assert_eq!(client.phase(), Phase::Sobol);
        assert!(snapshot.exists());
    }

    #[test]
    fn live_engine_makes_ensure_a_no_op() {
        let snapshot = snapshot("noop");
        let mut client = Client::<NativeEngine>::new();
        client.ensure(&Ledger::default(), &config(), None, &snapshot).unwrap();
        let ledger = ledger_with(&[(1.0, Some(2.0))]);
        let engine = client.ensure(&ledger, &config(), None, &snapshot).unwrap();
        assert!(engine.trials().is_empty());
    }

    #[test]
    fn fresh_path_replays_and_is_model_only() {
        let snapshot = snapshot("fresh");
        let ledger = ledger_with(&[(1.0, Some(2.0)), (3.0, None)]);
        let mut client = Client::<NativeEngine>::new();
        let engine = client.ensure(&ledger, &config(), None, &snapshot).unwrap();
        assert_eq!(engine.trials().len(), 2);
        assert_eq!(engine.strategy(), &GenerationStrategy::model_only());
        assert_eq!(client.phase(), Phase::Model);
        assert_eq!(client.replay().completed, 1);
        assert!(snapshot.exists());
    }

    #[test]
    fn reload_path_does_not_duplicate_trials() {
        let snapshot = snapshot("reload");
        let ledger = ledger_with(&[(1.0, Some(2.0)), (3.0, None)]);
        let mut first = Client::<NativeEngine>::new();
        first.ensure(&ledger, &config(), None, &snapshot).unwrap();

        let mut second = Client::<NativeEngine>::new();
        let sobol = SobolRequest {
            seed: Some(1),
            count: 5,
        };
        let engine = second.ensure(&ledger, &config(), Some(sobol), &snapshot).unwrap();
        assert_eq!(engine.trials().len(), 2);
        assert_eq!(engine.strategy(), &GenerationStrategy::model_only());
        assert_eq!(second.phase(), Phase::Model);
        assert_eq!(
            second.replay().engine_id(&TrialId::Index(1)),
            Some(TrialId::Index(1))
        );
    }

    #[test]
    fn zero_sobol_count_is_rejected() {
        let snapshot = snapshot("zero");
        let mut client = Client::<NativeEngine>::new();
        let request = SobolRequest {
            seed: None,
            count: 0,
        };
        let err = client
            .ensure(&Ledger::default(), &config(), Some(request), &snapshot)
            .err();
        assert!(matches!(err, Some(Error::EmptyRequest)));
        assert_eq!(client.phase(), Phase::Absent);
        assert!(!snapshot.exists());
    }
}
