//! Replaying the ledger into an engine.
//!
//! The ledger is the source of truth: whenever an engine is built or
//! restored, every row with a full parameter set is attached to it, and rows
//! whose objectives are all recorded are completed right away.
//!
//! Rows with only some objectives recorded are attached and left running;
//! partial completion is never attempted. Parameter values are floored to one
//! decimal with [`normalize`] before they reach the engine.
//!
//! Engine identifiers of replayed trials need not match the ledger's
//! `trial_index`. After a replay the engine reserves every trial number above
//! the largest one in the ledger, so identifiers it hands out later never
//! collide with a ledger row.

use std::collections::{HashMap, HashSet};

use crate::config::ExperimentConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::types::TrialId;

/// Floor `v` to one decimal place.
///
/// Values that are already on the 0.1 grid up to floating-point noise stay
/// where they are, so `normalize(normalize(v)) == normalize(v)`.
#[must_use]
pub fn normalize(v: f64) -> f64 {
    if !v.is_finite() {
        return v;
    }
    let scaled = v * 10.0;
    let nearest = scaled.round();
    let steps = if (scaled - nearest).abs() <= 4.0 * f64::EPSILON * scaled.abs().max(1.0) {
        nearest
    } else {
        scaled.floor()
    };
    steps / 10.0
}

/// Outcome of [`replay_ledger`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplayReport {
    /// Rows attached to the engine.
    pub attached: usize,
    /// Attached rows that were also completed.
    pub completed: usize,
    /// Rows skipped because a parameter value is missing.
    pub skipped: usize,
    /// Engine identifier for every replayed row that carries a `trial_index`.
    pub ids: HashMap<TrialId, TrialId>,
    /// `trial_index` values of skipped rows; the engine has no trial for them.
    pub unreplayed: HashSet<TrialId>,
}

impl ReplayReport {
    /// The engine identifier for a ledger `trial_index`.
    ///
    /// Replayed rows map through [`ids`](Self::ids), identifiers handed out
    /// after the replay map to themselves and rows the replay skipped have
    /// none.
    #[must_use]
    pub fn engine_id(&self, local: &TrialId) -> Option<TrialId> {
        if let Some(id) = self.ids.get(local) {
            return Some(id.clone());
        }
        if self.unreplayed.contains(local) {
            return None;
        }
        Some(local.clone())
    }
}

/// Attach every complete ledger row to `engine`.
///
/// Constraint and bound enforcement is switched off for the replay, so
/// historical rows recorded under older settings still attach, and is
/// restored to its previous state afterwards, also on error.
///
/// # Errors
///
/// Returns [`Error::InvalidCell`](crate::Error::InvalidCell) for non-numeric
/// parameter or objective cells and propagates engine errors.
pub fn replay_ledger<E: Engine>(
    engine: &mut E,
    ledger: &Ledger,
    config: &ExperimentConfig,
) -> Result<ReplayReport> {
    let previous = engine.set_constraint_enforcement(false);
    let result = replay_rows(engine, ledger, config);
    engine.set_constraint_enforcement(previous);

    if let Ok(report) = &result {
        trace_info!(
            attached = report.attached,
            completed = report.completed,
            skipped = report.skipped,
            "ledger replayed"
        );
    }
    result
}

fn replay_rows<E: Engine>(
    engine: &mut E,
    ledger: &Ledger,
    config: &ExperimentConfig,
) -> Result<ReplayReport> {
    let parameters = config.parameter_names();
    let objectives = config.objective_names();
    let mut report = ReplayReport::default();

    let mut next_free: Option<u64> = None;
    for row in 0..ledger.len() {
        let local = ledger.trial_id(row);
        if let Some(number) = local.as_ref().and_then(TrialId::trial_number) {
            next_free = next_free.max(Some(number.saturating_add(1)));
        }

        let Some(mut params) = ledger.numeric_values(row, &parameters)? else {
            trace_debug!(row, "skipping row with missing parameters");
            report.skipped += 1;
            if let Some(local) = local {
                report.unreplayed.insert(local);
            }
            continue;
        };
        for value in params.values_mut() {
            *value = normalize(*value);
        }

        let id = engine.attach_trial(&params)?;
        report.attached += 1;

        if let Some(values) = ledger.numeric_values(row, &objectives)? {
            engine.complete_trial(&id, &values)?;
            report.completed += 1;
        }
        if let Some(local) = local {
            report.unreplayed.remove(&local);
            report.ids.insert(local, id);
        }
    }
    if let Some(next) = next_free {
        engine.reserve_trial_indices(next);
    }
    Ok(report)
}
