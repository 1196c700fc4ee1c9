//! The optimization engine boundary.
//!
//! Everything that decides *where* to sample next lives behind the
//! [`Engine`] trait: the declared search space, the objectives, the
//! generation strategy and the engine's own trial ledger. The session and the
//! reconciliation code only talk to this trait, so a test double or a
//! different backend can replace [`NativeEngine`] without touching them.
//!
//! # Generation strategy
//!
//! A [`GenerationStrategy`] is an ordered list of [`GenerationStep`]s. Each
//! generated arm is drawn by the first step whose quota is not yet used up:
//!
//! ```
//! use seqdesign::engine::GenerationStrategy;
//!
//! // 8 Sobol arms, then Gaussian-process guided sampling forever.
//! let strategy = GenerationStrategy::sobol_then_model(Some(42), 8);
//! assert_eq!(strategy.steps.len(), 2);
//!
//! // Model-based only.
//! let strategy = GenerationStrategy::model_only();
//! assert_eq!(strategy.steps.len(), 1);
//! ```

pub mod constraint;
mod gp;
mod native;
mod sobol;

use serde::{Deserialize, Serialize};

pub use native::{GpSettings, NativeEngine};

use crate::config::{ExperimentConfig, ObjectiveDef, ParameterConstraint, ParameterDef};
use crate::error::Result;
use crate::types::{ObjectiveValues, ParamMap, TrialId, TrialState};

/// Search space and objectives handed to [`Engine::declare`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub parameters: Vec<ParameterDef>,
    pub objectives: Vec<ObjectiveDef>,
    pub constraints: Vec<ParameterConstraint>,
}

impl Experiment {
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &ExperimentConfig) -> Self {
        Self {
            name: name.into(),
            parameters: config.parameters.clone(),
            objectives: config.objectives.clone(),
            constraints: config.constraints.clone(),
        }
    }
}

/// The model a generation step samples with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    /// Scrambled Sobol quasi-random points. `None` draws a seed when the
    /// experiment is declared.
    Sobol { seed: Option<u64> },
    /// Gaussian-process surrogate with Expected Improvement.
    Gp,
}

/// One phase of a [`GenerationStrategy`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStep {
    pub model: Model,
    /// Number of arms this step produces; `None` means unbounded.
    pub num_trials: Option<usize>,
}

/// Ordered generation phases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStrategy {
    pub steps: Vec<GenerationStep>,
}

impl GenerationStrategy {
    /// `count` Sobol arms (skipped when `count` is zero), then the model phase.
    #[must_use]
    pub fn sobol_then_model(seed: Option<u64>, count: usize) -> Self {
        let mut steps = Vec::with_capacity(2);
        if count > 0 {
            steps.push(GenerationStep {
                model: Model::Sobol { seed },
                num_trials: Some(count),
            });
        }
        steps.push(GenerationStep {
            model: Model::Gp,
            num_trials: None,
        });
        Self { steps }
    }

    /// A single unbounded model-based step.
    #[must_use]
    pub fn model_only() -> Self {
        Self::sobol_then_model(None, 0)
    }
}

/// One arm as reported by [`Engine::trials`].
#[derive(Clone, Debug, PartialEq)]
pub struct ArmSummary {
    pub name: String,
    pub params: ParamMap,
}

/// One engine-side trial as reported by [`Engine::trials`].
#[derive(Clone, Debug, PartialEq)]
pub struct TrialSummary {
    pub index: u64,
    pub state: TrialState,
    pub arms: Vec<ArmSummary>,
}

/// A pluggable optimization engine.
///
/// Implementations own the search space, the objectives, the generation
/// strategy and their own record of attached and completed trials. Their
/// serialized form is opaque to callers.
pub trait Engine {
    /// Declare a new experiment.
    ///
    /// # Errors
    ///
    /// Returns an error if the search space, objectives or constraint strings
    /// are invalid.
    fn declare(experiment: Experiment, strategy: GenerationStrategy) -> Result<Self>
    where
        Self: Sized;

    /// Attach a trial with operator-chosen parameters; it starts running.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing or unknown, or if an
    /// enforced constraint is violated.
    fn attach_trial(&mut self, params: &ParamMap) -> Result<TrialId>;

    /// Record objective values for a trial or a single batch arm.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown identifiers or objective names.
    fn complete_trial(&mut self, id: &TrialId, values: &ObjectiveValues) -> Result<()>;

    /// Generate `n` single-arm trials, identified by trial index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataRequired`](crate::Error::DataRequired) when the
    /// model phase has no completed trial to fit.
    fn next_trials(&mut self, n: usize) -> Result<Vec<(TrialId, ParamMap)>>;

    /// Generate one batch trial with `n` arms, identified by arm label.
    ///
    /// # Errors
    ///
    /// Same as [`next_trials`](Self::next_trials).
    fn generate_batch(&mut self, n: usize) -> Result<Vec<(TrialId, ParamMap)>>;

    /// Replace the generation strategy for all future generation.
    fn set_generation_strategy(&mut self, strategy: GenerationStrategy);

    /// Switch constraint and bound checks on attached trials on or off.
    /// Returns the previous setting so callers can restore it.
    fn set_constraint_enforcement(&mut self, enabled: bool) -> bool;

    /// Forget every attached and generated trial.
    fn clear_trials(&mut self);

    /// Hand out no trial index below `next` from now on, so new trials never
    /// reuse an identifier the ledger already holds. Cleared by
    /// [`clear_trials`](Self::clear_trials).
    fn reserve_trial_indices(&mut self, next: u64);

    /// Every trial the engine knows about, in index order.
    fn trials(&self) -> Vec<TrialSummary>;

    /// Serialize the full engine state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`](crate::Error::Snapshot) if serialization fails.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Rebuild an engine from [`snapshot`](Self::snapshot) output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Snapshot`](crate::Error::Snapshot) for corrupt or
    /// incompatible snapshots.
    fn restore(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}
