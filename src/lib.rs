#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Sequential experiment design from the command line.
//!
//! An operator keeps a ledger of trials (parameter settings plus measured
//! outputs) and asks an optimizer where to sample next. The optimizer starts
//! with a space-filling Sobol batch and switches to Gaussian-process guided
//! suggestions once outputs are recorded. Ledger and optimizer are persisted
//! after every action and reconciled on every start, with the ledger as the
//! source of truth.
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ExperimentConfig`] | Parameters, objectives, constraints and column layout read from a directory of CSV sheets. |
//! | [`ColumnSchema`](schema::ColumnSchema) | Derives the canonical column order of the ledger. |
//! | [`Ledger`] | The trial table; stored by a [`LedgerStore`](storage::LedgerStore). |
//! | [`Engine`](engine::Engine) | The optimizer boundary; [`NativeEngine`](engine::NativeEngine) is the built-in implementation. |
//! | [`Client`](client::Client) | Creates, restores and persists the live engine. |
//! | [`replay_ledger`](reconcile::replay_ledger) | Attaches recorded trials to a new or restored engine. |
//! | [`Session`](session::Session) | The interactive menu loop. |
//!
//! # Getting Started
//!
//! ```
//! use seqdesign::engine::{Engine, Experiment, GenerationStrategy, NativeEngine};
//! use seqdesign::{ObjectiveDef, ParameterDef};
//!
//! let experiment = Experiment {
//!     name: "reactor".to_string(),
//!     parameters: vec![ParameterDef::new("temp", 0.0, 10.0).digits(1)],
//!     objectives: vec![ObjectiveDef::new("yield", false)],
//!     constraints: Vec::new(),
//! };
//! let mut engine =
//!     NativeEngine::declare(experiment, GenerationStrategy::sobol_then_model(Some(42), 3))
//!         .unwrap();
//! let arms = engine.generate_batch(3).unwrap();
//! assert_eq!(arms.len(), 3);
//! ```
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at declaration, generation, replay and persistence | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod client;
pub mod config;
pub mod engine;
mod error;
pub mod ledger;
pub mod reconcile;
pub mod schema;
pub mod session;
pub mod storage;
mod types;

pub use config::{ExperimentConfig, ObjectiveDef, ParameterConstraint, ParameterDef, ValueType};
pub use error::{Error, Result};
pub use ledger::{Cell, Ledger};
pub use types::{Direction, ObjectiveValues, ParamMap, TrialId, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use seqdesign::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{Client, Phase, SobolRequest};
    pub use crate::config::{
        ExperimentConfig, ObjectiveDef, ParameterConstraint, ParameterDef, ValueType,
    };
    pub use crate::engine::{
        ArmSummary, Engine, Experiment, GenerationStep, GenerationStrategy, GpSettings, Model,
        NativeEngine, TrialSummary,
    };
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{Cell, Ledger};
    pub use crate::reconcile::{ReplayReport, normalize, replay_ledger};
    pub use crate::schema::{ColumnSchema, ColumnType};
    pub use crate::session::{Console, GenerateRequest, ScriptedConsole, Session, StdConsole};
    pub use crate::storage::{CsvLedgerStore, LedgerStore, MemoryLedgerStore, SnapshotFile};
    pub use crate::types::{Direction, ObjectiveValues, ParamMap, TrialId, TrialState};
}
