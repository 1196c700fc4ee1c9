use std::path::PathBuf;

/// Errors produced while loading configuration, persisting the ledger or
/// snapshot, and driving the optimization engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the configuration directory does not exist.
    #[error("configuration not found at '{}'", path.display())]
    MissingConfig {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// Returned when a configuration sheet holds a value that cannot be interpreted.
    #[error("invalid configuration in sheet '{sheet}': {reason}")]
    InvalidConfig {
        /// The sheet (file stem) the value came from.
        sheet: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Returned when a search space cannot be declared.
    #[error("invalid search space: {0}")]
    InvalidSearchSpace(String),

    /// Returned when a parameter constraint string cannot be parsed or
    /// references an unknown parameter.
    #[error("invalid parameter constraint '{constraint}': {reason}")]
    InvalidConstraint {
        /// The constraint exactly as configured.
        constraint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Returned when an attached trial violates an enforced parameter constraint.
    #[error("parameters violate constraint '{0}'")]
    ConstraintViolated(String),

    /// Returned when a parameter value is missing or outside the declared bounds.
    #[error("parameter '{name}': {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: String,
        /// The reason for the rejection.
        reason: String,
    },

    /// Returned when a ledger cell that must be numeric holds text.
    #[error("ledger row {row}, column '{column}': '{text}' is not a number")]
    InvalidCell {
        /// Zero-based row position in the ledger.
        row: usize,
        /// The column name.
        column: String,
        /// The offending cell text.
        text: String,
    },

    /// Returned when completing a trial with values for unknown or missing objectives.
    #[error("objective mismatch: {0}")]
    ObjectiveMismatch(String),

    /// Returned when a trial or arm identifier is not known to the engine.
    #[error("unknown trial '{0}'")]
    UnknownTrial(String),

    /// Returned when the model-based phase is asked for candidates before any
    /// trial has recorded objective values.
    #[error("at least one trial with recorded outputs is required to fit the model")]
    DataRequired,

    /// Returned when every step of the generation strategy has used up its quota.
    #[error("generation strategy has no step left to draw from")]
    StrategyExhausted,

    /// Returned when a requested trial count is zero.
    #[error("trial count must be positive")]
    EmptyRequest,

    /// Returned when reading or writing a tabular file fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when an engine snapshot cannot be written or restored.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Returned when the operator input stream is closed mid-prompt.
    #[error("input closed")]
    InputClosed,

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
