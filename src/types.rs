//! Core types shared by the ledger, the engine and the session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The direction of optimization for one objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Minimize the objective value.
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Map the configured `minimize` flag to a direction.
    #[must_use]
    pub fn from_minimize(minimize: bool) -> Self {
        if minimize {
            Direction::Minimize
        } else {
            Direction::Maximize
        }
    }
}

/// The state of an engine-side trial in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// Parameters are known, outputs are still outstanding.
    Running,
    /// Every arm of the trial has recorded objective values.
    Complete,
}

impl core::fmt::Display for TrialState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TrialState::Running => write!(f, "RUNNING"),
            TrialState::Complete => write!(f, "COMPLETED"),
        }
    }
}

/// Identifier the engine hands out for a trial.
///
/// Single-generation and attached trials are addressed by their integer index.
/// Arms of a batch trial are addressed by their `"<trial>_<arm>"` label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialId {
    /// An integer trial index.
    Index(u64),
    /// A batch arm label.
    Arm(String),
}

impl TrialId {
    /// Interpret the text of a ledger `trial_index` cell.
    ///
    /// Integer text (including `"3.0"`) becomes [`TrialId::Index`], anything
    /// else is treated as an arm label. Returns `None` for blank text.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(index) = text.parse::<u64>() {
            return Some(TrialId::Index(index));
        }
        if let Ok(value) = text.parse::<f64>()
            && value >= 0.0
            && value.fract() == 0.0
        {
            return Some(TrialId::Index(value as u64));
        }
        Some(TrialId::Arm(text.to_string()))
    }

    /// The trial number this identifier belongs to: the index itself, or the
    /// `<trial>` prefix of an `"<trial>_<arm>"` label. `None` for labels of
    /// any other shape.
    #[must_use]
    pub fn trial_number(&self) -> Option<u64> {
        match self {
            TrialId::Index(index) => Some(*index),
            TrialId::Arm(label) => label.split_once('_')?.0.parse().ok(),
        }
    }
}

impl core::fmt::Display for TrialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TrialId::Index(index) => write!(f, "{index}"),
            TrialId::Arm(name) => write!(f, "{name}"),
        }
    }
}

/// Parameter values keyed by parameter name.
pub type ParamMap = BTreeMap<String, f64>;

/// Objective values keyed by objective name.
pub type ObjectiveValues = BTreeMap<String, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_integer_index() {
        assert_eq!(TrialId::parse("7"), Some(TrialId::Index(7)));
        assert_eq!(TrialId::parse("7.0"), Some(TrialId::Index(7)));
    }

    #[test]
    fn parse_arm_label() {
        assert_eq!(TrialId::parse("0_3"), Some(TrialId::Arm("0_3".into())));
        assert_eq!(TrialId::parse(" "), None);
    }

    #[test]
    fn trial_number_of_indices_and_labels() {
        assert_eq!(TrialId::Index(4).trial_number(), Some(4));
        assert_eq!(TrialId::Arm("12_3".into()).trial_number(), Some(12));
        assert_eq!(TrialId::Arm("batch".into()).trial_number(), None);
        assert_eq!(TrialId::Arm("x_1".into()).trial_number(), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for id in [TrialId::Index(12), TrialId::Arm("4_1".into())] {
            assert_eq!(TrialId::parse(&id.to_string()), Some(id));
        }
    }
}
