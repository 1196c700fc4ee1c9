//! Column layout of the ledger.
//!
//! The layout is a pure function of the configuration and the columns the
//! ledger currently holds. It is recomputed on every load and never stored,
//! so the order on disk always follows the current configuration.

use std::collections::HashSet;

use crate::config::ExperimentConfig;

/// Name of the bookkeeping column holding the engine trial identifier.
pub const TRIAL_INDEX: &str = "trial_index";

/// Category of a ledger column, used only for ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    TrialIndex,
    /// Fixed parameters (`feste_parameter`).
    FixedParameter,
    Parameters,
    Objectives,
    Info,
}

/// Order used when the configuration names no column types.
pub const DEFAULT_COLUMN_TYPE_ORDER: [ColumnType; 5] = [
    ColumnType::TrialIndex,
    ColumnType::FixedParameter,
    ColumnType::Parameters,
    ColumnType::Objectives,
    ColumnType::Info,
];

impl ColumnType {
    /// Parse a `Spaltentyp` label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "trial_index" => Some(ColumnType::TrialIndex),
            "feste_parameter" => Some(ColumnType::FixedParameter),
            "parameters" => Some(ColumnType::Parameters),
            "objectives" => Some(ColumnType::Objectives),
            "info" => Some(ColumnType::Info),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ColumnType::TrialIndex => "trial_index",
            ColumnType::FixedParameter => "feste_parameter",
            ColumnType::Parameters => "parameters",
            ColumnType::Objectives => "objectives",
            ColumnType::Info => "info",
        }
    }
}

/// Names grouped by column type, as needed to classify a column.
#[derive(Clone, Debug, Default)]
pub struct ColumnSchema {
    pub parameters: Vec<String>,
    pub objectives: Vec<String>,
    pub fixed: Vec<String>,
    pub info: Vec<String>,
    pub type_order: Vec<ColumnType>,
}

impl ColumnSchema {
    #[must_use]
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            parameters: config.parameters.iter().map(|p| p.name.clone()).collect(),
            objectives: config.objectives.iter().map(|o| o.name.clone()).collect(),
            fixed: config.fixed_columns.clone(),
            info: config.info_columns.clone(),
            type_order: config.column_type_order.clone(),
        }
    }

    /// Classify a column. Precedence: trial index, fixed, parameter,
    /// objective, info. Columns matching none of them are unclassified.
    #[must_use]
    pub fn classify(&self, column: &str) -> Option<ColumnType> {
        let has = |names: &[String]| names.iter().any(|n| n == column);
        if column == TRIAL_INDEX {
            Some(ColumnType::TrialIndex)
        } else if has(&self.fixed) {
            Some(ColumnType::FixedParameter)
        } else if has(&self.parameters) {
            Some(ColumnType::Parameters)
        } else if has(&self.objectives) {
            Some(ColumnType::Objectives)
        } else if has(&self.info) {
            Some(ColumnType::Info)
        } else {
            None
        }
    }

    /// Whether cells of `column` are read as numbers: parameters, objectives
    /// and the trial index. Everything else is kept as text.
    #[must_use]
    pub fn is_numeric(&self, column: &str) -> bool {
        matches!(
            self.classify(column),
            Some(ColumnType::TrialIndex | ColumnType::Parameters | ColumnType::Objectives)
        )
    }

    /// Every column the ledger must hold.
    #[must_use]
    pub fn required_columns(&self) -> Vec<String> {
        let mut columns = self.parameters.clone();
        columns.extend(self.objectives.iter().cloned());
        columns.push(TRIAL_INDEX.to_string());
        columns.extend(self.info.iter().cloned());
        columns.extend(self.fixed.iter().cloned());
        columns
    }

    /// Canonical order over `existing` plus every required column.
    ///
    /// For each type in `type_order` its columns are emitted alphabetically.
    /// Unclassified columns, and columns whose type the order does not
    /// mention, follow alphabetically at the end. Nothing is dropped.
    #[must_use]
    pub fn resolve<S: AsRef<str>>(&self, existing: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut all: Vec<String> = Vec::new();
        for column in existing
            .iter()
            .map(|c| c.as_ref().to_string())
            .chain(self.required_columns())
        {
            if seen.insert(column.clone()) {
                all.push(column);
            }
        }

        let mut ordered = Vec::with_capacity(all.len());
        let mut emitted = HashSet::new();
        for column_type in &self.type_order {
            if !emitted.insert(*column_type) {
                continue;
            }
            let mut group: Vec<&String> = all
                .iter()
                .filter(|c| self.classify(c) == Some(*column_type))
                .collect();
            group.sort();
            ordered.extend(group.into_iter().cloned());
        }

        let mut rest: Vec<&String> = all
            .iter()
            .filter(|c| {
                self.classify(c)
                    .is_none_or(|t| !self.type_order.contains(&t))
            })
            .collect();
        rest.sort();
        ordered.extend(rest.into_iter().cloned());
        ordered
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn schema(order: Vec<ColumnType>) -> ColumnSchema {
        ColumnSchema {
            parameters: vec!["temp".into(), "sugar".into()],
            objectives: vec!["yield".into()],
            fixed: vec!["vessel".into()],
            info: vec!["note".into()],
            type_order: order,
        }
    }

    #[test]
    fn default_order_groups_and_sorts() {
        let s = schema(DEFAULT_COLUMN_TYPE_ORDER.to_vec());
        let columns = s.resolve::<&str>(&[]);
        assert_eq!(
            columns,
            vec!["trial_index", "vessel", "sugar", "temp", "yield", "note"]
        );
    }

    #[test]
    fn unknown_columns_are_kept_at_the_end() {
        let s = schema(DEFAULT_COLUMN_TYPE_ORDER.to_vec());
        let columns = s.resolve(&["zeta", "old_param", "temp"]);
        assert_eq!(
            columns,
            vec![
                "trial_index",
                "vessel",
                "sugar",
                "temp",
                "yield",
                "note",
                "old_param",
                "zeta"
            ]
        );
    }

    #[test]
    fn types_missing_from_order_go_to_the_rest() {
        let s = schema(vec![
            ColumnType::TrialIndex,
            ColumnType::Parameters,
            ColumnType::Objectives,
        ]);
        let columns = s.resolve(&["extra"]);
        assert_eq!(
            columns,
            vec!["trial_index", "sugar", "temp", "yield", "extra", "note", "vessel"]
        );
    }

    #[test]
    fn fixed_wins_over_parameter_on_name_clash() {
        let mut s = schema(DEFAULT_COLUMN_TYPE_ORDER.to_vec());
        s.fixed.push("temp".into());
        assert_eq!(s.classify("temp"), Some(ColumnType::FixedParameter));
    }

    #[test]
    fn only_engine_columns_are_numeric() {
        let s = schema(DEFAULT_COLUMN_TYPE_ORDER.to_vec());
        for column in ["trial_index", "temp", "yield"] {
            assert!(s.is_numeric(column), "{column}");
        }
        for column in ["vessel", "note", "unknown"] {
            assert!(!s.is_numeric(column), "{column}");
        }
    }

    #[test]
    fn labels_round_trip() {
        for t in DEFAULT_COLUMN_TYPE_ORDER {
            assert_eq!(ColumnType::from_label(t.label()), Some(t));
        }
    }

    proptest! {
        #[test]
        fn resolve_is_pure_and_sorted_within_types(
            existing in proptest::collection::vec("[a-z]{1,6}", 0..8),
        ) {
            let s = schema(DEFAULT_COLUMN_TYPE_ORDER.to_vec());
            let first = s.resolve(&existing);
            prop_assert_eq!(&first, &s.resolve(&existing));

            for column in existing.iter().chain(&s.required_columns()) {
                prop_assert!(first.contains(column));
            }
            let types: Vec<Option<ColumnType>> =
                first.iter().map(|c| s.classify(c)).collect();
            for (pair, names) in types.windows(2).zip(first.windows(2)) {
                if pair[0] == pair[1] {
                    prop_assert!(names[0] < names[1], "{:?} out of order", names);
                }
            }
        }
    }
}
