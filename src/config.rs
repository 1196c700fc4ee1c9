//! Experiment configuration loaded from a directory of CSV sheets.
//!
//! Every sheet of the configuration workbook is a file `<sheet>.csv` inside
//! the configuration directory:
//!
//! | Sheet | Columns |
//! |-------|---------|
//! | `parameters` | `name`, `min_bound`, `max_bound`, `digits` |
//! | `objectives` | `name`, `minimize` |
//! | `parameter_constraints` | `constraint` |
//! | `Feste_Parameter` | `name` |
//! | `Informationspalten` | `name` |
//! | `ColumnTypeOrder` | `Spaltentyp` |
//!
//! Only the directory itself is mandatory. A missing sheet reads as an empty
//! sheet; an empty column type order falls back to
//! [`DEFAULT_COLUMN_TYPE_ORDER`](crate::schema::DEFAULT_COLUMN_TYPE_ORDER).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schema::{ColumnType, DEFAULT_COLUMN_TYPE_ORDER};
use crate::types::Direction;

pub const PARAMETERS_SHEET: &str = "parameters";
pub const OBJECTIVES_SHEET: &str = "objectives";
pub const CONSTRAINTS_SHEET: &str = "parameter_constraints";
pub const FIXED_PARAMETERS_SHEET: &str = "Feste_Parameter";
pub const INFO_COLUMNS_SHEET: &str = "Informationspalten";
pub const COLUMN_TYPE_ORDER_SHEET: &str = "ColumnTypeOrder";

/// Whether a parameter takes integer or floating-point values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    Int,
    Float,
}

impl ValueType {
    /// `digits == 0` means integer, everything else (including no digits) float.
    #[must_use]
    pub fn from_digits(digits: Option<u32>) -> Self {
        if digits == Some(0) {
            ValueType::Int
        } else {
            ValueType::Float
        }
    }
}

/// One row of the `parameters` sheet.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParameterDef {
    pub name: String,
    /// `(min, max)` when both bound columns are present in the sheet.
    pub bounds: Option<(f64, f64)>,
    /// Rounding precision in decimal places.
    pub digits: Option<u32>,
    pub value_type: ValueType,
}

impl ParameterDef {
    /// Creates a float parameter with the given bounds and no rounding.
    #[must_use]
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            bounds: Some((low, high)),
            digits: None,
            value_type: ValueType::Float,
        }
    }

    /// Sets the rounding precision and derives the value type from it.
    #[must_use]
    pub fn digits(mut self, digits: u32) -> Self {
        self.digits = Some(digits);
        self.value_type = ValueType::from_digits(Some(digits));
        self
    }
}

/// One row of the `objectives` sheet.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectiveDef {
    pub name: String,
    pub minimize: bool,
}

impl ObjectiveDef {
    #[must_use]
    pub fn new(name: impl Into<String>, minimize: bool) -> Self {
        Self {
            name: name.into(),
            minimize,
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::from_minimize(self.minimize)
    }
}

/// A linear inequality over parameters, kept verbatim.
///
/// The loader never parses it; the engine does so when the experiment is
/// declared.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParameterConstraint(pub String);

impl ParameterConstraint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything the configuration directory describes.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    pub parameters: Vec<ParameterDef>,
    pub objectives: Vec<ObjectiveDef>,
    pub constraints: Vec<ParameterConstraint>,
    /// Fixed-parameter columns (`Feste_Parameter`).
    pub fixed_columns: Vec<String>,
    /// Free-text information columns (`Informationspalten`).
    pub info_columns: Vec<String>,
    pub column_type_order: Vec<ColumnType>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            objectives: Vec::new(),
            constraints: Vec::new(),
            fixed_columns: Vec::new(),
            info_columns: Vec::new(),
            column_type_order: DEFAULT_COLUMN_TYPE_ORDER.to_vec(),
        }
    }
}

impl ExperimentConfig {
    /// Load every sheet from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] if `dir` does not exist and
    /// [`Error::InvalidConfig`] for malformed values or duplicate names.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::MissingConfig {
                path: dir.to_path_buf(),
            });
        }

        let config = Self {
            parameters: load_parameters(&Sheet::read(dir, PARAMETERS_SHEET)?)?,
            objectives: load_objectives(&Sheet::read(dir, OBJECTIVES_SHEET)?)?,
            constraints: Sheet::read(dir, CONSTRAINTS_SHEET)?
                .non_blank("constraint")
                .into_iter()
                .map(ParameterConstraint)
                .collect(),
            fixed_columns: Sheet::read(dir, FIXED_PARAMETERS_SHEET)?.non_blank("name"),
            info_columns: Sheet::read(dir, INFO_COLUMNS_SHEET)?.non_blank("name"),
            column_type_order: load_column_type_order(&Sheet::read(
                dir,
                COLUMN_TYPE_ORDER_SHEET,
            )?),
        };

        trace_info!(
            parameters = config.parameters.len(),
            objectives = config.objectives.len(),
            constraints = config.constraints.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parameter names in declaration order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    /// Objective names in declaration order.
    #[must_use]
    pub fn objective_names(&self) -> Vec<&str> {
        self.objectives.iter().map(|o| o.name.as_str()).collect()
    }

    /// Columns the ledger must contain.
    #[must_use]
    pub fn required_columns(&self) -> Vec<String> {
        crate::schema::ColumnSchema::from_config(self).required_columns()
    }
}

/// A sheet read into memory: trimmed headers plus raw cell text.
struct Sheet {
    name: &'static str,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.csv"))
    }

    fn read(dir: &Path, name: &'static str) -> Result<Self> {
        let path = Self::path(dir, name);
        if !path.exists() {
            trace_debug!(sheet = name, "sheet absent, using empty definitions");
            return Ok(Self {
                name,
                headers: Vec::new(),
                rows: Vec::new(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Cell text for `column` in every row; `None` when the column is absent.
    fn column(&self, column: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == column)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map_or("", String::as_str))
                .collect(),
        )
    }

    /// Non-blank values of `column`, in row order.
    fn non_blank(&self, column: &str) -> Vec<String> {
        self.column(column)
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !is_blank(v))
            .map(str::to_string)
            .collect()
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidConfig {
            sheet: self.name.to_string(),
            reason,
        }
    }
}

fn is_blank(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.eq_ignore_ascii_case("nan") || text == "<NA>"
}

fn load_parameters(sheet: &Sheet) -> Result<Vec<ParameterDef>> {
    let Some(names) = sheet.column("name") else {
        return Ok(Vec::new());
    };
    let with_bounds = sheet.has_column("min_bound") && sheet.has_column("max_bound");
    let lows = sheet.column("min_bound").unwrap_or_default();
    let highs = sheet.column("max_bound").unwrap_or_default();
    let digits = sheet.column("digits");

    let mut seen = HashSet::new();
    let mut parameters = Vec::new();
    for (row, name) in names.iter().enumerate() {
        if is_blank(name) {
            continue;
        }
        if !seen.insert(*name) {
            return Err(sheet.invalid(format!("duplicate parameter '{name}'")));
        }

        let bounds = if with_bounds {
            let low = parse_optional_f64(sheet, name, "min_bound", lows[row])?;
            let high = parse_optional_f64(sheet, name, "max_bound", highs[row])?;
            match (low, high) {
                (Some(low), Some(high)) if low > high => {
                    return Err(sheet.invalid(format!(
                        "parameter '{name}': min_bound {low} exceeds max_bound {high}"
                    )));
                }
                (Some(low), Some(high)) => Some((low, high)),
                _ => None,
            }
        } else {
            None
        };

        let digits = match &digits {
            Some(column) => parse_digits(sheet, name, column[row])?,
            None => None,
        };

        parameters.push(ParameterDef {
            name: (*name).to_string(),
            bounds,
            digits,
            value_type: ValueType::from_digits(digits),
        });
    }
    Ok(parameters)
}

fn parse_optional_f64(sheet: &Sheet, name: &str, column: &str, text: &str) -> Result<Option<f64>> {
    if is_blank(text) {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| sheet.invalid(format!("parameter '{name}': {column} '{text}' is not a number")))
}

/// Coerce a digits cell to a nullable non-negative integer (`"2"` and `"2.0"` both work).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_digits(sheet: &Sheet, name: &str, text: &str) -> Result<Option<u32>> {
    if is_blank(text) {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(Some(v as u32)),
        _ => Err(sheet.invalid(format!(
            "parameter '{name}': digits '{text}' is not a non-negative integer"
        ))),
    }
}

fn load_objectives(sheet: &Sheet) -> Result<Vec<ObjectiveDef>> {
    let Some(names) = sheet.column("name") else {
        return Ok(Vec::new());
    };
    let flags = sheet.column("minimize");

    let mut seen = HashSet::new();
    let mut objectives = Vec::new();
    for (row, name) in names.iter().enumerate() {
        if is_blank(name) {
            continue;
        }
        if !seen.insert(*name) {
            return Err(sheet.invalid(format!("duplicate objective '{name}'")));
        }
        let minimize = match &flags {
            Some(column) => parse_flag(column[row]).ok_or_else(|| {
                sheet.invalid(format!(
                    "objective '{name}': minimize '{}' is not a boolean",
                    column[row]
                ))
            })?,
            None => false,
        };
        objectives.push(ObjectiveDef::new(*name, minimize));
    }
    Ok(objectives)
}

fn parse_flag(text: &str) -> Option<bool> {
    if is_blank(text) {
        return Some(false);
    }
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" | "yes" | "y" | "wahr" | "ja" => Some(true),
        "false" | "0" | "0.0" | "no" | "n" | "falsch" | "nein" => Some(false),
        _ => None,
    }
}

fn load_column_type_order(sheet: &Sheet) -> Vec<ColumnType> {
    let order: Vec<ColumnType> = sheet
        .non_blank("Spaltentyp")
        .iter()
        .filter_map(|label| ColumnType::from_label(label))
        .collect();
    if order.is_empty() {
        DEFAULT_COLUMN_TYPE_ORDER.to_vec()
    } else {
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_dir(tag: &str) -> PathBuf {
        use core::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "seqdesign_config_test_{tag}_{}_{id}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, sheet: &str, body: &str) {
        std::fs::write(dir.join(format!("{sheet}.csv")), body).unwrap();
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = std::env::temp_dir().join("seqdesign_config_does_not_exist");
        assert!(matches!(
            ExperimentConfig::load(&dir),
            Err(Error::MissingConfig { .. })
        ));
    }

    #[test]
    fn empty_directory_degrades_to_defaults() {
        let dir = config_dir("empty");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert!(config.parameters.is_empty());
        assert!(config.objectives.is_empty());
        assert!(config.constraints.is_empty());
        assert_eq!(config.column_type_order, DEFAULT_COLUMN_TYPE_ORDER.to_vec());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn digits_zero_means_int() {
        let dir = config_dir("digits");
        write(
            &dir,
            PARAMETERS_SHEET,
            "name,min_bound,max_bound,digits\ncount,0,10,0\ntemp,0,10,1\nph,1,14,\nrate,0,1,2.0\n",
        );
        let config = ExperimentConfig::load(&dir).unwrap();
        let types: Vec<_> = config.parameters.iter().map(|p| p.value_type).collect();
        assert_eq!(
            types,
            vec![ValueType::Int, ValueType::Float, ValueType::Float, ValueType::Float]
        );
        assert_eq!(config.parameters[0].bounds, Some((0.0, 10.0)));
        assert_eq!(config.parameters[3].digits, Some(2));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn absent_digits_column_defaults_to_float() {
        let dir = config_dir("nodigits");
        write(&dir, PARAMETERS_SHEET, "name,min_bound,max_bound\nx,0,1\n");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(config.parameters[0].value_type, ValueType::Float);
        assert_eq!(config.parameters[0].digits, None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn bounds_require_both_columns() {
        let dir = config_dir("halfbounds");
        write(&dir, PARAMETERS_SHEET, "name,min_bound\nx,0\n");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(config.parameters[0].bounds, None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn objectives_default_to_maximize() {
        let dir = config_dir("objectives");
        write(&dir, OBJECTIVES_SHEET, "name,minimize\nyield,true\ncost,\nfoam,FALSCH\n");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(
            config.objectives,
            vec![
                ObjectiveDef::new("yield", true),
                ObjectiveDef::new("cost", false),
                ObjectiveDef::new("foam", false),
            ]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn constraints_drop_blank_rows() {
        let dir = config_dir("constraints");
        write(&dir, CONSTRAINTS_SHEET, "constraint\nx + y <= 10\n\nnonsense !!\n");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(
            config.constraints,
            vec![
                ParameterConstraint("x + y <= 10".into()),
                ParameterConstraint("nonsense !!".into()),
            ]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let dir = config_dir("dup");
        write(&dir, PARAMETERS_SHEET, "name,min_bound,max_bound\nx,0,1\nx,0,2\n");
        assert!(matches!(
            ExperimentConfig::load(&dir),
            Err(Error::InvalidConfig { .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn column_type_order_ignores_unknown_labels() {
        let dir = config_dir("order");
        write(
            &dir,
            COLUMN_TYPE_ORDER_SHEET,
            "Spaltentyp\nobjectives\nbogus\ntrial_index\n",
        );
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(
            config.column_type_order,
            vec![ColumnType::Objectives, ColumnType::TrialIndex]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn required_columns_cover_every_sheet() {
        let dir = config_dir("required");
        write(&dir, PARAMETERS_SHEET, "name,min_bound,max_bound\ntemp,0,10\n");
        write(&dir, OBJECTIVES_SHEET, "name,minimize\nyield,1\n");
        write(&dir, FIXED_PARAMETERS_SHEET, "name\nbatch\n");
        write(&dir, INFO_COLUMNS_SHEET, "name\nnote\n");
        let config = ExperimentConfig::load(&dir).unwrap();
        assert_eq!(
            config.required_columns(),
            vec!["temp", "yield", "trial_index", "note", "batch"]
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
