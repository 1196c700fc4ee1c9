//! The in-memory trial table.
//!
//! One row per trial, one column per parameter, objective, fixed parameter,
//! information column and the `trial_index` bookkeeping column. Cells may be
//! missing while a trial waits for operator-entered outputs.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::reconcile::normalize;
use crate::schema::TRIAL_INDEX;
use crate::types::{ParamMap, TrialId};

/// A single ledger value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

fn is_missing_marker(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed == "<NA>"
}

impl Cell {
    /// Interpret raw cell text of a numeric column. Blank, `NaN` and `<NA>`
    /// read as missing.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if is_missing_marker(trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(trimmed.to_string()),
        }
    }

    /// Interpret raw cell text of a free-form column. The text is kept
    /// verbatim, so codes like `007` survive a save and load.
    #[must_use]
    pub fn parse_text(text: &str) -> Self {
        if is_missing_marker(text.trim()) {
            Cell::Missing
        } else {
            Cell::Text(text.to_string())
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Text written to disk. Numbers use the shortest form that parses back
    /// to the same `f64`.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Cell::Missing => String::new(),
            Cell::Number(v) => format!("{v}"),
            Cell::Text(t) => t.clone(),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        if v.is_nan() { Cell::Missing } else { Cell::Number(v) }
    }
}

impl From<&TrialId> for Cell {
    #[allow(clippy::cast_precision_loss)]
    fn from(id: &TrialId) -> Self {
        match id {
            TrialId::Index(index) => Cell::Number(*index as f64),
            TrialId::Arm(name) => Cell::Text(name.clone()),
        }
    }
}

impl core::fmt::Display for Cell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Cell::Missing => write!(f, "NaN"),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(t) => write!(f, "{t}"),
        }
    }
}

/// The trial table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Ledger {
    /// Creates an empty ledger with the given columns.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates a ledger from columns and rows. Short rows are padded with
    /// missing cells, long rows are truncated.
    #[must_use]
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// The cell at `row` in `column`; missing when the column does not exist.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> &Cell {
        static MISSING: Cell = Cell::Missing;
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).map(|r| &r[idx]))
            .unwrap_or(&MISSING)
    }

    /// Overwrite one cell, adding the column if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if `row` is out of range.
    pub fn set(&mut self, row: usize, column: &str, cell: Cell) -> Result<()> {
        if row >= self.rows.len() {
            return Err(Error::Internal("ledger row out of range"));
        }
        let idx = self.ensure_column(column);
        self.rows[row][idx] = cell;
        Ok(())
    }

    /// Add `column` filled with missing cells unless it already exists.
    /// Returns its position.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(Cell::Missing);
        }
        self.columns.len() - 1
    }

    /// Rearrange columns into `order`. Columns absent from `order` are kept
    /// after it in their current relative order; names in `order` that do not
    /// exist are added as missing.
    pub fn reorder(&mut self, order: &[String]) {
        for column in order {
            self.ensure_column(column);
        }
        let mut positions: Vec<usize> = order
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        for idx in 0..self.columns.len() {
            if !positions.contains(&idx) {
                positions.push(idx);
            }
        }
        self.columns = positions.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = positions.iter().map(|&i| row[i].clone()).collect();
        }
    }

    /// Append a row built from named cells; unnamed columns stay missing and
    /// names that are not columns are ignored.
    pub fn push_row(&mut self, cells: &BTreeMap<String, Cell>) -> usize {
        let row = self
            .columns
            .iter()
            .map(|c| cells.get(c).cloned().unwrap_or(Cell::Missing))
            .collect();
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Append an engine suggestion. Parameter values are floored to one
    /// decimal place; the identifier goes into `trial_index`.
    pub fn append_trial(&mut self, params: &ParamMap, id: &TrialId) -> usize {
        let mut cells: BTreeMap<String, Cell> = params
            .iter()
            .map(|(name, value)| (name.clone(), Cell::from(normalize(*value))))
            .collect();
        cells.insert(TRIAL_INDEX.to_string(), Cell::from(id));
        self.push_row(&cells)
    }

    /// Whether any row already carries a trial identifier.
    #[must_use]
    pub fn has_trial_index(&self) -> bool {
        (0..self.rows.len()).any(|row| !self.get(row, TRIAL_INDEX).is_missing())
    }

    /// The trial identifier recorded in `row`, if any.
    #[must_use]
    pub fn trial_id(&self, row: usize) -> Option<TrialId> {
        match self.get(row, TRIAL_INDEX) {
            Cell::Missing => None,
            cell => TrialId::parse(&cell.render()),
        }
    }

    /// Numeric values of `names` in `row`, or `None` if any of them is missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCell`] if a present cell is not numeric.
    pub fn numeric_values(
        &self,
        row: usize,
        names: &[&str],
    ) -> Result<Option<BTreeMap<String, f64>>> {
        let mut values = BTreeMap::new();
        for name in names {
            match self.get(row, name) {
                Cell::Missing => return Ok(None),
                Cell::Number(v) => {
                    values.insert((*name).to_string(), *v);
                }
                Cell::Text(text) => {
                    return Err(Error::InvalidCell {
                        row,
                        column: (*name).to_string(),
                        text: text.clone(),
                    });
                }
            }
        }
        Ok(Some(values))
    }

    /// Rows with at least one of `names` missing.
    #[must_use]
    pub fn rows_missing_any(&self, names: &[&str]) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&row| names.iter().any(|n| self.get(row, n).is_missing()))
            .collect()
    }
}

impl core::fmt::Display for Ledger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let index_width = self.rows.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                rendered
                    .iter()
                    .map(|r| r[i].len())
                    .chain(core::iter::once(c.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:index_width$}", "")?;
        for (column, width) in self.columns.iter().zip(&widths) {
            write!(f, "  {column:>width$}")?;
        }
        writeln!(f)?;
        for (i, row) in rendered.iter().enumerate() {
            write!(f, "{i:>index_width$}")?;
            for (cell, width) in row.iter().zip(&widths) {
                write!(f, "  {cell:>width$}")?;
            }
            writeln!(f)?;
        }
        if self.rows.is_empty() {
            writeln!(f, "Empty ledger")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::from_rows(
            vec!["trial_index".into(), "temp".into(), "yield".into()],
            vec![
                vec![Cell::Number(0.0), Cell::Number(5.37), Cell::Missing],
                vec![Cell::Text("1_0".into()), Cell::Number(2.0), Cell::Number(0.8)],
                vec![Cell::Missing, Cell::Missing, Cell::Missing],
            ],
        )
    }

    #[test]
    fn parse_cells() {
        assert_eq!(Cell::parse(""), Cell::Missing);
        assert_eq!(Cell::parse("NaN"), Cell::Missing);
        assert_eq!(Cell::parse(" 2.5 "), Cell::Number(2.5));
        assert_eq!(Cell::parse("0_1"), Cell::Text("0_1".into()));
    }

    #[test]
    fn text_cells_stay_verbatim() {
        assert_eq!(Cell::parse_text("007"), Cell::Text("007".into()));
        assert_eq!(Cell::parse_text("1.50"), Cell::Text("1.50".into()));
        assert_eq!(Cell::parse_text(" <NA> "), Cell::Missing);
        assert_eq!(Cell::parse("007"), Cell::Number(7.0));
    }

    #[test]
    fn render_round_trips_numbers() {
        for v in [0.1, 5.3, 1e-7, 123_456.789, -0.0] {
            assert_eq!(Cell::parse(&Cell::Number(v).render()), Cell::Number(v));
        }
    }

    #[test]
    fn numeric_values_skip_missing() {
        let l = ledger();
        assert_eq!(l.numeric_values(0, &["temp", "yield"]).unwrap(), None);
        let values = l.numeric_values(1, &["temp", "yield"]).unwrap().unwrap();
        assert_eq!(values["yield"], 0.8);
    }

    #[test]
    fn numeric_values_reject_text() {
        let mut l = ledger();
        l.set(1, "temp", Cell::Text("warm".into())).unwrap();
        assert!(matches!(
            l.numeric_values(1, &["temp"]),
            Err(Error::InvalidCell { row: 1, .. })
        ));
    }

    #[test]
    fn trial_ids_from_cells() {
        let l = ledger();
        assert_eq!(l.trial_id(0), Some(TrialId::Index(0)));
        assert_eq!(l.trial_id(1), Some(TrialId::Arm("1_0".into())));
        assert_eq!(l.trial_id(2), None);
        assert!(l.has_trial_index());
    }

    #[test]
    fn append_trial_floors_and_ignores_unknown_names() {
        let mut l = ledger();
        let params = ParamMap::from([("temp".to_string(), 3.99), ("ghost".to_string(), 1.0)]);
        let row = l.append_trial(&params, &TrialId::Arm("2_0".into()));
        assert_eq!(l.get(row, "temp"), &Cell::Number(3.9));
        assert_eq!(l.get(row, "yield"), &Cell::Missing);
        assert_eq!(l.trial_id(row), Some(TrialId::Arm("2_0".into())));
        assert_eq!(l.column_index("ghost"), None);
    }

    #[test]
    fn reorder_keeps_every_column() {
        let mut l = ledger();
        l.reorder(&["yield".into(), "note".into()]);
        assert_eq!(l.columns(), ["yield", "note", "trial_index", "temp"]);
        assert_eq!(l.get(1, "yield"), &Cell::Number(0.8));
        assert_eq!(l.get(1, "note"), &Cell::Missing);
    }

    #[test]
    fn rows_missing_any_objective() {
        assert_eq!(ledger().rows_missing_any(&["yield"]), vec![0, 2]);
    }
}
