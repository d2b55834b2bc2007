// src/workbook/mod.rs

//! In-memory spreadsheet model: named sheets of cells with 1-based,
//! A1-style addressing. Persistence lives in [`store`].

pub mod a1;
pub mod formula;
pub mod store;

use std::{
    borrow::Cow,
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

use crate::error::{PipelineError, PipelineResult};

pub use formula::{evaluate_sheet, mirror_formula};
pub use store::WorkbookStore;

/// A single cell value. Values read from storage stay `Text` exactly as
/// written; `Number` holds values the workflow computes (counts, durations).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Formula(String),
}

/// One row of cells, positional.
pub type Row = Vec<Cell>;

static EMPTY: Cell = Cell::Empty;

impl Cell {
    /// Text cell; the empty string is the empty cell.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    /// Interpret a stored string: `=…` is a formula, anything else is text
    /// kept verbatim (`007` stays `007`). See [`Cell::as_number`].
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Cell::Empty;
        }
        if raw.len() > 1 && raw.starts_with('=') {
            return Cell::Formula(raw.to_string());
        }
        Cell::Text(raw.to_string())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Text(s) | Cell::Formula(s) => Cow::Borrowed(s.as_str()),
            Cell::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    /// Numeric value of the cell, parsing numeric-looking text on demand.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) if looks_numeric(s) => s.parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

fn looks_numeric(s: &str) -> bool {
    let (Some(&first), Some(&last)) = (s.as_bytes().first(), s.as_bytes().last()) else {
        return false;
    };
    (first.is_ascii_digit() || first == b'-' || first == b'+' || first == b'.')
        && (last.is_ascii_digit() || last == b'.')
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::text(s)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<usize> for Cell {
    fn from(n: usize) -> Self {
        Cell::Number(n as f64)
    }
}

/// Build a row of text cells from names.
pub fn text_row<S: AsRef<str>>(values: &[S]) -> Row {
    values.iter().map(|v| Cell::text(v.as_ref())).collect()
}

/// A named grid of cells. Rows may be ragged; reads pad with empty cells.
///
/// A sheet is dirty when it holds changes not yet persisted: every sheet
/// built in memory starts dirty, a sheet read from storage starts clean, and
/// any write marks it dirty again.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    grid: Vec<Row>,
    dirty: bool,
}

impl PartialEq for Sheet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.grid == other.grid
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rows(name, Vec::new())
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            grid: rows,
            dirty: true,
        }
    }

    /// A sheet exactly as read from storage.
    pub(crate) fn loaded(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            dirty: false,
            ..Self::with_rows(name, rows)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Height of the grid, blank rows included.
    pub fn max_rows(&self) -> usize {
        self.grid.len()
    }

    /// Last row holding a non-blank cell, or 0.
    pub fn last_row(&self) -> usize {
        self.grid
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_blank()))
            .map_or(0, |i| i + 1)
    }

    /// Last column holding a non-blank cell in any row, or 0.
    pub fn last_column(&self) -> usize {
        self.grid
            .iter()
            .filter_map(|r| r.iter().rposition(|c| !c.is_blank()))
            .max()
            .map_or(0, |i| i + 1)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        if row == 0 || col == 0 {
            return &EMPTY;
        }
        self.grid
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .unwrap_or(&EMPTY)
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: Cell) -> PipelineResult<()> {
        check_origin(row, col)?;
        self.grow(row, col);
        self.grid[row - 1][col - 1] = value;
        self.dirty = true;
        Ok(())
    }

    /// Read a `rows × cols` rectangle, padding with empty cells.
    pub fn get_range(
        &self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> PipelineResult<Vec<Row>> {
        check_origin(row, col)?;
        Ok((row..row + rows)
            .map(|r| (col..col + cols).map(|c| self.cell(r, c).clone()).collect())
            .collect())
    }

    /// Write a non-empty rectangular block with its top-left corner at (`row`, `col`).
    pub fn set_values(&mut self, row: usize, col: usize, values: &[Row]) -> PipelineResult<()> {
        check_origin(row, col)?;
        let width = match values.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => {
                return Err(PipelineError::invalid(
                    "set_values: values must be a non-empty 2D array",
                ))
            }
        };
        if let Some(bad) = values.iter().position(|r| r.len() != width) {
            return Err(PipelineError::invalid(format!(
                "set_values: row {} has {} columns, expected {}",
                bad + 1,
                values[bad].len(),
                width
            )));
        }
        self.grow(row + values.len() - 1, col + width - 1);
        for (i, src) in values.iter().enumerate() {
            let dst = &mut self.grid[row - 1 + i];
            dst[col - 1..col - 1 + width].clone_from_slice(src);
        }
        self.dirty = true;
        Ok(())
    }

    pub fn clear_contents(&mut self) {
        self.grid.clear();
        self.dirty = true;
    }

    /// Blank a rectangle. Cells past the grid are already blank.
    pub fn clear_range(
        &mut self,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> PipelineResult<()> {
        check_origin(row, col)?;
        for r in self.grid.iter_mut().skip(row - 1).take(rows) {
            for c in r.iter_mut().skip(col - 1).take(cols) {
                *c = Cell::Empty;
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Blank every row of the columns `col..col + cols`.
    pub fn clear_columns(&mut self, col: usize, cols: usize) -> PipelineResult<()> {
        let height = self.max_rows();
        self.clear_range(1, col, height, cols)
    }

    /// Write `row` just below the last non-blank row.
    pub fn append_row(&mut self, row: Row) -> PipelineResult<()> {
        if row.is_empty() {
            return Err(PipelineError::invalid("append_row: row must not be empty"));
        }
        let at = self.last_row() + 1;
        self.set_values(at, 1, &[row])
    }

    /// Delete `count` rows starting at `start`, shifting later rows up.
    pub fn delete_rows(&mut self, start: usize, count: usize) -> PipelineResult<()> {
        check_origin(start, 1)?;
        if start > self.grid.len() {
            return Ok(());
        }
        let end = (start - 1 + count).min(self.grid.len());
        self.grid.drain(start - 1..end);
        self.dirty = true;
        Ok(())
    }

    /// Put a formula into the cell named by an A1 reference.
    pub fn set_formula(&mut self, a1: &str, formula: &str) -> PipelineResult<()> {
        let at = a1::CellRef::parse(a1)?;
        if !formula.starts_with('=') {
            return Err(PipelineError::invalid(format!(
                "formula must start with '=': {:?}",
                formula
            )));
        }
        self.set_cell(at.row, at.col, Cell::Formula(formula.to_string()))
    }

    /// Rows up to `last_row`, each padded to `last_column`.
    pub fn used_rows(&self) -> Vec<Row> {
        let width = self.last_column();
        (1..=self.last_row())
            .map(|r| (1..=width).map(|c| self.cell(r, c).clone()).collect())
            .collect()
    }

    fn grow(&mut self, rows: usize, cols: usize) {
        if self.grid.len() < rows {
            self.grid.resize_with(rows, Vec::new);
        }
        for r in self.grid.iter_mut().take(rows) {
            if r.len() < cols {
                r.resize(cols, Cell::Empty);
            }
        }
    }
}

fn check_origin(row: usize, col: usize) -> PipelineResult<()> {
    if row == 0 || col == 0 {
        return Err(PipelineError::invalid(format!(
            "row and column are 1-based, got ({}, {})",
            row, col
        )));
    }
    Ok(())
}

/// A shared spreadsheet document: sheets keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.get_mut(name)
    }

    /// Like [`Workbook::sheet`], but a missing sheet is a missing-source error.
    pub fn require(&self, name: &str) -> PipelineResult<&Sheet> {
        self.sheet(name)
            .ok_or_else(|| PipelineError::MissingSource(name.to_string()))
    }

    pub fn require_mut(&mut self, name: &str) -> PipelineResult<&mut Sheet> {
        self.sheet_mut(name)
            .ok_or_else(|| PipelineError::MissingSource(name.to_string()))
    }

    /// Add `sheet`, replacing any sheet with the same name.
    pub fn insert_sheet(&mut self, sheet: Sheet) -> &mut Sheet {
        match self.sheets.entry(sheet.name.clone()) {
            Entry::Occupied(mut e) => {
                e.insert(sheet);
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(sheet),
        }
    }

    /// Return the named sheet, creating it (with `headers` in row 1) if absent.
    /// Existing sheets are returned untouched.
    pub fn ensure_sheet(&mut self, name: &str, headers: &[String]) -> &mut Sheet {
        self.sheets.entry(name.to_string()).or_insert_with(|| {
            let mut sheet = Sheet::new(name);
            if !headers.is_empty() {
                sheet.grid.push(text_row(headers));
            }
            sheet
        })
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.values()
    }
}
