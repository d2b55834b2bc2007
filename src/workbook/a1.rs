// src/workbook/a1.rs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, PipelineResult};

static COLUMN_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]+$").unwrap());
static CELL_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+)([1-9][0-9]*)$").unwrap());
static SPAN_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+)([1-9][0-9]*)?:([A-Z]+)([1-9][0-9]*)?$").unwrap());

/// Highest index `index_to_column_letter` accepts ("ZZ").
pub const MAX_COLUMN_INDEX: usize = 702;

/// Convert a column letter ("A", "Z", "AA") to its 1-based index.
/// Uppercase letters only.
pub fn column_letter_to_index(letter: &str) -> PipelineResult<usize> {
    if !COLUMN_LETTERS.is_match(letter) {
        return Err(PipelineError::invalid(format!(
            "Invalid column letter: \"{}\". Must be uppercase A-Z only.",
            letter
        )));
    }
    let mut index = 0usize;
    for b in letter.bytes() {
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add((b - b'A' + 1) as usize))
            .ok_or_else(|| PipelineError::invalid(format!("column {:?} out of range", letter)))?;
    }
    Ok(index)
}

/// Convert a 1-based column index (1..=702) to its A1 letter.
pub fn index_to_column_letter(index: usize) -> PipelineResult<String> {
    if !(1..=MAX_COLUMN_INDEX).contains(&index) {
        return Err(PipelineError::invalid(format!(
            "Invalid index: \"{}\". Must be an integer between 1 and {}.",
            index, MAX_COLUMN_INDEX
        )));
    }
    let mut n = index;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// A single cell reference such as `A2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let caps = CELL_REF
            .captures(s.trim())
            .ok_or_else(|| PipelineError::invalid(format!("Invalid cell reference: {:?}", s)))?;
        let col = column_letter_to_index(&caps[1])?;
        let row = caps[2]
            .parse()
            .map_err(|_| PipelineError::invalid(format!("Invalid row in {:?}", s)))?;
        Ok(Self { row, col })
    }
}

/// A column span like `A:F`, optionally with a starting row (`A2:F`).
/// The end row, if present, is ignored: spans are always open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub start: usize,
    pub end: usize,
    pub first_row: usize,
}

impl ColumnSpan {
    pub fn parse(s: &str) -> PipelineResult<Self> {
        let caps = SPAN_REF
            .captures(s.trim())
            .ok_or_else(|| PipelineError::invalid(format!("Invalid column span: {:?}", s)))?;
        let start = column_letter_to_index(&caps[1])?;
        let end = column_letter_to_index(&caps[3])?;
        if end < start {
            return Err(PipelineError::invalid(format!(
                "Column span {:?} ends before it starts",
                s
            )));
        }
        let first_row = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        Ok(Self {
            start,
            end,
            first_row,
        })
    }

    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }

    /// Render as `A2:F`, starting from `row`.
    pub fn from_row(&self, row: usize) -> PipelineResult<String> {
        Ok(format!(
            "{}{}:{}",
            index_to_column_letter(self.start)?,
            row,
            index_to_column_letter(self.end)?
        ))
    }
}
