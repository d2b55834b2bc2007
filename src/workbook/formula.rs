// src/workbook/formula.rs

//! The one formula shape the workflow writes: an array formula echoing a
//! column span of another sheet.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{a1::ColumnSpan, Cell, Sheet, Workbook};
use crate::error::PipelineResult;

static ARRAY_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^=ARRAYFORMULA\('((?:[^']|'')+)'!([A-Z]+[0-9]*:[A-Z]+[0-9]*)\)$").unwrap()
});

/// `=ARRAYFORMULA('<sheet>'!<span>)`, quoting the sheet name.
pub fn mirror_formula(sheet: &str, span: &str) -> String {
    format!("=ARRAYFORMULA('{}'!{})", sheet.replace('\'', "''"), span)
}

/// Parse a mirror formula back into (sheet name, span).
pub fn parse_mirror_formula(formula: &str) -> Option<(String, ColumnSpan)> {
    let caps = ARRAY_REF.captures(formula.trim())?;
    let sheet = caps[1].replace("''", "'");
    let span = ColumnSpan::parse(&caps[2]).ok()?;
    Some((sheet, span))
}

/// Copy of the named sheet with every mirror formula replaced by the values
/// it refers to. Other formulas are kept as written.
pub fn evaluate_sheet(wb: &Workbook, name: &str) -> PipelineResult<Sheet> {
    let sheet = wb.require(name)?;
    let mut out = sheet.clone();

    for row in 1..=sheet.max_rows() {
        for col in 1..=sheet.last_column().max(1) {
            let Cell::Formula(f) = sheet.cell(row, col) else {
                continue;
            };
            let Some((source_name, span)) = parse_mirror_formula(f) else {
                continue;
            };
            let source = wb.require(&source_name)?;
            let last = source.last_row();
            if last < span.first_row {
                out.set_cell(row, col, Cell::Empty)?;
                continue;
            }
            let values =
                source.get_range(span.first_row, span.start, last - span.first_row + 1, span.width())?;
            out.set_values(row, col, &values)?;
        }
    }
    Ok(out)
}
