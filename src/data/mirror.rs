// src/data/mirror.rs

use std::sync::Arc;
use tracing::info;

use super::{read_header, validate_header, Header};
use crate::config::Config;
use crate::error::PipelineResult;
use crate::workbook::{a1::ColumnSpan, mirror_formula, text_row, Workbook};

/// Publishes the live, formula-driven view of the raw range.
pub struct Mirror {
    cfg: Arc<Config>,
}

impl Mirror {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    /// Validate the raw header, then rewrite the mirror region: header in
    /// row 1 and a single array formula at the import cell. No data is copied.
    /// Returns the validated header.
    #[tracing::instrument(level = "info", skip_all, fields(stage = "mirror"))]
    pub fn ensure_mirror(&self, wb: &mut Workbook) -> PipelineResult<Header> {
        let cfg = &self.cfg;
        let span = ColumnSpan::parse(&cfg.raw_data_range)?;

        let raw = wb.require(&cfg.sheet_names.raw_data)?;
        let header = read_header(raw, span.start, span.width())?;
        validate_header(&header, &cfg.expected_columns)?;

        let formula = mirror_formula(&cfg.sheet_names.raw_data, &span.from_row(2)?);
        let target = wb.require_mut(&cfg.sheet_names.mirror)?;
        target.clear_columns(span.start, span.width())?;
        target.set_values(1, span.start, &[text_row(&header)])?;
        info!("header written: [{}]", header.join(", "));

        target.set_formula(&cfg.import_cell, &formula)?;
        info!(cell = %cfg.import_cell, %formula, "mirror formula set");
        Ok(header)
    }
}
