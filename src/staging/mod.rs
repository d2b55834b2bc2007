// src/staging/mod.rs

//! Two staging passes over the raw rows: stage A appends a flag column,
//! stage B drops excluded flags and strips the flag column again.

pub mod flag;

pub use flag::FlagClassifier;

use std::{collections::BTreeSet, sync::Arc};
use tracing::info;

use crate::config::Config;
use crate::data::Header;
use crate::error::{PipelineError, PipelineResult};
use crate::workbook::{text_row, Cell, Row, Sheet};

/// A header plus its data rows, as written to (or read from) one section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StagedBlock {
    pub header: Header,
    pub rows: Vec<Row>,
}

impl StagedBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Read the block whose header sits in row 1 at `start_col`, `width`
    /// columns wide. Blank rows inside the block are skipped.
    pub fn read_from(sheet: &Sheet, start_col: usize, width: usize) -> PipelineResult<Self> {
        if width == 0 {
            return Err(PipelineError::invalid("block width must be >= 1"));
        }
        let mut header: Header = sheet
            .get_range(1, start_col, 1, width)?
            .into_iter()
            .flatten()
            .map(|c| c.as_str().trim().to_string())
            .collect();
        while header.last().is_some_and(|h| h.is_empty()) {
            header.pop();
        }
        let last = sheet.last_row();
        let rows = if last < 2 || header.is_empty() {
            Vec::new()
        } else {
            sheet
                .get_range(2, start_col, last - 1, header.len())?
                .into_iter()
                .filter(|r| r.iter().any(|c| !c.is_blank()))
                .collect()
        };
        Ok(Self { header, rows })
    }

    /// Clear the section's columns over every row, then write header and rows.
    fn write_to(&self, sheet: &mut Sheet, start_col: usize, clear_width: usize) -> PipelineResult<()> {
        sheet.clear_columns(start_col, clear_width.max(self.header.len()))?;
        sheet.set_values(1, start_col, &[text_row(&self.header)])?;
        if !self.rows.is_empty() {
            sheet.set_values(2, start_col, &self.rows)?;
        }
        Ok(())
    }
}

/// Append `classifier`'s flag for the cell at `key_idx` to every row.
/// Rows shorter than `width` are padded first so the flag always lands at `width`.
pub fn flag_rows(
    rows: &[Row],
    width: usize,
    key_idx: usize,
    classifier: &FlagClassifier,
) -> PipelineResult<Vec<Row>> {
    if key_idx >= width {
        return Err(PipelineError::invalid(format!(
            "key column {} is outside a {}-column header",
            key_idx + 1,
            width
        )));
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() > width {
                return Err(PipelineError::invalid(format!(
                    "row {} has {} columns, header has {}",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            let mut out = row.clone();
            out.resize(width, Cell::Empty);
            let flag = classifier.classify_cell(&out[key_idx]);
            out.push(flag);
            Ok(out)
        })
        .collect()
}

/// Keep rows whose flag at `flag_idx` is not in `excluded`, cut back to `flag_idx` columns.
pub fn filter_rows(
    flagged: &[Row],
    flag_idx: usize,
    excluded: &BTreeSet<String>,
) -> PipelineResult<Vec<Row>> {
    let mut out = Vec::with_capacity(flagged.len());
    for (i, row) in flagged.iter().enumerate() {
        let flag = row.get(flag_idx).ok_or_else(|| {
            PipelineError::invalid(format!(
                "staged row {} has no flag column (expected at {})",
                i + 1,
                flag_idx + 1
            ))
        })?;
        if excluded.contains(&*flag.as_str()) {
            continue;
        }
        out.push(row[..flag_idx].to_vec());
    }
    Ok(out)
}

/// Writes the flagged and filtered sections of the data sheet.
pub struct Stager {
    cfg: Arc<Config>,
    classifier: FlagClassifier,
}

impl Stager {
    pub fn new(cfg: Arc<Config>) -> Self {
        let classifier = FlagClassifier::new(cfg.flag_map.clone());
        Self { cfg, classifier }
    }

    /// Stage A: every raw row plus a trailing flag column, written at
    /// `staging_start_col`. Returns the flagged block.
    #[tracing::instrument(level = "info", skip_all, fields(stage = "stage_two", rows = raw.len()))]
    pub fn stage_range_two(
        &self,
        sheet: &mut Sheet,
        header: &[String],
        raw: &[Row],
    ) -> PipelineResult<StagedBlock> {
        if header.is_empty() {
            return Err(PipelineError::invalid("Invalid header: empty"));
        }
        let cfg = &self.cfg;
        let key_idx = header
            .iter()
            .position(|h| h == &cfg.flag_source_column)
            .ok_or_else(|| {
                PipelineError::invalid(format!(
                    "flag source column {:?} not in header",
                    cfg.flag_source_column
                ))
            })?;

        let mut out_header = header.to_vec();
        out_header.push(cfg.flag_header.clone());
        let block = StagedBlock {
            header: out_header,
            rows: flag_rows(raw, header.len(), key_idx, &self.classifier)?,
        };

        let section = cfg
            .third_range_start_col
            .saturating_sub(cfg.staging_start_col);
        block.write_to(sheet, cfg.staging_start_col, section)?;
        info!("wrote {} rows to staging two", block.len());
        Ok(block)
    }

    /// Stage B: drop rows flagged with an excluded flag, strip the flag
    /// column, write at `third_range_start_col`. Returns the filtered block.
    #[tracing::instrument(level = "info", skip_all, fields(stage = "stage_three", rows = staged.len()))]
    pub fn stage_range_three(
        &self,
        sheet: &mut Sheet,
        header: &[String],
        staged: &StagedBlock,
    ) -> PipelineResult<StagedBlock> {
        if header.is_empty() {
            return Err(PipelineError::invalid("Invalid header: empty"));
        }
        let cfg = &self.cfg;
        let flag_idx = header.len();
        let rows = filter_rows(&staged.rows, flag_idx, &cfg.filter_flags)?;
        let dropped = staged.len() - rows.len();
        let block = StagedBlock {
            header: header.to_vec(),
            rows,
        };

        block.write_to(
            sheet,
            cfg.third_range_start_col,
            header.len() + cfg.column_buffer_size,
        )?;
        info!(dropped, "wrote {} rows to staging three", block.len());
        Ok(block)
    }
}
