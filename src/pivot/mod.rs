// src/pivot/mod.rs

use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::staging::StagedBlock;
use crate::workbook::{text_row, Cell, Row, Sheet};

/// How the value column is summarised within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizeFunction {
    /// Non-blank cells.
    CountA,
    /// Numeric cells only.
    Count,
}

impl SummarizeFunction {
    pub fn parse(name: &str) -> PipelineResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "COUNTA" => Ok(Self::CountA),
            "COUNT" => Ok(Self::Count),
            other => Err(PipelineError::invalid(format!(
                "unsupported pivot function {:?} (expected COUNTA or COUNT)",
                other
            ))),
        }
    }

    fn counts(&self, cell: &Cell) -> bool {
        match self {
            Self::CountA => !cell.is_blank(),
            Self::Count => cell.as_number().is_some(),
        }
    }
}

/// One output line of the grouped count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    pub flag: String,
    pub count: usize,
}

/// Count rows of `block` per distinct value of `group_col`, summarising the
/// first column with `func`. Groups come out in ascending order.
pub fn aggregate(
    block: &StagedBlock,
    group_col: &str,
    func: SummarizeFunction,
) -> PipelineResult<Vec<PivotRow>> {
    let group_idx = block.column_index(group_col).ok_or_else(|| {
        PipelineError::invalid(format!("group column {:?} not in staged header", group_col))
    })?;
    let value_idx = 0;

    let mut groups: BTreeMap<String, usize> = BTreeMap::new();
    for row in &block.rows {
        let key = row
            .get(group_idx)
            .map(|c| c.as_str().into_owned())
            .unwrap_or_default();
        let n = groups.entry(key).or_default();
        if row.get(value_idx).is_some_and(|c| func.counts(c)) {
            *n += 1;
        }
    }
    Ok(groups
        .into_iter()
        .map(|(flag, count)| PivotRow { flag, count })
        .collect())
}

/// Rebuilds the grouped-count block on the pivot sheet.
pub struct PivotBuilder {
    cfg: Arc<Config>,
}

impl PivotBuilder {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    /// Clear the old pivot block at `start_col`; unless `block` is empty,
    /// write the header row and one row per group beneath it.
    #[tracing::instrument(level = "info", skip_all, fields(stage = "pivot", rows = block.len()))]
    pub fn create_pivot_from_staging(
        &self,
        pivot_sheet: &mut Sheet,
        start_col: usize,
        block: &StagedBlock,
    ) -> PipelineResult<Vec<PivotRow>> {
        let cfg = &self.cfg;
        if start_col == 0 {
            return Err(PipelineError::invalid(format!("Invalid startCol: {}", start_col)));
        }
        if block.header.is_empty() {
            return Err(PipelineError::invalid("Invalid dataHeader: empty"));
        }
        let func = SummarizeFunction::parse(&cfg.pivot_function)?;

        let pivot_cols = cfg.pivot_header.len();
        pivot_sheet.clear_columns(start_col, pivot_cols)?;

        if block.is_empty() {
            info!("no data rows to pivot; exiting");
            return Ok(Vec::new());
        }

        let groups = aggregate(block, &cfg.pivot_group_col, func)?;

        let mut out: Vec<Row> = Vec::with_capacity(groups.len() + 2);
        out.push(text_row(&cfg.pivot_header));
        out.extend(
            groups
                .iter()
                .map(|g| vec![Cell::text(g.flag.as_str()), Cell::from(g.count)]),
        );
        if cfg.pivot_grand_total {
            let total: usize = groups.iter().map(|g| g.count).sum();
            out.push(vec![Cell::text("Grand Total"), Cell::from(total)]);
        }
        pivot_sheet.set_values(1, start_col, &out)?;

        info!(groups = groups.len(), "pivot created");
        Ok(groups)
    }
}
