// src/workflow.rs

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::{Header, Mirror, RowSource};
use crate::error::PipelineResult;
use crate::history::{RunHistory, RunRecord, RunStatus};
use crate::pivot::{PivotBuilder, PivotRow};
use crate::staging::{StagedBlock, Stager};
use crate::workbook::Workbook;

/// Tag attached to log lines and errors of each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Mirror,
    Source,
    StageTwo,
    StageThree,
    Pivot,
    Reset,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Mirror => "Data.ensureMirror",
            Stage::Source => "Data.loadRawData",
            Stage::StageTwo => "Staging.stageRangeTwo",
            Stage::StageThree => "Staging.stageRangeThree",
            Stage::Pivot => "PivotBuilder.createPivotFromStaging",
            Stage::Reset => "Workflow.reset",
        })
    }
}

/// Log a failed step with its stage tag and wrap it with that tag as context.
fn tagged<T>(stage: Stage, result: PipelineResult<T>) -> Result<T> {
    result
        .inspect_err(|e| error!(stage = %stage, "{}", e))
        .with_context(|| format!("{} failed", stage))
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub header: Header,
    pub raw_rows: usize,
    pub staged_rows: usize,
    pub filtered_rows: usize,
    pub pivot: Vec<PivotRow>,
    pub duration_ms: u64,
}

/// The whole workflow, each component built once from the shared config.
pub struct Workflow {
    cfg: Arc<Config>,
    mirror: Mirror,
    source: RowSource,
    stager: Stager,
    pivot: PivotBuilder,
    history: RunHistory,
}

impl Workflow {
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate().context("invalid workflow config")?;
        let cfg = Arc::new(cfg);
        Ok(Self {
            mirror: Mirror::new(Arc::clone(&cfg)),
            source: RowSource::new(Arc::clone(&cfg)),
            stager: Stager::new(Arc::clone(&cfg)),
            pivot: PivotBuilder::new(Arc::clone(&cfg)),
            history: RunHistory::new(Arc::clone(&cfg)),
            cfg,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Drop the cached raw rows so the next run re-reads the raw sheet.
    pub fn invalidate_cache(&mut self) {
        self.source.invalidate();
    }

    /// Mirror → load → stage A → stage B → pivot, then append a run record.
    /// Writes made before a failing step stay in `wb`.
    pub fn run(&mut self, wb: &mut Workbook) -> Result<RunSummary> {
        let start = Instant::now();
        info!("START");

        let result = self.run_stages(wb, start);
        let record = match &result {
            Ok(summary) => RunRecord::new(
                RunStatus::Success,
                format!("Pivot built from {} rows.", summary.staged_rows),
                summary.filtered_rows,
                start.elapsed(),
                &self.cfg.run_log,
            ),
            Err(e) => {
                error!("workflow failed: {:#}", e);
                RunRecord::new(
                    RunStatus::Error,
                    format!("{:#}", e),
                    0,
                    start.elapsed(),
                    &self.cfg.run_log,
                )
            }
        };
        if let Err(e) = self.history.record(wb, &record) {
            warn!("could not append run history: {}", e);
        }

        if result.is_ok() {
            info!(elapsed = ?start.elapsed(), "workflow completed successfully");
        }
        result
    }

    fn run_stages(&mut self, wb: &mut Workbook, start: Instant) -> Result<RunSummary> {
        let cfg = Arc::clone(&self.cfg);
        let names = &cfg.sheet_names;

        tagged(Stage::Mirror, wb.require(&names.data).map(|_| ()))?;
        wb.ensure_sheet(&names.pivot, &[]);

        let header = tagged(Stage::Mirror, self.mirror.ensure_mirror(wb))?;
        let raw = tagged(Stage::Source, self.source.load_raw_data(wb))?;

        let data = tagged(Stage::StageTwo, wb.require_mut(&names.data))?;
        let staged = tagged(
            Stage::StageTwo,
            self.stager.stage_range_two(data, &header, &raw),
        )?;
        let filtered = tagged(
            Stage::StageThree,
            self.stager.stage_range_three(data, &header, &staged),
        )?;

        // The pivot counts the flagged (pre-filter) block; it is only skipped
        // when that block is empty.
        let pivot_sheet = tagged(Stage::Pivot, wb.require_mut(&names.pivot))?;
        let pivot = tagged(
            Stage::Pivot,
            self.pivot
                .create_pivot_from_staging(pivot_sheet, cfg.pivot_start_col, &staged),
        )?;

        Ok(RunSummary {
            header,
            raw_rows: raw.len(),
            staged_rows: staged.len(),
            filtered_rows: filtered.len(),
            pivot,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Rebuild only the pivot from the flagged block already on the data sheet.
    pub fn rebuild_pivot(&mut self, wb: &mut Workbook) -> Result<Vec<PivotRow>> {
        let cfg = Arc::clone(&self.cfg);
        let names = &cfg.sheet_names;
        let expected = cfg.staging_header();

        let data = tagged(Stage::Pivot, wb.require(&names.data))?;
        let staged = tagged(
            Stage::Pivot,
            StagedBlock::read_from(data, cfg.staging_start_col, expected.len()),
        )?;
        tagged(
            Stage::Pivot,
            crate::data::validate_header(&staged.header, &expected),
        )?;

        let pivot_sheet = wb.ensure_sheet(&names.pivot, &[]);
        tagged(
            Stage::Pivot,
            self.pivot
                .create_pivot_from_staging(pivot_sheet, cfg.pivot_start_col, &staged),
        )
    }

    /// Clear every sheet the workflow writes (mirror, data, pivot) and drop
    /// the raw-data cache. The raw sheet and the run log are left alone.
    pub fn reset(&mut self, wb: &mut Workbook) -> Result<()> {
        let names = &self.cfg.sheet_names;
        let mut managed = vec![&names.mirror, &names.data, &names.pivot];
        managed.sort();
        managed.dedup();
        for name in managed {
            match wb.sheet_mut(name) {
                Some(sheet) => {
                    sheet.clear_contents();
                    info!(stage = %Stage::Reset, sheet = %name, "cleared");
                }
                None => warn!(stage = %Stage::Reset, sheet = %name, "sheet not found; skipping"),
            }
        }
        self.source.invalidate();
        Ok(())
    }
}
