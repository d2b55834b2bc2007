// src/history/mod.rs

//! Append-only run summaries kept in a capped log sheet.

pub mod record;

pub use record::{derive_flag, RunRecord, RunStatus};

use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::PipelineResult;
use crate::workbook::{Row, Workbook};

pub const HEADER_ROW: [&str; 6] = [
    "Timestamp",
    "Status",
    "Message",
    "RowCount",
    "Duration (ms)",
    "Flag",
];

/// Writes one summary row per run and trims the oldest beyond `max_entries`.
pub struct RunHistory {
    cfg: Arc<Config>,
}

impl RunHistory {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    pub fn record(&self, wb: &mut Workbook, record: &RunRecord) -> PipelineResult<()> {
        let log = &self.cfg.run_log;
        let header: Vec<String> = HEADER_ROW.iter().map(|s| s.to_string()).collect();
        let sheet = wb.ensure_sheet(&log.sheet_name, &header);
        sheet.append_row(record.to_row())?;

        let excess = sheet.last_row().saturating_sub(log.max_entries + 1);
        if excess > 0 {
            sheet.delete_rows(2, excess)?;
            debug!(excess, "trimmed run history");
        }
        Ok(())
    }

    /// Logged rows, oldest first, without the header.
    pub fn entries(&self, wb: &Workbook) -> Vec<Row> {
        wb.sheet(&self.cfg.run_log.sheet_name)
            .map(|s| s.used_rows().into_iter().skip(1).collect())
            .unwrap_or_default()
    }
}
