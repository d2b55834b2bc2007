// src/history/record.rs

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

use crate::config::RunLogConfig;
use crate::workbook::{Cell, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Success => "Success",
            RunStatus::Error => "Error",
        }
    }
}

/// One summary line of the run log.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub message: String,
    pub row_count: usize,
    pub duration_ms: u64,
    pub flag: String,
}

impl RunRecord {
    pub fn new(
        status: RunStatus,
        message: impl Into<String>,
        row_count: usize,
        duration: Duration,
        cfg: &RunLogConfig,
    ) -> Self {
        let duration_ms = duration.as_millis() as u64;
        Self {
            timestamp: Utc::now(),
            status,
            message: message.into(),
            row_count,
            duration_ms,
            flag: derive_flag(status, row_count, duration_ms, cfg),
        }
    }

    pub fn to_row(&self) -> Row {
        vec![
            Cell::text(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Cell::text(self.status.as_str()),
            Cell::text(self.message.as_str()),
            match self.row_count {
                0 => Cell::Empty,
                n => Cell::from(n),
            },
            Cell::Number(self.duration_ms as f64),
            Cell::text(self.flag.as_str()),
        ]
    }
}

/// `Error` for failed runs; otherwise any of `Low Row Count` and
/// `Slow Execution`, joined by `; `.
pub fn derive_flag(status: RunStatus, row_count: usize, duration_ms: u64, cfg: &RunLogConfig) -> String {
    if status == RunStatus::Error {
        return "Error".into();
    }
    let mut flags = Vec::new();
    if row_count < cfg.low_row_threshold {
        flags.push("Low Row Count");
    }
    if duration_ms > cfg.slow_threshold_ms {
        flags.push("Slow Execution");
    }
    flags.join("; ")
}
