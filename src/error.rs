// src/error.rs

use std::fmt;
use thiserror::Error;

/// One offending header position, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDiff {
    pub position: usize,
    pub expected: Option<String>,
    pub found: Option<String>,
}

impl fmt::Display for ColumnDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Col {}: expected \"{}\", got \"{}\"",
            self.position,
            self.expected.as_deref().unwrap_or(""),
            self.found.as_deref().unwrap_or("")
        )
    }
}

/// Failure kinds shared by every pipeline stage. All of them abort the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Header mismatch (expected {expected_len} columns, got {found_len}):\n{}", join_diffs(.diffs))]
    SchemaMismatch {
        expected_len: usize,
        found_len: usize,
        diffs: Vec<ColumnDiff>,
    },

    #[error("Sheet \"{0}\" not found")]
    MissingSource(String),

    #[error("No data rows found in {0}")]
    EmptyDataset(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PipelineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        PipelineError::InvalidArgument(msg.into())
    }
}

fn join_diffs(diffs: &[ColumnDiff]) -> String {
    diffs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
