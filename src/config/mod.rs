// src/config/mod.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use crate::workbook::a1::ColumnSpan;

/// Names of every sheet the workflow touches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SheetNames {
    pub raw_data: String,
    pub mirror: String,
    pub data: String,
    pub pivot: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            raw_data: "RAW_DATA".into(),
            mirror: "Second Experiment".into(),
            data: "Second Experiment".into(),
            pivot: "PivotSheet".into(),
        }
    }
}

/// Settings for the capped run-summary log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunLogConfig {
    pub sheet_name: String,
    pub max_entries: usize,
    pub slow_threshold_ms: u64,
    pub low_row_threshold: usize,
}

impl Default for RunLogConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Runtime Logs".into(),
            max_entries: 25,
            slow_threshold_ms: 3_000,
            low_row_threshold: 10,
        }
    }
}

/// Workflow configuration. Every field has a default, so a YAML file only
/// needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sheet_names: SheetNames,

    /// Raw range as a column span, e.g. `A:F`.
    pub raw_data_range: String,
    /// Cell in the mirror sheet that receives the mirror formula.
    pub import_cell: String,

    // 1-based column offsets of each section.
    pub staging_start_col: usize,
    pub third_range_start_col: usize,
    pub pivot_start_col: usize,
    pub column_buffer_size: usize,

    pub flag_header: String,
    /// Header name of the column whose value is looked up in `flag_map`.
    pub flag_source_column: String,
    pub flag_map: BTreeMap<String, String>,
    pub filter_flags: BTreeSet<String>,

    pub expected_columns: Vec<String>,

    pub pivot_group_col: String,
    pub pivot_function: String,
    pub pivot_header: Vec<String>,
    pub pivot_grand_total: bool,

    pub enable_caching: bool,
    pub run_log: RunLogConfig,
}

impl Default for Config {
    fn default() -> Self {
        let flag_map = [
            ("SHIP_STORE", "SHIP"),
            ("FTL_FUEL_STORE", "FUEL"),
            ("STL_FUEL_STORE", "FUEL"),
            ("STORE", "BASE"),
            ("WAREHOUSE_STORE", "WAREHOUSE"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            sheet_names: SheetNames::default(),
            raw_data_range: "A:F".into(),
            import_cell: "A2".into(),
            staging_start_col: 8,
            third_range_start_col: 16,
            pivot_start_col: 24,
            column_buffer_size: 1,
            flag_header: "FLAG".into(),
            flag_source_column: "StorageType".into(),
            flag_map,
            filter_flags: BTreeSet::from(["FUEL".to_string()]),
            expected_columns: [
                "Username",
                "NaturalId",
                "Name",
                "StorageType",
                "Ticker",
                "Amount",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            pivot_group_col: "FLAG".into(),
            pivot_function: "COUNTA".into(),
            pivot_header: vec!["FLAG".into(), "Count".into()],
            pivot_grand_total: false,
            enable_caching: true,
            run_log: RunLogConfig::default(),
        }
    }
}

impl Config {
    /// Load a YAML config from `path` and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        let cfg: Config =
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {:?}", path))?;
        cfg.validate()
            .with_context(|| format!("validating config {:?}", path))?;
        Ok(cfg)
    }

    /// Header of the flagged staging block: the expected columns plus the flag column.
    pub fn staging_header(&self) -> Vec<String> {
        let mut h = self.expected_columns.clone();
        h.push(self.flag_header.clone());
        h
    }

    pub fn raw_span(&self) -> Result<ColumnSpan> {
        ColumnSpan::parse(&self.raw_data_range)
            .with_context(|| format!("raw_data_range {:?}", self.raw_data_range))
    }

    /// Reject configs whose sections overlap or whose names don't line up.
    pub fn validate(&self) -> Result<()> {
        if self.expected_columns.is_empty() {
            bail!("expected_columns must not be empty");
        }
        let span = self.raw_span()?;
        if span.width() != self.expected_columns.len() {
            bail!(
                "raw_data_range {} spans {} columns but {} are expected",
                self.raw_data_range,
                span.width(),
                self.expected_columns.len()
            );
        }
        if !self
            .expected_columns
            .iter()
            .any(|c| c == &self.flag_source_column)
        {
            bail!(
                "flag_source_column {:?} is not one of the expected columns",
                self.flag_source_column
            );
        }
        if self.pivot_group_col != self.flag_header {
            bail!(
                "pivot_group_col {:?} must name the flag column {:?}",
                self.pivot_group_col,
                self.flag_header
            );
        }
        if self.pivot_header.len() != 2 {
            bail!("pivot_header must hold exactly two names");
        }
        crate::pivot::SummarizeFunction::parse(&self.pivot_function)?;

        let min_stage_two = span.end + self.column_buffer_size + 1;
        if self.staging_start_col < min_stage_two {
            bail!(
                "staging_start_col {} overlaps the mirror (must be >= {})",
                self.staging_start_col,
                min_stage_two
            );
        }
        let min_stage_three =
            self.staging_start_col + self.staging_header().len() + self.column_buffer_size;
        if self.third_range_start_col < min_stage_three {
            bail!(
                "third_range_start_col {} overlaps the staging block (must be >= {})",
                self.third_range_start_col,
                min_stage_three
            );
        }
        if self.pivot_start_col < 1 {
            bail!("pivot_start_col must be >= 1");
        }
        if self.run_log.max_entries == 0 {
            bail!("run_log.max_entries must be >= 1");
        }
        Ok(())
    }
}
