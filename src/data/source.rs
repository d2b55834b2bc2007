// src/data/source.rs

use std::sync::Arc;
use tracing::{debug, info};

use super::{read_header, validate_header, RawDataCache};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::workbook::{a1::ColumnSpan, Row, Workbook};

/// Reads the raw data rows beneath the header, serving repeated calls from
/// its cache until [`RowSource::invalidate`] is called.
pub struct RowSource {
    cfg: Arc<Config>,
    cache: RawDataCache,
}

impl RowSource {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            cache: RawDataCache::new(),
        }
    }

    /// Every data row with at least one non-blank cell. The header must match
    /// the expected columns and at least one data row must exist.
    #[tracing::instrument(level = "info", skip_all, fields(stage = "source"))]
    pub fn load_raw_data(&mut self, wb: &Workbook) -> PipelineResult<Arc<Vec<Row>>> {
        if self.cfg.enable_caching {
            if let Some(rows) = self.cache.get() {
                debug!(rows = rows.len(), "serving raw data from cache");
                return Ok(rows);
            }
        }

        let cfg = &self.cfg;
        let name = &cfg.sheet_names.raw_data;
        let sheet = wb.require(name)?;
        let span = ColumnSpan::parse(&cfg.raw_data_range)?;

        let last_row = sheet.last_row();
        if last_row < 2 {
            return Err(PipelineError::EmptyDataset(name.clone()));
        }

        let header = read_header(sheet, span.start, span.width())?;
        validate_header(&header, &cfg.expected_columns)?;

        let rows: Vec<Row> = sheet
            .get_range(2, span.start, last_row - 1, header.len())?
            .into_iter()
            .filter(|row| row.iter().any(|c| !c.is_blank()))
            .collect();
        if rows.is_empty() {
            return Err(PipelineError::EmptyDataset(name.clone()));
        }
        info!(rows = rows.len(), "loaded raw data");

        if self.cfg.enable_caching {
            Ok(self.cache.store(rows))
        } else {
            Ok(Arc::new(rows))
        }
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{text_row, Cell, Sheet};

    const HEADER: [&str; 6] = ["Username", "NaturalId", "Name", "StorageType", "Ticker", "Amount"];

    fn raw_workbook(rows: &[&[&str]]) -> Workbook {
        let mut grid = vec![text_row(&HEADER)];
        grid.extend(rows.iter().map(|r| r.iter().map(|v| Cell::parse(v)).collect::<Row>()));
        let mut wb = Workbook::new();
        wb.insert_sheet(Sheet::with_rows("RAW_DATA", grid));
        wb
    }

    #[test]
    fn test_blank_rows_skipped() {
        let wb = raw_workbook(&[
            &["ann", "N1", "Iron", "STORE", "FE", "4"],
            &["", "", "", "", "", ""],
            &["bob", "N2", "Fuel", "FTL_FUEL_STORE", "FF", "10"],
        ]);
        let mut source = RowSource::new(Arc::new(Config::default()));
        let rows = source.load_raw_data(&wb).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][3], Cell::text("FTL_FUEL_STORE"));
        assert_eq!(rows[1][5], Cell::text("10"));
    }

    #[test]
    fn test_header_only_is_empty_dataset() {
        let wb = raw_workbook(&[]);
        let mut source = RowSource::new(Arc::new(Config::default()));
        assert!(matches!(
            source.load_raw_data(&wb),
            Err(PipelineError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_cache_returns_same_snapshot_until_invalidated() {
        let mut wb = raw_workbook(&[&["ann", "N1", "Iron", "STORE", "FE", "4"]]);
        let mut source = RowSource::new(Arc::new(Config::default()));
        let first = source.load_raw_data(&wb).unwrap();

        wb.sheet_mut("RAW_DATA")
            .unwrap()
            .append_row(text_row(&["bob", "N2", "Hull", "SHIP_STORE", "HL", "1"]))
            .unwrap();
        let second = source.load_raw_data(&wb).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);

        source.invalidate();
        assert_eq!(source.load_raw_data(&wb).unwrap().len(), 2);
    }

    #[test]
    fn test_caching_disabled_rereads() {
        let mut wb = raw_workbook(&[&["ann", "N1", "Iron", "STORE", "FE", "4"]]);
        let cfg = Config {
            enable_caching: false,
            ..Config::default()
        };
        let mut source = RowSource::new(Arc::new(cfg));
        source.load_raw_data(&wb).unwrap();
        wb.sheet_mut("RAW_DATA")
            .unwrap()
            .append_row(text_row(&["bob", "N2", "Hull", "SHIP_STORE", "HL", "1"]))
            .unwrap();
        assert_eq!(source.load_raw_data(&wb).unwrap().len(), 2);
    }
}
