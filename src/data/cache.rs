// src/data/cache.rs

use std::sync::Arc;

use crate::workbook::Row;

/// Snapshot of the raw data rows, kept for the lifetime of its owner.
/// Nothing expires it except [`RawDataCache::invalidate`].
#[derive(Debug, Default)]
pub struct RawDataCache {
    rows: Option<Arc<Vec<Row>>>,
}

impl RawDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Vec<Row>>> {
        self.rows.clone()
    }

    pub fn store(&mut self, rows: Vec<Row>) -> Arc<Vec<Row>> {
        let rows = Arc::new(rows);
        self.rows = Some(Arc::clone(&rows));
        rows
    }

    pub fn invalidate(&mut self) {
        self.rows = None;
    }
}
