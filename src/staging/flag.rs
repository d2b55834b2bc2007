// src/staging/flag.rs

use std::collections::BTreeMap;

use crate::workbook::Cell;

/// Static category-key → flag lookup. A miss is the empty flag.
#[derive(Debug, Clone, Default)]
pub struct FlagClassifier {
    map: BTreeMap<String, String>,
}

impl FlagClassifier {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self { map }
    }

    pub fn classify(&self, key: &str) -> &str {
        self.map.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn classify_cell(&self, key: &Cell) -> Cell {
        Cell::text(self.classify(&key.as_str()))
    }
}
