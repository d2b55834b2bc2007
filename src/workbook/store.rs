// src/workbook/store.rs

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::{Cell, Row, Sheet, Workbook};

/// A workbook persisted as a directory with one `<sheet name>.csv` per sheet.
pub struct WorkbookStore {
    dir: PathBuf,
}

impl WorkbookStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every `*.csv` in the directory into a sheet named after the file stem.
    pub fn load(&self) -> Result<Workbook> {
        if !self.dir.is_dir() {
            bail!(
                "workbook directory `{}` does not exist or is not a directory",
                self.dir.display()
            );
        }

        let mut wb = Workbook::new();
        let pattern = format!("{}/*.csv", glob::Pattern::escape(&self.dir.to_string_lossy()));
        for entry in glob(&pattern).context("invalid glob pattern for workbook load")? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot read glob entry: {:?}", e);
                    continue;
                }
            };
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let rows = read_sheet_file(&path)?;
            debug!(sheet = %name, rows = rows.len(), "loaded sheet");
            wb.insert_sheet(Sheet::loaded(name, rows));
        }
        Ok(wb)
    }

    /// Write every changed sheet, each atomically via a temp file and rename.
    /// A sheet unchanged since it was loaded keeps its file untouched.
    pub fn save(&self, wb: &Workbook) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating workbook directory {:?}", &self.dir))?;
        for sheet in wb.sheets() {
            if !sheet.is_dirty() && self.sheet_path(sheet.name()).exists() {
                debug!(sheet = %sheet.name(), "unchanged; not rewritten");
                continue;
            }
            self.save_sheet(sheet)?;
        }
        Ok(())
    }

    fn sheet_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    fn save_sheet(&self, sheet: &Sheet) -> Result<()> {
        let final_path = self.sheet_path(sheet.name());
        let tmp_path = self.dir.join(format!(".{}.csv.tmp", sheet.name()));

        {
            let mut wtr = WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp_path)
                .with_context(|| format!("creating {:?}", tmp_path))?;
            for row in sheet.used_rows() {
                wtr.write_record(row.iter().map(|c| c.as_str().into_owned()))
                    .with_context(|| format!("writing sheet {:?}", sheet.name()))?;
            }
            wtr.flush()
                .with_context(|| format!("flushing {:?}", tmp_path))?;
        }

        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!(
                "failed to rename `{}` to `{}`",
                tmp_path.display(),
                final_path.display()
            )
        })?;
        debug!(sheet = %sheet.name(), path = %final_path.display(), "saved sheet");
        Ok(())
    }
}

fn read_sheet_file(path: &Path) -> Result<Vec<Row>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening sheet {:?}", path))?;

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("CSV parse error in {:?} at record {}", path, idx))?;
        rows.push(record.iter().map(Cell::parse).collect());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::text_row;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() -> Result<()> {
        let tmp = tempdir()?;
        let store = WorkbookStore::new(tmp.path());

        let mut wb = Workbook::new();
        let raw = wb.insert_sheet(Sheet::new("RAW_DATA"));
        raw.set_values(
            1,
            1,
            &[
                text_row(&["Username", "Amount"]),
                vec![Cell::text("ann, the first"), Cell::Number(12.5)],
                vec![Cell::Empty, Cell::Empty],
                vec![Cell::text("bob"), Cell::Number(3.0)],
            ],
        )?;
        let view = wb.insert_sheet(Sheet::new("Second Experiment"));
        view.set_formula("A2", "=ARRAYFORMULA('RAW_DATA'!A2:B)")?;
        store.save(&wb)?;

        assert!(tmp.path().join("Second Experiment.csv").exists());
        let loaded = store.load()?;
        assert_eq!(
            loaded.sheet_names().collect::<Vec<_>>(),
            vec!["RAW_DATA", "Second Experiment"]
        );
        let raw = loaded.sheet("RAW_DATA").unwrap();
        assert_eq!(raw.last_row(), 4);
        assert_eq!(raw.cell(2, 1), &Cell::text("ann, the first"));
        assert_eq!(raw.cell(2, 2).as_str(), "12.5");
        assert_eq!(raw.cell(2, 2).as_number(), Some(12.5));
        assert!(!raw.is_dirty());
        assert!(raw.cell(3, 1).is_blank());
        assert!(matches!(
            loaded.sheet("Second Experiment").unwrap().cell(2, 1),
            Cell::Formula(_)
        ));
        Ok(())
    }

    #[test]
    fn test_run_leaves_raw_file_byte_identical() -> Result<()> {
        let tmp = tempdir()?;
        let raw_path = tmp.path().join("RAW_DATA.csv");
        let raw_bytes = "Username,NaturalId,Name,StorageType,Ticker,Amount\r\n\
                         ann,007,Iron,STORE,1E3,1.50\r\n\
                         bob,12345678901234567890,\"Fuel\",FTL_FUEL_STORE,SF,400\r\n\
                         cid,N3,Iron,STORE,FE,+3\r\n";
        fs::write(&raw_path, raw_bytes)?;
        fs::write(tmp.path().join("Second Experiment.csv"), "")?;

        let store = WorkbookStore::new(tmp.path());
        let mut wb = store.load()?;
        let mut wf = crate::Workflow::new(crate::Config::default())?;
        wf.run(&mut wb)?;
        store.save(&wb)?;

        assert_eq!(fs::read_to_string(&raw_path)?, raw_bytes);

        // derived blocks carry the raw spelling through
        let reloaded = store.load()?;
        let data = reloaded.sheet("Second Experiment").unwrap();
        assert_eq!(data.cell(2, 9).as_str(), "007");
        assert_eq!(data.cell(2, 13).as_str(), "1.50");
        assert_eq!(data.cell(3, 9).as_str(), "12345678901234567890");
        // filtered block: ann and cid survive, Amount in column U
        assert_eq!(data.cell(3, 16).as_str(), "cid");
        assert_eq!(data.cell(3, 21).as_str(), "+3");
        assert!(reloaded.sheet("Runtime Logs").is_some());
        Ok(())
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let tmp = tempdir().unwrap();
        let store = WorkbookStore::new(tmp.path().join("nope"));
        assert!(store.load().is_err());
    }
}
