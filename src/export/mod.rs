// src/export/mod.rs

//! Snapshot the workbook's sections as Parquet files.

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

use crate::config::Config;
use crate::staging::StagedBlock;
use crate::workbook::{a1::ColumnSpan, evaluate_sheet, Cell, Workbook};

/// Float64 when every non-blank cell of the column is a number (and there is
/// at least one), Utf8 otherwise.
pub fn infer_column_type(block: &StagedBlock, idx: usize) -> DataType {
    let mut seen = false;
    for row in &block.rows {
        match row.get(idx) {
            None => {}
            Some(c) if c.is_blank() => {}
            Some(c) if c.as_number().is_some() => seen = true,
            Some(_) => return DataType::Utf8,
        }
    }
    if seen {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Build an Arrow batch from `block`, one nullable field per header column.
pub fn block_to_record_batch(block: &StagedBlock) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(block.header.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(block.header.len());

    for (idx, name) in block.header.iter().enumerate() {
        let dt = infer_column_type(block, idx);
        let cells = block.rows.iter().map(|r| r.get(idx).unwrap_or(&Cell::Empty));
        let array: ArrayRef = match dt {
            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(block.len());
                for c in cells {
                    b.append_option(c.as_number());
                }
                Arc::new(b.finish())
            }
            _ => {
                let mut b = StringBuilder::new();
                for c in cells {
                    if c.is_blank() {
                        b.append_null();
                    } else {
                        b.append_value(c.as_str());
                    }
                }
                Arc::new(b.finish())
            }
        };
        fields.push(Field::new(name, dt, true));
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .context("building record batch from block")
}

/// Write `block` to `path` as Snappy-compressed Parquet, via a temp file.
pub fn write_block_parquet(block: &StagedBlock, path: &Path) -> Result<()> {
    let batch = block_to_record_batch(block)?;
    let tmp_path = path.with_extension("parquet.tmp");

    let file = File::create(&tmp_path)
        .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating ArrowWriter for export")?;
    writer.write(&batch).context("writing export batch")?;
    writer.close().context("closing export writer")?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Export the mirrored raw view, the flagged block, the filtered block and
/// the pivot into `out_dir`. Returns the files written.
pub fn export_workbook(wb: &Workbook, cfg: &Config, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating export dir {:?}", out_dir))?;
    let span = ColumnSpan::parse(&cfg.raw_data_range)?;
    let names = &cfg.sheet_names;

    let mirror = evaluate_sheet(wb, &names.mirror)?;
    let data = wb.require(&names.data)?;
    let pivot = wb.require(&names.pivot)?;

    let sections = [
        ("mirror", StagedBlock::read_from(&mirror, span.start, span.width())?),
        (
            "staged",
            StagedBlock::read_from(data, cfg.staging_start_col, cfg.staging_header().len())?,
        ),
        (
            "filtered",
            StagedBlock::read_from(data, cfg.third_range_start_col, cfg.expected_columns.len())?,
        ),
        (
            "pivot",
            StagedBlock::read_from(pivot, cfg.pivot_start_col, cfg.pivot_header.len())?,
        ),
    ];

    let mut written = Vec::with_capacity(sections.len());
    for (name, block) in &sections {
        if block.header.is_empty() {
            info!(section = *name, "section is empty; skipping");
            continue;
        }
        let path = out_dir.join(format!("{}.parquet", name));
        write_block_parquet(block, &path)?;
        info!(section = *name, rows = block.len(), path = %path.display(), "exported");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn block() -> StagedBlock {
        StagedBlock {
            header: vec!["Name".into(), "Amount".into(), "FLAG".into()],
            rows: vec![
                vec![Cell::text("Iron"), Cell::Number(4.0), Cell::text("BASE")],
                vec![Cell::text("Fuel"), Cell::Empty, Cell::Empty],
            ],
        }
    }

    #[test]
    fn test_column_types() {
        let b = block();
        assert_eq!(infer_column_type(&b, 0), DataType::Utf8);
        assert_eq!(infer_column_type(&b, 1), DataType::Float64);
        assert_eq!(infer_column_type(&b, 2), DataType::Utf8);
        assert_eq!(infer_column_type(&StagedBlock::default(), 0), DataType::Utf8);
    }

    #[test]
    fn test_parquet_written() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("staged.parquet");
        write_block_parquet(&block(), &path)?;

        let file = File::open(&path)?;
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batch = reader.next().unwrap()?;
        assert_eq!(batch.num_rows(), 2);

        let amount = batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(amount.value(0), 4.0);
        assert!(amount.is_null(1));

        let flag = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(flag.value(0), "BASE");
        assert!(flag.is_null(1));
        Ok(())
    }
}
