// src/data/mod.rs

//! Reading the raw sheet: header validation, the mirrored view and the
//! cached raw-row snapshot.

pub mod cache;
pub mod mirror;
pub mod source;

pub use cache::RawDataCache;
pub use mirror::Mirror;
pub use source::RowSource;

use crate::error::{ColumnDiff, PipelineError, PipelineResult};
use crate::workbook::Sheet;

/// Ordered column names of a block.
pub type Header = Vec<String>;

/// Check `header` position by position against `expected`.
/// Positions past the shorter of the two are reported too.
pub fn validate_header(header: &[String], expected: &[String]) -> PipelineResult<()> {
    let len = header.len().max(expected.len());
    let diffs: Vec<ColumnDiff> = (0..len)
        .filter_map(|i| {
            let exp = expected.get(i);
            let got = header.get(i);
            if exp == got {
                None
            } else {
                Some(ColumnDiff {
                    position: i + 1,
                    expected: exp.cloned(),
                    found: got.cloned(),
                })
            }
        })
        .collect();

    if diffs.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaMismatch {
            expected_len: expected.len(),
            found_len: header.len(),
            diffs,
        })
    }
}

/// Row 1 of `sheet` from `start_col`, at least `min_width` wide or up to the
/// sheet's last column, with trailing blank cells dropped.
pub fn read_header(sheet: &Sheet, start_col: usize, min_width: usize) -> PipelineResult<Header> {
    let width = min_width.max(sheet.last_column().saturating_sub(start_col.saturating_sub(1)));
    let mut header: Header = sheet
        .get_range(1, start_col, 1, width)?
        .into_iter()
        .next()
        .unwrap_or_default()
        .iter()
        .map(|c| c.as_str().trim().to_string())
        .collect();
    while header.last().is_some_and(|h| h.is_empty()) {
        header.pop();
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::text_row;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_equal_header_passes() {
        let exp = names(&["Username", "NaturalId", "Amount"]);
        validate_header(&exp.clone(), &exp).unwrap();
    }

    #[test]
    fn test_renamed_column_reported() {
        let exp = names(&["Username", "NaturalId", "Amount"]);
        let got = names(&["Username", "Natural", "Amount"]);
        match validate_header(&got, &exp) {
            Err(PipelineError::SchemaMismatch { diffs, .. }) => {
                assert_eq!(diffs.len(), 1);
                assert_eq!(diffs[0].position, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_length_mismatch_reports_extra_positions() {
        let exp = names(&["a", "b"]);
        match validate_header(&names(&["a", "b", "c"]), &exp) {
            Err(PipelineError::SchemaMismatch {
                expected_len,
                found_len,
                diffs,
            }) => {
                assert_eq!((expected_len, found_len), (2, 3));
                assert_eq!(diffs[0].position, 3);
                assert_eq!(diffs[0].expected, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(validate_header(&names(&["a"]), &exp).is_err());
        assert!(validate_header(&[], &exp).is_err());
    }

    #[test]
    fn test_read_header_trims_and_widens() {
        let sheet = Sheet::with_rows(
            "raw",
            vec![text_row(&["a", "b", "", "d"]), text_row(&["1"])],
        );
        assert_eq!(read_header(&sheet, 1, 2).unwrap(), names(&["a", "b", "", "d"]));
        let sheet = Sheet::with_rows("raw", vec![text_row(&["a", ""])]);
        assert_eq!(read_header(&sheet, 1, 6).unwrap(), names(&["a"]));
    }
}
