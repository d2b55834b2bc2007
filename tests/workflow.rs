use anyhow::Result;
use sheetflow::{
    config::Config,
    error::PipelineError,
    export,
    pivot::PivotRow,
    workbook::{text_row, Cell, Sheet, Workbook, WorkbookStore},
    Workflow,
};
use std::collections::BTreeSet;
use tempfile::tempdir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const HEADER: [&str; 6] = ["Username", "NaturalId", "Name", "StorageType", "Ticker", "Amount"];

fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn seeded(rows: &[[&str; 6]]) -> Workbook {
    let mut grid = vec![text_row(&HEADER)];
    grid.extend(
        rows.iter()
            .map(|r| r.iter().map(|v| Cell::parse(v)).collect::<Vec<_>>()),
    );
    let mut wb = Workbook::new();
    wb.insert_sheet(Sheet::with_rows("RAW_DATA", grid));
    wb.insert_sheet(Sheet::new("Second Experiment"));
    wb
}

fn example() -> Workbook {
    seeded(&[
        ["ann", "N1", "Iron Ore", "STORE", "FE", "12"],
        ["bob", "N2", "Fuel Cell", "FTL_FUEL_STORE", "SF", "400"],
        ["cid", "N3", "Iron Ore", "STORE", "FE", "3"],
    ])
}

fn pr(flag: &str, count: usize) -> PivotRow {
    PivotRow {
        flag: flag.into(),
        count,
    }
}

fn flags_in_staging(wb: &Workbook) -> Vec<String> {
    let sheet = wb.sheet("Second Experiment").unwrap();
    (2..=sheet.last_row())
        .map(|r| sheet.cell(r, 14).as_str().into_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[test]
fn test_full_run_example() -> Result<()> {
    init_test_logging();
    let mut wb = example();
    let mut wf = Workflow::new(Config::default())?;
    let summary = wf.run(&mut wb)?;

    assert_eq!(flags_in_staging(&wb), vec!["BASE", "FUEL", "BASE"]);
    assert_eq!(summary.filtered_rows, 2);
    assert_eq!(summary.pivot, vec![pr("BASE", 2), pr("FUEL", 1)]);

    let data = wb.sheet("Second Experiment").unwrap();
    // mirror: header + formula, no copied data
    assert_eq!(data.cell(1, 1), &Cell::text("Username"));
    assert!(matches!(data.cell(2, 1), Cell::Formula(_)));
    assert!(data.cell(3, 1).is_blank());
    // filtered block at P, raw header shape
    assert_eq!(data.cell(1, 16), &Cell::text("Username"));
    assert_eq!(data.cell(1, 21), &Cell::text("Amount"));
    assert!(data.cell(1, 22).is_blank());
    assert_eq!(data.cell(3, 16), &Cell::text("cid"));

    let pivot = wb.sheet("PivotSheet").unwrap();
    assert_eq!(pivot.cell(1, 24), &Cell::text("FLAG"));
    assert_eq!(pivot.cell(3, 24), &Cell::text("FUEL"));
    assert_eq!(pivot.cell(3, 25), &Cell::Number(1.0));
    Ok(())
}

#[test]
fn test_second_run_is_identical() -> Result<()> {
    init_test_logging();
    let mut wb = example();
    let mut wf = Workflow::new(Config::default())?;
    let first = wf.run(&mut wb)?;
    let data_after_first = wb.sheet("Second Experiment").unwrap().clone();
    let pivot_after_first = wb.sheet("PivotSheet").unwrap().clone();

    wf.invalidate_cache();
    let second = wf.run(&mut wb)?;
    assert_eq!(first.pivot, second.pivot);
    assert_eq!(first.filtered_rows, second.filtered_rows);
    assert_eq!(wb.sheet("Second Experiment").unwrap(), &data_after_first);
    assert_eq!(wb.sheet("PivotSheet").unwrap(), &pivot_after_first);
    Ok(())
}

#[test]
fn test_empty_dataset_stops_before_staging() {
    init_test_logging();
    let mut wb = seeded(&[]);
    wb.sheet_mut("Second Experiment")
        .unwrap()
        .set_values(1, 8, &[text_row(&["previous"])])
        .unwrap();
    let mut wf = Workflow::new(Config::default()).unwrap();
    let err = wf.run(&mut wb).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::EmptyDataset(_))
    ));
    // the mirror was already rewritten; staging was never reached
    let data = wb.sheet("Second Experiment").unwrap();
    assert!(matches!(data.cell(2, 1), Cell::Formula(_)));
    assert_eq!(data.cell(1, 8), &Cell::text("previous"));
}

#[test]
fn test_header_mismatch_names_position() {
    init_test_logging();
    let mut wb = example();
    wb.sheet_mut("RAW_DATA")
        .unwrap()
        .set_cell(1, 7, Cell::text("Extra"))
        .unwrap();
    let mut wf = Workflow::new(Config::default()).unwrap();
    let err = wf.run(&mut wb).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::SchemaMismatch { diffs, .. }) => {
            assert_eq!(diffs[0].position, 7);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(format!("{:#}", err).contains("Data.ensureMirror failed"));
}

#[test]
fn test_everything_filtered_still_pivots_flagged_rows() -> Result<()> {
    init_test_logging();
    let mut wb = example();
    let cfg = Config {
        filter_flags: BTreeSet::from(["FUEL".to_string(), "BASE".to_string()]),
        ..Config::default()
    };
    let mut wf = Workflow::new(cfg)?;
    let summary = wf.run(&mut wb)?;

    assert_eq!(summary.filtered_rows, 0);
    assert_eq!(summary.pivot, vec![pr("BASE", 2), pr("FUEL", 1)]);
    let data = wb.sheet("Second Experiment").unwrap();
    assert_eq!(data.cell(1, 16), &Cell::text("Username"));
    assert!(data.cell(2, 16).is_blank());
    Ok(())
}

#[test]
fn test_store_run_export_roundtrip() -> Result<()> {
    init_test_logging();
    let tmp = tempdir()?;
    let store = WorkbookStore::new(tmp.path().join("wb"));
    store.save(&example())?;

    let mut wb = store.load()?;
    let mut wf = Workflow::new(Config::default())?;
    wf.run(&mut wb)?;
    store.save(&wb)?;

    let reloaded = store.load()?;
    assert_eq!(
        reloaded.sheet("PivotSheet").unwrap().cell(2, 25).as_number(),
        Some(2.0)
    );
    assert_eq!(
        reloaded.sheet("Runtime Logs").unwrap().cell(2, 2),
        &Cell::text("Success")
    );

    let out = tmp.path().join("export");
    let written = export::export_workbook(&reloaded, wf.config(), &out)?;
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "mirror.parquet",
            "staged.parquet",
            "filtered.parquet",
            "pivot.parquet"
        ]
    );
    Ok(())
}
