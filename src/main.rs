use anyhow::Result;
use clap::{Parser, Subcommand};
use sheetflow::{export, Config, Workflow, WorkbookStore};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Mirror, flag, filter and pivot a spreadsheet workbook"
)]
struct Args {
    /// Workbook directory (one CSV per sheet)
    #[arg(short, long, default_value = "./workbook")]
    workbook: PathBuf,
    /// YAML config; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full workflow
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the mirror, staging and pivot sheets
    Reset,
    /// Rebuild the pivot from the staged block already in the workbook
    Pivot,
    /// Write the workbook's sections to Parquet
    Export {
        #[arg(long, default_value = "./export")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();

    // ─── 2) config + workbook ────────────────────────────────────────
    let cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let store = WorkbookStore::new(&args.workbook);
    let mut wb = store.load()?;
    info!(workbook = %store.dir().display(), "loaded workbook");

    let mut workflow = Workflow::new(cfg)?;

    // ─── 3) dispatch ─────────────────────────────────────────────────
    match args.command {
        Command::Run { json } => {
            let result = workflow.run(&mut wb);
            // earlier stages' writes are kept even when a later one fails
            store.save(&wb)?;
            let summary = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "staged {} rows, kept {} after filtering, {} pivot groups",
                    summary.staged_rows,
                    summary.filtered_rows,
                    summary.pivot.len()
                );
            }
        }
        Command::Reset => {
            workflow.reset(&mut wb)?;
            store.save(&wb)?;
        }
        Command::Pivot => {
            let rows = workflow.rebuild_pivot(&mut wb)?;
            store.save(&wb)?;
            for row in rows {
                println!("{}\t{}", row.flag, row.count);
            }
        }
        Command::Export { out } => {
            let written = export::export_workbook(&wb, workflow.config(), &out)
                .inspect_err(|e| error!("export failed: {:#}", e))?;
            for path in written {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}
