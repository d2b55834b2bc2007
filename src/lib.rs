pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod history;
pub mod pivot;
pub mod staging;
pub mod workbook;
pub mod workflow;

pub use config::Config;
pub use error::PipelineError;
pub use workbook::{Workbook, WorkbookStore};
pub use workflow::{RunSummary, Workflow};
