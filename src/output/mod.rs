//! Output module for reporting on and exporting a harvest database

mod export;
pub mod stats;

pub use export::{export_csv, write_csv};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
