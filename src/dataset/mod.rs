//! Earthquake datasets: synthetic generation, CSV I/O and summary statistics

pub mod generator;
pub mod io;
pub mod summary;

pub use generator::{assign_alert, DatasetGenerator};
pub use io::{read_table, to_csv_string, write_dataset, RawTable};
pub use summary::DatasetSummary;
