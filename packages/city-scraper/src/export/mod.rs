//! Snapshot exporters.

pub mod csv;

pub use csv::CsvExporter;
