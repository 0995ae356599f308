//! CSV snapshot export.
//!
//! One file per source kind, plus an optional combined file joining each
//! property row with the latest environment readings.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use indexmap::{IndexMap, IndexSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ExportResult;
use crate::stores::Snapshot;
use crate::traits::sink::{PersistReport, SnapshotSink};
use crate::types::{
    record::{FieldValue, Record},
    target::SourceKind,
};

const SEPARATOR: char = ',';

/// Prefix for environment columns in the combined file.
pub const ENV_PREFIX: &str = "env_";

/// Last column of every file: when the row's record was scraped.
pub const SCRAPED_AT_COLUMN: &str = "scrape_timestamp";

/* ---------------- Writing ---------------- */

fn needs_quotes(cell: &str) -> bool {
    cell.contains(SEPARATOR) || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

/// Write one row, quoting cells that contain the separator, quotes or line breaks.
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{SEPARATOR}")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// Union of field names across `records`, in first-seen order.
pub fn header_union<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<String> {
    let mut header = IndexSet::new();
    for record in records {
        for name in record.field_names() {
            if !header.contains(name) {
                header.insert(name.to_string());
            }
        }
    }
    header.into_iter().collect()
}

/// Render `rows` under `header`. Missing cells are empty.
pub fn render_table<'a>(
    header: &[String],
    rows: impl IntoIterator<Item = &'a IndexMap<String, FieldValue>>,
) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    write_row(&mut out, header)?;

    for fields in rows {
        let row: Vec<String> = header
            .iter()
            .map(|name| fields.get(name).map(ToString::to_string).unwrap_or_default())
            .collect();
        write_row(&mut out, &row)?;
    }

    Ok(out)
}

/// A record's fields plus its scrape time.
pub fn stamped_row(record: &Record) -> IndexMap<String, FieldValue> {
    let mut row = record.fields.clone();
    row.entry(SCRAPED_AT_COLUMN.to_string())
        .or_insert_with(|| FieldValue::Text(record.scraped_at.to_rfc3339()));
    row
}

/// Move the scrape time column to the end of `header`, adding it if absent.
fn with_stamp_last(header: Vec<String>) -> Vec<String> {
    let mut header: Vec<String> = header
        .into_iter()
        .filter(|name| name != SCRAPED_AT_COLUMN)
        .collect();
    header.push(SCRAPED_AT_COLUMN.to_string());
    header
}

/// Each property row extended with environment fields.
///
/// Environment fields are folded in snapshot order, so a later reading
/// overrides an earlier one for the same column. The scrape time is the
/// property record's.
pub fn combined_rows(snapshot: &Snapshot) -> Vec<IndexMap<String, FieldValue>> {
    let mut environment: IndexMap<String, FieldValue> = IndexMap::new();
    for record in snapshot.by_kind(SourceKind::Environment) {
        for (name, value) in &record.fields {
            environment.insert(format!("{ENV_PREFIX}{name}"), value.clone());
        }
    }

    snapshot
        .by_kind(SourceKind::Property)
        .map(|record| {
            let mut row = record.fields.clone();
            row.extend(environment.iter().map(|(k, v)| (k.clone(), v.clone())));
            row.insert(
                SCRAPED_AT_COLUMN.to_string(),
                FieldValue::Text(record.scraped_at.to_rfc3339()),
            );
            row
        })
        .collect()
}

/* ---------------- Exporter ---------------- */

/// Writes snapshots as timestamped CSV files under one directory.
///
/// File names follow `{stem}_{City}_{ST}_{YYYYmmdd_HHMMSS}.csv`, where the
/// stem is `properties`, `environment` or `combined`.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
    city: String,
    state: String,
    combined: bool,
    timestamp: NaiveDateTime,
}

impl CsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>, city: &str, state: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            city: file_component(city),
            state: file_component(state).to_uppercase(),
            combined: false,
            timestamp: Local::now().naive_local(),
        }
    }

    /// Also write the combined property and environment file.
    pub fn with_combined(mut self, enabled: bool) -> Self {
        self.combined = enabled;
        self
    }

    /// Fix the timestamp used in file names.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{stem}_{}_{}_{}.csv",
            self.city,
            self.state,
            self.timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    async fn write_file(&self, stem: &str, contents: Vec<u8>) -> ExportResult<PathBuf> {
        let path = self.output_dir.join(self.file_name(stem));
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

/// Words joined by `_`, keeping only letters, digits, `-` and `_`, so a
/// name can never leave the output directory.
fn file_component(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl SnapshotSink for CsvExporter {
    async fn persist(&self, snapshot: &Snapshot) -> ExportResult<PersistReport> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut report = PersistReport::default();

        for kind in SourceKind::ALL {
            let records: Vec<&Record> = snapshot.by_kind(kind).collect();
            if records.is_empty() {
                debug!(kind = %kind, "No records, skipping CSV");
                continue;
            }

            let header = with_stamp_last(header_union(records.iter().copied()));
            let rows: Vec<_> = records.iter().map(|record| stamped_row(record)).collect();
            let contents = render_table(&header, &rows)?;
            let path = self.write_file(kind.file_stem(), contents).await?;

            info!(kind = %kind, rows = records.len(), path = %path.display(), "CSV written");
            report.records += records.len();
            report.files.push(path);
        }

        if self.combined {
            let rows = combined_rows(snapshot);
            if !rows.is_empty() {
                let header = with_stamp_last(header_union_of_rows(&rows));
                let contents = render_table(&header, &rows)?;
                let path = self.write_file("combined", contents).await?;

                info!(rows = rows.len(), path = %path.display(), "Combined CSV written");
                report.files.push(path);
            }
        }

        Ok(report)
    }

    fn name(&self) -> &str {
        "csv"
    }
}

fn header_union_of_rows(rows: &[IndexMap<String, FieldValue>]) -> Vec<String> {
    let mut header: IndexSet<&str> = IndexSet::new();
    for row in rows {
        header.extend(row.keys().map(String::as_str));
    }
    header.into_iter().map(str::to_string).collect()
}
