//! CSV input and output.

use crate::cache::RunCache;
use crate::normalize::{ResultRecord, RESULT_COLUMNS};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;

/// A CSV file read into memory.
#[derive(Debug, Clone)]
pub struct InputTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl InputTable {
    /// Read a CSV file with a header row.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Read CSV data with a header row.
    ///
    /// Every row ends up as wide as the widest line: short rows are padded
    /// with blanks, and rows longer than the header add unnamed columns.
    pub fn from_reader<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
        }

        let width = rows.iter().map(Vec::len).fold(headers.len(), usize::max);
        headers.resize(width, String::new());
        for row in &mut rows {
            row.resize(width, String::new());
        }

        Ok(Self { headers, rows })
    }

    /// Column headers.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Resolve a column by exact header name or 1-based position.
    pub fn column_index(&self, selector: &str) -> anyhow::Result<usize> {
        let selector = selector.trim();

        if let Some(idx) = self
            .headers
            .iter()
            .position(|h| !h.is_empty() && h == selector)
        {
            return Ok(idx);
        }

        match selector.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.headers.len() => Ok(n - 1),
            _ => anyhow::bail!(
                "Invalid column choice '{}': expected a header name or a number from 1 to {}",
                selector,
                self.headers.len()
            ),
        }
    }

    /// Trimmed values of a column, one per row, blanks included.
    pub fn column_values(&self, column: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(column).map(|v| v.trim().to_string()).unwrap_or_default())
            .collect()
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.csv` using local time.
pub fn timestamped_filename(prefix: &str) -> String {
    format!("{}_{}.csv", prefix, chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Write result records under the five result columns.
pub fn write_records(dir: &Path, filename: &str, records: &[ResultRecord]) -> anyhow::Result<PathBuf> {
    let path = prepare(dir, filename)?;
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    if records.is_empty() {
        writer.write_record(RESULT_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = records.len(), "Wrote results");
    Ok(path)
}

/// Write every input row with the five result columns appended.
///
/// Rows whose IP cell is blank get an unavailable record with an empty IP.
pub fn write_extended(
    dir: &Path,
    filename: &str,
    table: &InputTable,
    ip_column: usize,
    cache: &RunCache,
) -> anyhow::Result<PathBuf> {
    let path = prepare(dir, filename)?;
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let header = table
        .headers()
        .iter()
        .map(String::as_str)
        .chain(RESULT_COLUMNS);
    writer.write_record(header)?;

    for row in table.rows() {
        let ip = row.get(ip_column).map(|v| v.trim()).unwrap_or_default();
        let record = cache.record_for(ip);
        let fields = row
            .iter()
            .map(String::as_str)
            .chain(record.values());
        writer.write_record(fields)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = table.rows().len(), "Wrote extended results");
    Ok(path)
}

fn prepare(dir: &Path, filename: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir.join(filename))
}
