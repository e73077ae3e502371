//! The CSV file shared between the collector (single writer) and the viewer
//! (read-only).
//!
//! Writes are open-append-close per record, so the collector never holds the
//! file across notifications and every exit path releases it. Reads always
//! take the whole file.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::protocol::{CHANNEL_COUNT, CSV_HEADER};
use crate::types::{ChannelReadings, LogRecord};

// ── Writer ────────────────────────────────────────────────────────────────────

/// Append-only log of [`LogRecord`]s.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    /// Truncate (or create) the file at `path` and write the header row.
    ///
    /// Any data from a previous run is discarded.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create CSV log {}", path.display()))?;
        let mut w = csv::Writer::from_writer(file);
        w.write_record(CSV_HEADER)?;
        w.flush()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it. The file handle is dropped before returning.
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open CSV log {}", self.path.display()))?;
        let mut w = csv::Writer::from_writer(file);
        w.write_record(format_record(record))?;
        w.flush()?;
        Ok(())
    }
}

/// Render a record as CSV fields. `{:?}` keeps round-trip precision and always
/// prints a decimal point (`0.0`, `4.0`).
fn format_record(record: &LogRecord) -> [String; CHANNEL_COUNT + 1] {
    let [a, b, c, d] = record.readings.0;
    [
        format!("{:?}", record.timestamp),
        format!("{a:?}"),
        format!("{b:?}"),
        format!("{c:?}"),
        format!("{d:?}"),
    ]
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reasons a full read of the log can fail. None of them are fatal to the
/// viewer; they are reported and the read is retried on the next tick.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("file '{0}' not found")]
    NotFound(PathBuf),
    #[error("the CSV file is empty, waiting for data")]
    Empty,
    #[error("missing column '{0}' in CSV file")]
    MissingColumn(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Everything currently in the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub records: Vec<LogRecord>,
    /// Data rows that were present but could not be parsed (for example a line
    /// the collector was still writing when the file was read).
    pub skipped: usize,
}

/// Read and parse the entire log at `path`.
///
/// The five expected columns are looked up by name, so extra columns or a
/// different column order are accepted.
pub fn read_history(path: &Path) -> Result<History, HistoryError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(HistoryError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    parse_history(&bytes)
}

/// Parse log contents already in memory. See [`read_history`].
pub fn parse_history(bytes: &[u8]) -> Result<History, HistoryError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(HistoryError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut columns = [0usize; CHANNEL_COUNT + 1];
    for (slot, name) in columns.iter_mut().zip(CSV_HEADER) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or(HistoryError::MissingColumn(name))?;
    }

    let mut history = History::default();
    for row in reader.records() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Skipping unreadable CSV row: {e}");
                history.skipped += 1;
                continue;
            }
        };
        let field = |i: usize| row.get(columns[i]).and_then(|s| s.parse::<f64>().ok());
        match (field(0), field(1), field(2), field(3), field(4)) {
            (Some(timestamp), Some(a), Some(b), Some(c), Some(d)) => {
                history.records.push(LogRecord {
                    timestamp,
                    readings: ChannelReadings([a, b, c, d]),
                })
            }
            _ => {
                log::debug!("Skipping malformed CSV row: {:?}", row);
                history.skipped += 1;
            }
        }
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: f64, v: f64) -> LogRecord {
        LogRecord {
            timestamp: ts,
            readings: ChannelReadings([v, v * 2.0, v * 3.0, v * 4.0]),
        }
    }

    #[test]
    fn formats_with_decimal_point() {
        let fields = format_record(&record(1.0, 0.0));
        assert_eq!(fields, ["1.0", "0.0", "0.0", "0.0", "0.0"]);
    }

    #[test]
    fn parses_header_only_file_as_empty_history() {
        let h = parse_history(b"Time,670nm,850nm,950nm,1300nm\n").unwrap();
        assert!(h.records.is_empty());
        assert_eq!(h.skipped, 0);
    }

    #[test]
    fn empty_and_blank_files_are_reported() {
        assert!(matches!(parse_history(b""), Err(HistoryError::Empty)));
        assert!(matches!(parse_history(b"\n  \n"), Err(HistoryError::Empty)));
    }

    #[test]
    fn missing_column_is_named() {
        let err = parse_history(b"Time,670nm,850nm,950nm\n1.0,0.1,0.2,0.3\n").unwrap_err();
        assert!(matches!(err, HistoryError::MissingColumn("1300nm")));
        assert_eq!(err.to_string(), "missing column '1300nm' in CSV file");
    }

    #[test]
    fn columns_are_found_by_name() {
        let csv = b"1300nm,Time,950nm,850nm,670nm,extra\n4.0,10.5,3.0,2.0,1.0,x\n";
        let h = parse_history(csv).unwrap();
        assert_eq!(h.records, vec![LogRecord {
            timestamp: 10.5,
            readings: ChannelReadings([1.0, 2.0, 3.0, 4.0]),
        }]);
    }

    #[test]
    fn partial_trailing_row_is_skipped() {
        let csv = b"Time,670nm,850nm,950nm,1300nm\n1.0,0.1,0.2,0.3,0.4\n2.0,0.1,0.";
        let h = parse_history(csv).unwrap();
        assert_eq!(h.records.len(), 1);
        assert_eq!(h.skipped, 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_history(Path::new("/definitely/not/here/led_data.csv")).unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(_)));
    }
}
