//! Durable CSV sink
//!
//! Header `Timestamp,<col1>,<col2>,...` is written and flushed on open. Every
//! row is flushed as soon as it is written. After `close`, `append_row`
//! silently does nothing.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::{ModlogError, Result};
use crate::time::format_timestamp;

/// Placeholder replaced by the session start time in sink path templates
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

/// Append-only CSV writer
#[derive(Debug)]
pub struct CsvSink {
    writer: Option<csv::Writer<File>>,
    columns: Vec<String>,
    path: PathBuf,
    rows_written: usize,
}

impl CsvSink {
    /// Create (truncate) the file and write the header row
    pub fn open(path: impl AsRef<Path>, columns: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ModlogError::io(format!("{}: {}", parent.display(), e)))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| ModlogError::io(format!("{}: {}", path.display(), e)))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        let header = std::iter::once("Timestamp").chain(columns.iter().map(String::as_str));
        writer.write_record(header)?;
        writer.flush()?;

        info!("CSV sink opened: {} ({} columns)", path.display(), columns.len());
        Ok(Self {
            writer: Some(writer),
            columns: columns.to_vec(),
            path,
            rows_written: 0,
        })
    }

    /// Write one row; columns missing from `values` render as empty fields
    pub fn append_row(
        &mut self,
        timestamp: &DateTime<Local>,
        values: &HashMap<String, f64>,
    ) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mut record = Vec::with_capacity(self.columns.len() + 1);
        record.push(format_timestamp(timestamp));
        for column in &self.columns {
            record.push(values.get(column).map(|v| format_value(*v)).unwrap_or_default());
        }

        writer.write_record(&record)?;
        writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush and release the file; safe to call more than once
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                debug!("CSV sink flush on close failed: {}", e);
            }
            info!(
                "CSV sink closed: {} ({} rows)",
                self.path.display(),
                self.rows_written
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shortest round-trip rendering that keeps `.0` on integral values
pub fn format_value(value: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_string()
}

/// Expand `{timestamp}` in a sink path template (`%Y%m%d_%H%M%S`)
pub fn expand_path(template: &str, now: &DateTime<Local>) -> PathBuf {
    PathBuf::from(template.replace(
        TIMESTAMP_PLACEHOLDER,
        &now.format("%Y%m%d_%H%M%S").to_string(),
    ))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::milliseconds(123)
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_header_written_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let _sink = CsvSink::open(&path, &cols(&["a", "b"])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Timestamp,a,b\n");
    }

    #[test]
    fn test_append_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path, &cols(&["a", "b"])).unwrap();

        let values = HashMap::from([("a".to_string(), 1.0), ("b".to_string(), 2.0)]);
        sink.append_row(&ts(), &values).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[0], vec!["Timestamp", "a", "b"]);
        assert_eq!(rows[1], vec!["2024-05-06 07:08:09.123", "1.0", "2.0"]);
        assert_eq!(sink.rows_written(), 1);
    }

    #[test]
    fn test_missing_column_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path, &cols(&["a", "b", "c"])).unwrap();

        let values = HashMap::from([("b".to_string(), 0.5), ("zzz".to_string(), 9.0)]);
        sink.append_row(&ts(), &values).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().nth(1).unwrap(), "2024-05-06 07:08:09.123,,0.5,");
    }

    #[test]
    fn test_append_after_close_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path, &cols(&["a"])).unwrap();
        sink.close();
        sink.close();
        assert!(!sink.is_open());

        let values = HashMap::from([("a".to_string(), 1.0)]);
        assert!(sink.append_row(&ts(), &values).is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Timestamp,a\n");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/log.csv");
        assert!(CsvSink::open(&path, &cols(&["a"])).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_open_failure_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a file
        let err = CsvSink::open(dir.path(), &cols(&["a"])).unwrap_err();
        assert!(matches!(err, ModlogError::IoError(_)));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1.0");
        assert_eq!(format_value(42.0), "42.0");
        assert_eq!(format_value(0.1), "0.1");
        assert_eq!(format_value(-2.5), "-2.5");
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("data/modbus_log_{timestamp}.csv", &ts());
        assert_eq!(path, PathBuf::from("data/modbus_log_20240506_070809.csv"));
        assert_eq!(expand_path("fixed.csv", &ts()), PathBuf::from("fixed.csv"));
    }
}
