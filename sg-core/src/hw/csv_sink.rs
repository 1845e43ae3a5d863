//! CSV event log
//!
//! Append-only file with the header `Time,Threat,Distance,Raining`, written
//! once when the file is new or empty. Every row is flushed as soon as it is
//! written.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sg_error::{Result, SkyguardError};
use tracing::info;

use super::EventSink;
use crate::constants::event_log::{CSV_HEADER, TIME_FORMAT};
use crate::data::EventRecord;

/// One CSV row, without the line terminator
pub fn format_csv_row(record: &EventRecord) -> String {
    let distance = record
        .distance_cm
        .map(|cm| format!("{:.2}", cm))
        .unwrap_or_default();
    format!(
        "{},{},{},{}",
        record.timestamp.format(TIME_FORMAT),
        record.severity,
        distance,
        if record.is_raining { "True" } else { "False" }
    )
}

pub struct CsvEventSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvEventSink {
    pub fn open(path: &Path) -> Result<Self> {
        let write_err = |e| SkyguardError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(write_err)?;
        let is_empty = file.metadata().map_err(write_err)?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{}", CSV_HEADER).map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }

        info!("Logging events to {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn write_err(&self, e: std::io::Error) -> SkyguardError {
        SkyguardError::FileWrite {
            path: self.path.clone(),
            source: e,
        }
    }
}

impl EventSink for CsvEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<()> {
        writeln!(self.writer, "{}", format_csv_row(record)).map_err(|e| self.write_err(e))?;
        self.writer.flush().map_err(|e| self.write_err(e))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.write_err(e))?;
        self.writer.get_ref().sync_data().map_err(|e| self.write_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Severity;
    use chrono::{Local, TimeZone};
    use std::fs;
    use tempfile::TempDir;

    fn record(severity: Severity, distance_cm: Option<f64>, is_raining: bool) -> EventRecord {
        EventRecord {
            timestamp: Local.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap(),
            severity,
            distance_cm,
            is_raining,
        }
    }

    #[test]
    fn test_row_format() {
        assert_eq!(
            format_csv_row(&record(Severity::Severe, Some(120.0), false)),
            "2024-05-17 14:03:09,severe,120.00,False"
        );
        assert_eq!(
            format_csv_row(&record(Severity::Mild, Some(3.14159), true)),
            "2024-05-17 14:03:09,mild,3.14,True"
        );
        assert_eq!(
            format_csv_row(&record(Severity::Moderate, None, false)),
            "2024-05-17 14:03:09,moderate,,False"
        );
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/skyguard_log.csv");

        {
            let mut sink = CsvEventSink::open(&path).unwrap();
            sink.append(&record(Severity::Mild, Some(50.0), false)).unwrap();
        }
        {
            let mut sink = CsvEventSink::open(&path).unwrap();
            sink.append(&record(Severity::Severe, Some(75.5), true)).unwrap();
            sink.flush().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Time,Threat,Distance,Raining\n\
             2024-05-17 14:03:09,mild,50.00,False\n\
             2024-05-17 14:03:09,severe,75.50,True\n"
        );
    }

    #[test]
    fn test_rows_visible_without_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvEventSink::open(&path).unwrap();
        sink.append(&record(Severity::Moderate, Some(1.0), false)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
