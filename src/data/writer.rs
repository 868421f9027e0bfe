//! Semicolon-delimited report files.
//!
//! One file per run: a header row from the series names, any header fields,
//! then the data rows. The configured file name gets a timestamp suffix so
//! repeated runs never clobber an earlier report.

use crate::data::Series;
use crate::error::AppResult;
use log::{debug, info};
use std::path::{Path, PathBuf};

pub struct SeriesWriter {
    path: PathBuf,
    dry_run: bool,
}

impl SeriesWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dry_run: false,
        }
    }

    /// Log what would be written without touching the filesystem.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    fn unique_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%d-%m-%Y_%H-%M-%S");
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "report".to_string());
        let extension = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "csv".to_string());
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{stem}_{stamp}.{extension}"))
    }

    /// Write the series to a timestamped file, returning the path written.
    pub fn write(&self, series: &Series) -> AppResult<PathBuf> {
        let path = self.unique_path();
        if self.dry_run {
            debug!("-> Dry run, skipping report file at {}", path.display());
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // header-field rows are name/value pairs regardless of column count
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_path(&path)?;
        writer.write_record(series.headers())?;
        for (name, value) in series.header_fields() {
            writer.write_record([name.as_str(), value.as_str()])?;
        }
        for row in series.rows() {
            let record: Vec<String> = row
                .iter()
                .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!("-> Report file written at {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_series() -> Series {
        let mut volts = Series::new("v");
        volts.add_header_field("dut", "ips8200hq");
        volts.add_data_point(Some(1.0));
        volts.add_data_point(Some(2.5));
        let mut amps = Series::new("i");
        amps.add_data_point(Some(0.1));
        volts.join(amps)
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv"));
        let path = writer.write(&sample_series()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("v;i"));
        assert_eq!(lines.next(), Some("dut;ips8200hq"));
        assert_eq!(lines.next(), Some("1;0.1"));
        assert_eq!(lines.next(), Some("2.5;"));
    }

    #[test]
    fn test_timestamp_suffix_keeps_stem() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv"));
        let path = writer.write(&sample_series()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("power_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("power.csv")).dry_run();
        let path = writer.write(&sample_series()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SeriesWriter::new(dir.path().join("nested/run/power.csv"));
        let path = writer.write(&sample_series()).unwrap();
        assert!(path.exists());
    }
}
