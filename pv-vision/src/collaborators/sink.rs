//! Report persistence

use super::ReportSink;
use crate::error::Result;
use crate::report::SessionReport;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes each report to `<dir>/<exercise>-<timestamp>.txt`
#[derive(Debug, Clone)]
pub struct FileReportSink {
    directory: PathBuf,
}

impl FileReportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(report: &SessionReport) -> String {
        let exercise: String = report
            .summary
            .exercise
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!(
            "{}-{}.txt",
            exercise.trim_matches('-'),
            report.summary.generated_at.format("%Y%m%dT%H%M%S%.3fZ")
        )
    }
}

impl ReportSink for FileReportSink {
    fn store(&self, report: &SessionReport) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(report));
        fs::write(&path, &report.text)?;
        info!("Report written to {}", path.display());
        Ok(Some(path))
    }
}

/// Discards reports
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReportSink;

impl ReportSink for NullReportSink {
    fn store(&self, _report: &SessionReport) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
