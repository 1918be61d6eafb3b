//! Saving completed export artifacts.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use gradelens_core::{ExportFormat, ExportType};

/// `<export_type>_<YYYY-MM-DD>.<ext>`
pub fn download_filename(export_type: ExportType, format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "{}_{}.{}",
        export_type.as_str(),
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// A resolved artifact, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    /// Write the artifact into `dir` under its download filename.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.filename);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}
