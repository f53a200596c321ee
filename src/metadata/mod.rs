pub mod jsonl;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::carve::CarvedFile;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub device_path: String,
    pub state: String,
    pub total_bytes: u64,
    pub bytes_scanned: u64,
    pub bytes_skipped: u64,
    pub segments_found: u64,
    pub segments_saved: u64,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Manifest of what a session wrote.
///
/// # Example
/// ```rust
/// use photocarve::metadata::{self, MetadataSink, RunSummary};
/// use std::path::PathBuf;
///
/// let output_root = std::env::temp_dir().join("photocarve_meta_example");
/// std::fs::create_dir_all(&output_root).unwrap();
///
/// let sink = metadata::build_sink(
///     true,
///     "0.1.0",
///     "config-hash",
///     PathBuf::from("image.raw").as_path(),
///     &output_root,
/// )
/// .unwrap();
///
/// let summary = RunSummary {
///     run_id: "example_run".to_string(),
///     device_path: "image.raw".to_string(),
///     state: "completed".to_string(),
///     total_bytes: 0,
///     bytes_scanned: 0,
///     bytes_skipped: 0,
///     segments_found: 0,
///     segments_saved: 0,
///     error: None,
/// };
/// sink.record_run_summary(&summary).unwrap();
/// sink.flush().unwrap();
/// ```
pub trait MetadataSink: Send {
    fn record_file(&self, file: &CarvedFile) -> Result<(), MetadataError>;
    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError>;
    fn flush(&self) -> Result<(), MetadataError>;
}

/// Sink used when the manifest is disabled.
pub struct NoopSink;

impl MetadataSink for NoopSink {
    fn record_file(&self, _file: &CarvedFile) -> Result<(), MetadataError> {
        Ok(())
    }
    fn record_run_summary(&self, _summary: &RunSummary) -> Result<(), MetadataError> {
        Ok(())
    }
    fn flush(&self) -> Result<(), MetadataError> {
        Ok(())
    }
}

pub fn build_sink(
    enabled: bool,
    tool_version: &str,
    config_hash: &str,
    device_path: &Path,
    output_root: &Path,
) -> Result<Box<dyn MetadataSink>, MetadataError> {
    if !enabled {
        return Ok(Box::new(NoopSink));
    }
    Ok(Box::new(jsonl::JsonlSink::new(
        tool_version,
        config_hash,
        device_path,
        output_root,
    )?))
}
