use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::carve::CarvedFile;
use crate::constants::{CARVED_FILES_NAME, MANIFEST_DIR, RUN_SUMMARY_NAME};
use crate::metadata::{MetadataError, MetadataSink, RunSummary};

pub struct JsonlSink {
    tool_version: String,
    config_hash: String,
    device_path: String,
    summary_path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct CarvedFileRecord<'a> {
    #[serde(flatten)]
    file: &'a CarvedFile,
    tool_version: &'a str,
    config_hash: &'a str,
    device_path: &'a str,
}

#[derive(Serialize)]
struct RunSummaryRecord<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    tool_version: &'a str,
    config_hash: &'a str,
}

impl JsonlSink {
    pub fn new(
        tool_version: &str,
        config_hash: &str,
        device_path: &Path,
        output_root: &Path,
    ) -> Result<Self, MetadataError> {
        let meta_dir = output_root.join(MANIFEST_DIR);
        std::fs::create_dir_all(&meta_dir)?;
        let file = File::create(meta_dir.join(CARVED_FILES_NAME))?;
        Ok(Self {
            tool_version: tool_version.to_string(),
            config_hash: config_hash.to_string(),
            device_path: device_path.to_string_lossy().to_string(),
            summary_path: meta_dir.join(RUN_SUMMARY_NAME),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl MetadataSink for JsonlSink {
    fn record_file(&self, file: &CarvedFile) -> Result<(), MetadataError> {
        let record = CarvedFileRecord {
            file,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
            device_path: &self.device_path,
        };
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_writer(&mut *guard, &record)?;
        guard.write_all(b"\n")?;
        Ok(())
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError> {
        let record = RunSummaryRecord {
            summary,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
        };
        let file = File::create(&self.summary_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), MetadataError> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateSource;

    #[test]
    fn writes_one_line_per_file() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let sink = JsonlSink::new("0.1.0", "abc", Path::new("/dev/sdz"), temp_dir.path())
            .expect("sink");
        let file = CarvedFile {
            run_id: "run".to_string(),
            path: "2020-01-01/0001.JPG".to_string(),
            date_folder: "2020-01-01".to_string(),
            date_source: DateSource::Fallback,
            capture_date: "2020-01-01T00:00:00".to_string(),
            global_start: 10,
            global_end: 2010,
            size: 2000,
            md5: "m".to_string(),
            sha256: "s".to_string(),
            pattern_id: "jpeg_app0".to_string(),
        };
        sink.record_file(&file).expect("record");
        sink.record_file(&file).expect("record");
        sink.flush().expect("flush");

        let content = std::fs::read_to_string(
            temp_dir.path().join(MANIFEST_DIR).join(CARVED_FILES_NAME),
        )
        .expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["date_source"], "fallback");
        assert_eq!(value["device_path"], "/dev/sdz");
        assert_eq!(value["global_start"], 10);
    }
}
