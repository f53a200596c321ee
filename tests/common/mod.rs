//! Shared test infrastructure for session tests.
//!
//! Builds synthetic device images with JPEG markers at known offsets and
//! runs a full session against them, collecting every emitted event.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use photocarve::config;
use photocarve::constants::{CARVED_FILES_NAME, MANIFEST_DIR, RUN_SUMMARY_NAME};
use photocarve::device::{DeviceError, DeviceSource};
use photocarve::pipeline::events::{SessionEvent, SessionReport};
use photocarve::pipeline::{ScanSession, SessionSettings};
use photocarve::scanner::{self, SignatureScanner};

pub const APP0: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
pub const APP1: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE1];
pub const FILLER: u8 = 0x5A;

pub fn insert_bytes(target: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if end > target.len() {
        target.resize(end, FILLER);
    }
    target[offset..end].copy_from_slice(data);
}

/// Image of `len` filler bytes.
pub fn blank_image(len: usize) -> Vec<u8> {
    vec![FILLER; len]
}

/// A JFIF-style body: APP0 marker followed by filler, `len` bytes total.
pub fn jfif_body(len: usize) -> Vec<u8> {
    let mut out = APP0.to_vec();
    out.resize(len.max(APP0.len()), FILLER);
    out
}

/// A JPEG carrying an Exif `DateTimeOriginal`, padded with filler to `len` bytes.
pub fn exif_jpeg(date: &str, len: usize) -> Vec<u8> {
    let mut tiff = vec![0x49, 0x49, 0x2A, 0x00];
    tiff.extend_from_slice(&8u32.to_le_bytes());
    // IFD0 -> Exif IFD at 26
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    // Exif IFD -> DateTimeOriginal at 44
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&(date.len() as u32 + 1).to_le_bytes());
    tiff.extend_from_slice(&44u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(date.as_bytes());
    tiff.push(0);

    let mut jpeg = APP1.to_vec();
    let seg_len = (2 + 6 + tiff.len()) as u16;
    jpeg.extend_from_slice(&seg_len.to_be_bytes());
    jpeg.extend_from_slice(b"Exif\0\0");
    jpeg.extend_from_slice(&tiff);
    jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
    jpeg.resize(len.max(jpeg.len()), FILLER);
    jpeg
}

pub fn test_settings(run_id: &str) -> SessionSettings {
    let loaded = config::load_config(None).expect("config");
    let mut settings = SessionSettings::from_config(&loaded);
    settings.run_id = run_id.to_string();
    settings
}

pub fn test_scanner() -> Arc<dyn SignatureScanner> {
    let loaded = config::load_config(None).expect("config");
    let sig_scanner = scanner::build_signature_scanner(&loaded.config).expect("scanner");
    Arc::from(sig_scanner)
}

pub struct SessionRun {
    pub report: SessionReport,
    pub events: Vec<SessionEvent>,
}

impl SessionRun {
    pub fn logs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Log(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<f64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Completed(_)))
            .count()
    }
}

/// Writes `bytes` as an image file and scans it into `output_root`.
pub fn run_on_bytes(bytes: &[u8], settings: SessionSettings, output_root: &Path) -> SessionRun {
    let image_dir = tempfile::tempdir().expect("tempdir");
    let input_path = image_dir.path().join("card.img");
    fs::write(&input_path, bytes).expect("write input");
    run_on_path(&input_path, settings, output_root)
}

pub fn run_on_path(input_path: &Path, settings: SessionSettings, output_root: &Path) -> SessionRun {
    let (tx, rx) = crossbeam_channel::unbounded();
    let session = ScanSession::new(settings, test_scanner(), output_root, tx);
    let report = session.run(input_path);
    SessionRun {
        report,
        events: rx.try_iter().collect(),
    }
}

pub fn run_on_source(
    source: Box<dyn DeviceSource>,
    settings: SessionSettings,
    output_root: &Path,
) -> SessionRun {
    let (tx, rx) = crossbeam_channel::unbounded();
    let session = ScanSession::new(settings, test_scanner(), output_root, tx);
    let report = session.run_with_source(Path::new("memory"), source);
    SessionRun {
        report,
        events: rx.try_iter().collect(),
    }
}

/// In-memory device with unreadable byte ranges.
pub struct MemorySource {
    pub data: Vec<u8>,
    pub bad: Vec<Range<u64>>,
    pub reported_size: u64,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        let reported_size = data.len() as u64;
        Self {
            data,
            bad: Vec::new(),
            reported_size,
        }
    }
}

impl DeviceSource for MemorySource {
    fn size_hint(&self) -> u64 {
        self.reported_size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.bad.iter().any(|r| r.contains(&offset)) {
            return Err(io::Error::other("bad sector").into());
        }
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let mut end = (offset + buf.len() as u64).min(self.data.len() as u64);
        // stop short of the next bad range so it fails on the following read
        for range in &self.bad {
            if range.start > offset {
                end = end.min(range.start);
            }
        }
        let n = (end - offset) as usize;
        buf[..n].copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(n)
    }
}

/// Every carved file below the output root, sorted, relative to it.
pub fn carved_files(output_root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(output_root) else {
        return out;
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() || entry.file_name() == MANIFEST_DIR {
            continue;
        }
        for file in fs::read_dir(entry.path()).expect("date dir").flatten() {
            out.push(
                file.path()
                    .strip_prefix(output_root)
                    .expect("relative")
                    .to_path_buf(),
            );
        }
    }
    out.sort();
    out
}

pub fn manifest_lines(output_root: &Path) -> Vec<Value> {
    let path = output_root.join(MANIFEST_DIR).join(CARVED_FILES_NAME);
    let content = fs::read_to_string(path).expect("manifest");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

pub fn run_summary(output_root: &Path) -> Value {
    let path = output_root.join(MANIFEST_DIR).join(RUN_SUMMARY_NAME);
    let content = fs::read_to_string(path).expect("run summary");
    serde_json::from_str(&content).expect("json")
}
