//! # Device Module
//!
//! Raw, filesystem-agnostic access to a storage device and the sequential
//! chunk reader that tolerates unreadable sectors.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait DeviceSource: Send + Sync {
    /// Size reported by the device, or 0 when it cannot be queried.
    fn size_hint(&self) -> u64;
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

pub struct RawDeviceSource {
    file: File,
    size: u64,
    #[cfg(not(unix))]
    lock: std::sync::Mutex<()>,
}

impl RawDeviceSource {
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = File::open(path)?;
        let size = device_size(&file);
        debug!("opened device path={} size={}", path.display(), size);
        Ok(Self {
            file,
            size,
            #[cfg(not(unix))]
            lock: std::sync::Mutex::new(()),
        })
    }
}

impl DeviceSource for RawDeviceSource {
    fn size_hint(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }
        #[cfg(not(unix))]
        {
            use std::io::Read;
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut f = &self.file;
            f.seek(SeekFrom::Start(offset))?;
            Ok(f.read(buf)?)
        }
    }
}

/// Byte size of an open device or image file, 0 when unknown.
///
/// Regular files report their length through metadata; block devices report
/// zero there, so their end offset is queried instead.
pub fn device_size(file: &File) -> u64 {
    match file.metadata() {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            let mut f = file;
            f.seek(SeekFrom::End(0)).unwrap_or(0)
        }
    }
}

/// Maps a physical disk ordinal to the platform's raw device path.
pub fn disk_path(ordinal: u32) -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(format!(r"\\.\PhysicalDrive{ordinal}"))
    }
    #[cfg(not(windows))]
    {
        PathBuf::from(format!("/dev/sd{}", disk_letters(ordinal)))
    }
}

#[cfg_attr(windows, allow(dead_code))]
fn disk_letters(ordinal: u32) -> String {
    let mut n = ordinal as u64 + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Outcome of one sequential read step.
#[derive(Debug)]
pub enum ReadStep {
    Data { offset: u64, bytes: Vec<u8> },
    Skipped { offset: u64, len: u64 },
    End,
}

/// Sequential chunk reader bounded by the device total.
///
/// A failed read never aborts the scan: the cursor advances by the skip
/// stride and the caller decides what to do with the gap.
pub struct DeviceReader {
    source: Box<dyn DeviceSource>,
    cursor: u64,
    limit: u64,
    chunk_size: u64,
    skip_stride: u64,
}

impl DeviceReader {
    pub fn new(source: Box<dyn DeviceSource>, limit: u64, chunk_size: u64, skip_stride: u64) -> Self {
        Self {
            source,
            cursor: 0,
            limit,
            chunk_size: chunk_size.max(1),
            skip_stride: skip_stride.max(1),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn next_chunk(&mut self) -> ReadStep {
        if self.cursor >= self.limit {
            return ReadStep::End;
        }
        let remaining = self.limit - self.cursor;
        let want = remaining.min(self.chunk_size) as usize;
        let mut buf = vec![0u8; want];
        let mut read = 0usize;
        let mut failure = None;
        while read < buf.len() {
            match self.source.read_at(self.cursor + read as u64, &mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if read > 0 {
            // a failure after a partial fill surfaces on the next call
            buf.truncate(read);
            let offset = self.cursor;
            self.cursor += read as u64;
            return ReadStep::Data { offset, bytes: buf };
        }

        match failure {
            Some(err) => {
                let offset = self.cursor;
                let len = self.skip_stride.min(remaining);
                warn!("read failed at offset={offset}; skipping {len} bytes: {err}");
                self.cursor += len;
                ReadStep::Skipped { offset, len }
            }
            None => ReadStep::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FlakySource {
        data: Vec<u8>,
        bad: std::ops::Range<u64>,
    }

    impl DeviceSource for FlakySource {
        fn size_hint(&self) -> u64 {
            self.data.len() as u64
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
            if self.bad.contains(&offset) {
                return Err(io::Error::other("bad sector").into());
            }
            let start = offset as usize;
            if start >= self.data.len() {
                return Ok(0);
            }
            // stop short of the bad region so it is hit on a fresh call
            let mut end = (start + buf.len()).min(self.data.len());
            if offset < self.bad.start {
                end = end.min(self.bad.start as usize);
            }
            let n = end - start;
            buf[..n].copy_from_slice(&self.data[start..end]);
            Ok(n)
        }
    }

    #[test]
    fn reads_in_chunks_until_limit() {
        let source = FlakySource {
            data: vec![7u8; 2500],
            bad: 0..0,
        };
        let mut reader = DeviceReader::new(Box::new(source), 2500, 1024, 512);
        let mut sizes = Vec::new();
        loop {
            match reader.next_chunk() {
                ReadStep::Data { bytes, .. } => sizes.push(bytes.len()),
                ReadStep::Skipped { .. } => panic!("unexpected skip"),
                ReadStep::End => break,
            }
        }
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(reader.position(), 2500);
    }

    #[test]
    fn bad_region_is_skipped_by_stride() {
        let source = FlakySource {
            data: vec![1u8; 4096],
            bad: 1024..2048,
        };
        let mut reader = DeviceReader::new(Box::new(source), 4096, 4096, 512);
        let mut steps = Vec::new();
        loop {
            match reader.next_chunk() {
                ReadStep::Data { offset, bytes } => steps.push(("data", offset, bytes.len() as u64)),
                ReadStep::Skipped { offset, len } => steps.push(("skip", offset, len)),
                ReadStep::End => break,
            }
        }
        assert_eq!(
            steps,
            vec![
                ("data", 0, 1024),
                ("skip", 1024, 512),
                ("skip", 1536, 512),
                ("data", 2048, 2048),
            ]
        );
    }

    #[test]
    fn stops_at_end_of_device_before_limit() {
        let source = FlakySource {
            data: vec![0u8; 100],
            bad: 0..0,
        };
        let mut reader = DeviceReader::new(Box::new(source), 1 << 30, 64, 512);
        assert!(matches!(reader.next_chunk(), ReadStep::Data { .. }));
        assert!(matches!(reader.next_chunk(), ReadStep::Data { .. }));
        assert!(matches!(reader.next_chunk(), ReadStep::End));
    }

    #[test]
    fn raw_source_reports_file_size() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("image.bin");
        std::fs::write(&path, vec![0u8; 4096]).expect("write");
        let source = RawDeviceSource::open(&path).expect("open");
        assert_eq!(source.size_hint(), 4096);
    }

    #[test]
    fn missing_device_fails_to_open() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        assert!(RawDeviceSource::open(&temp_dir.path().join("absent")).is_err());
    }

    #[test]
    fn disk_letters_follow_device_naming() {
        assert_eq!(disk_letters(0), "a");
        assert_eq!(disk_letters(25), "z");
        assert_eq!(disk_letters(26), "aa");
    }
}
