//! Writes accepted candidates to their assigned path and records what was written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::date::{DateSource, ResolvedDate};
use crate::naming::AssignedName;
use crate::segment::CandidateSegment;

#[derive(Debug, Clone, Serialize)]
pub struct CarvedFile {
    pub run_id: String,
    pub path: String,
    pub date_folder: String,
    pub date_source: DateSource,
    pub capture_date: String,
    pub global_start: u64,
    pub global_end: u64,
    pub size: u64,
    pub md5: String,
    pub sha256: String,
    pub pattern_id: String,
}

#[derive(Debug, Error)]
pub enum CarveError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Creates the date folder on demand and writes the whole candidate.
///
/// A failed write leaves no file behind.
pub fn write_candidate(
    run_id: &str,
    output_root: &Path,
    name: &AssignedName,
    segment: &CandidateSegment,
    date: &ResolvedDate,
) -> Result<CarvedFile, CarveError> {
    let full_path = output_root.join(&name.relative);
    let rel_path = name.relative.to_string_lossy().to_string();
    let io_err = |source| CarveError::Io {
        path: full_path.display().to_string(),
        source,
    };

    std::fs::create_dir_all(output_root.join(&name.folder)).map_err(io_err)?;
    if let Err(err) = write_all(&full_path, &segment.bytes) {
        let _ = std::fs::remove_file(&full_path);
        return Err(io_err(err));
    }

    let md5_hex = format!("{:x}", md5::compute(&segment.bytes));
    let sha256_hex = hex::encode(Sha256::digest(&segment.bytes));

    Ok(CarvedFile {
        run_id: run_id.to_string(),
        path: rel_path,
        date_folder: name.folder.clone(),
        date_source: date.source,
        capture_date: date.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        global_start: segment.start,
        global_end: segment.end,
        size: segment.len(),
        md5: md5_hex,
        sha256: sha256_hex,
        pattern_id: segment.pattern_id.clone(),
    })
}

fn write_all(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}
