//! Policy constants shared across the carving engine.

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Sequential read size for device scans.
pub const DEFAULT_CHUNK_SIZE: u64 = MIB;

/// Cursor advance after a failed read. A policy value, not a detected sector size.
pub const DEFAULT_SKIP_STRIDE: u64 = 512;

/// Candidates at or below this length are treated as stray headers.
pub const DEFAULT_MIN_SEGMENT_SIZE: u64 = KIB;

/// Scan limit and progress total when the device size is unknown.
pub const FALLBACK_DEVICE_SIZE: u64 = GIB;

pub const MANIFEST_DIR: &str = "metadata";
pub const CARVED_FILES_NAME: &str = "carved_files.jsonl";
pub const RUN_SUMMARY_NAME: &str = "run_summary.json";
