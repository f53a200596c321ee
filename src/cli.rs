use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::constants::{KIB, MIB};
use crate::device;

#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("device").required(true).args(["input", "disk"])))]
pub struct CliOptions {
    /// Raw device or image file to scan
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Physical disk ordinal (0 = first disk)
    #[arg(long)]
    pub disk: Option<u32>,

    /// Output root; carved files land in date folders beneath it
    #[arg(short, long, default_value = "./carved")]
    pub output: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Read size, in KiB (overrides config when set)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size_kib: Option<u64>,

    /// Scan this many MiB when the device size cannot be queried
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub assume_size_mib: Option<u64>,

    /// Drop segments that stay open past this many MiB
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_segment_mib: Option<u64>,

    /// Number after files already present in date folders
    #[arg(long)]
    pub continue_numbering: bool,

    /// Save the segment still open at end of device
    #[arg(long)]
    pub carve_trailing: bool,

    /// Skip writing metadata/carved_files.jsonl and run_summary.json
    #[arg(long)]
    pub no_manifest: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl CliOptions {
    /// Device path selected by `--input` or `--disk`.
    pub fn device_path(&self) -> PathBuf {
        match (&self.input, self.disk) {
            (Some(path), _) => path.clone(),
            (None, Some(ordinal)) => device::disk_path(ordinal),
            (None, None) => PathBuf::new(),
        }
    }

    pub fn chunk_size_bytes(&self) -> Option<u64> {
        self.chunk_size_kib.map(|kib| kib.saturating_mul(KIB))
    }

    pub fn assume_size_bytes(&self) -> Option<u64> {
        self.assume_size_mib.map(|mib| mib.saturating_mul(MIB))
    }

    pub fn max_segment_bytes(&self) -> Option<u64> {
        self.max_segment_mib.map(|mib| mib.saturating_mul(MIB))
    }
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
