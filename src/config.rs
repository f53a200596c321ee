use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MIN_SEGMENT_SIZE, DEFAULT_SKIP_STRIDE, FALLBACK_DEVICE_SIZE,
};

#[derive(Debug, Deserialize, Clone)]
pub struct PatternConfig {
    pub id: String,
    pub hex: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub run_id: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_skip_stride")]
    pub skip_stride: u64,
    #[serde(default = "default_min_segment_size")]
    pub min_segment_size: u64,
    #[serde(default)]
    pub max_segment_size: Option<u64>,
    #[serde(default = "default_fallback_device_size")]
    pub fallback_device_size: u64,
    #[serde(default)]
    pub carve_trailing_segment: bool,
    #[serde(default)]
    pub continue_numbering: bool,
    pub output_extension: String,
    #[serde(default = "default_true")]
    pub write_manifest: bool,
    pub signatures: Vec<PatternConfig>,
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_skip_stride() -> u64 {
    DEFAULT_SKIP_STRIDE
}

fn default_min_segment_size() -> u64 {
    DEFAULT_MIN_SEGMENT_SIZE
}

fn default_fallback_device_size() -> u64 {
    FALLBACK_DEVICE_SIZE
}

impl Config {
    /// Rejects settings that would stall the read loop or make the
    /// signature table ambiguous.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if self.skip_stride == 0 {
            bail!("skip_stride must be greater than zero");
        }
        if self.fallback_device_size == 0 {
            bail!("fallback_device_size must be greater than zero");
        }
        if self.max_segment_size == Some(0) {
            bail!("max_segment_size must be greater than zero (omit it for no cap)");
        }
        if self.output_extension.trim_start_matches('.').is_empty() {
            bail!("output_extension must not be empty");
        }
        if self.signatures.is_empty() {
            bail!("at least one signature is required");
        }
        let mut ids = HashSet::new();
        for sig in &self.signatures {
            if !ids.insert(sig.id.as_str()) {
                bail!("duplicate signature id {}", sig.id);
            }
            let bytes = hex::decode(sig.hex.trim())
                .map_err(|e| anyhow!("invalid hex pattern {}: {e}", sig.id))?;
            if bytes.is_empty() {
                bail!("signature {} is empty", sig.id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{:08x}", now.format("%Y%m%dT%H%M%SZ"), now.timestamp_subsec_nanos())
}
