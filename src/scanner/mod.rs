pub mod cpu;
pub mod stream;

use anyhow::Result;

use crate::config::Config;

/// A signature occurrence inside a searched buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub offset: usize,
    pub len: usize,
    pub pattern: usize,
}

pub trait SignatureScanner: Send + Sync {
    /// Earliest occurrence of any signature starting at or after `from`.
    /// Signatures starting at the same offset resolve to the one declared first.
    fn find_first(&self, data: &[u8], from: usize) -> Option<Hit>;
    fn longest_signature(&self) -> usize;
    fn pattern_id(&self, pattern: usize) -> &str;
}

pub fn build_signature_scanner(cfg: &Config) -> Result<Box<dyn SignatureScanner>> {
    Ok(Box::new(cpu::CpuScanner::new(cfg)?))
}
