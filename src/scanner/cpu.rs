use anyhow::{Result, anyhow, bail};
use memchr::memmem::Finder;

use crate::config::Config;
use crate::scanner::{Hit, SignatureScanner};

struct Pattern {
    id: String,
    finder: Finder<'static>,
}

pub struct CpuScanner {
    patterns: Vec<Pattern>,
    longest: usize,
}

impl CpuScanner {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut patterns = Vec::new();
        for pat in &cfg.signatures {
            let bytes = hex::decode(pat.hex.trim())
                .map_err(|e| anyhow!("invalid hex pattern {}: {e}", pat.id))?;
            patterns.push((pat.id.clone(), bytes));
        }
        Self::from_patterns(patterns)
    }

    pub fn from_patterns(patterns: Vec<(String, Vec<u8>)>) -> Result<Self> {
        let mut built = Vec::with_capacity(patterns.len());
        let mut longest = 0usize;
        for (id, bytes) in patterns {
            if bytes.is_empty() {
                bail!("signature {id} is empty");
            }
            longest = longest.max(bytes.len());
            built.push(Pattern {
                id,
                finder: Finder::new(&bytes).into_owned(),
            });
        }
        if built.is_empty() {
            bail!("no signatures configured");
        }
        Ok(Self {
            patterns: built,
            longest,
        })
    }
}

impl SignatureScanner for CpuScanner {
    fn find_first(&self, data: &[u8], from: usize) -> Option<Hit> {
        if from >= data.len() {
            return None;
        }
        let mut best: Option<Hit> = None;
        for (index, pattern) in self.patterns.iter().enumerate() {
            let len = pattern.finder.needle().len();
            // only an occurrence starting before the current best can win
            let window_end = match best {
                Some(hit) => (hit.offset + len - 1).min(data.len()),
                None => data.len(),
            };
            if window_end <= from {
                continue;
            }
            if let Some(pos) = pattern.finder.find(&data[from..window_end]) {
                best = Some(Hit {
                    offset: from + pos,
                    len,
                    pattern: index,
                });
            }
        }
        best
    }

    fn longest_signature(&self) -> usize {
        self.longest
    }

    fn pattern_id(&self, pattern: usize) -> &str {
        self.patterns
            .get(pattern)
            .map(|p| p.id.as_str())
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_scanner() -> CpuScanner {
        CpuScanner::from_patterns(vec![
            ("jpeg_app0".to_string(), vec![0xFF, 0xD8, 0xFF, 0xE0]),
            ("jpeg_app1".to_string(), vec![0xFF, 0xD8, 0xFF, 0xE1]),
        ])
        .expect("scanner")
    }

    #[test]
    fn earliest_signature_wins() {
        let scanner = jpeg_scanner();
        let mut data = vec![0u8; 64];
        data[40..44].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        data[10..14].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1]);
        let hit = scanner.find_first(&data, 0).expect("hit");
        assert_eq!(hit.offset, 10);
        assert_eq!(scanner.pattern_id(hit.pattern), "jpeg_app1");

        let next = scanner.find_first(&data, 11).expect("hit");
        assert_eq!(next.offset, 40);
        assert_eq!(scanner.pattern_id(next.pattern), "jpeg_app0");
    }

    #[test]
    fn search_respects_start_offset() {
        let scanner = jpeg_scanner();
        let mut data = vec![0u8; 16];
        data[0..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        assert!(scanner.find_first(&data, 1).is_none());
        assert!(scanner.find_first(&data, 16).is_none());
    }

    #[test]
    fn same_offset_resolves_in_declaration_order() {
        let scanner = CpuScanner::from_patterns(vec![
            ("short".to_string(), vec![0xAB, 0xCD]),
            ("long".to_string(), vec![0xAB, 0xCD, 0xEF]),
        ])
        .expect("scanner");
        let hit = scanner.find_first(&[0, 0xAB, 0xCD, 0xEF], 0).expect("hit");
        assert_eq!(hit.offset, 1);
        assert_eq!(hit.len, 2);
        assert_eq!(scanner.longest_signature(), 3);
    }

    #[test]
    fn partial_signature_is_not_a_hit() {
        let scanner = jpeg_scanner();
        assert!(scanner.find_first(&[0, 0, 0xFF, 0xD8, 0xFF], 0).is_none());
    }
}
