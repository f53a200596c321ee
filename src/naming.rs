//! Collision-free output names: `{YYYY-MM-DD}/{NNNN}.{ext}` relative to the
//! output root, numbered per date folder in save order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

/// Folder key for a resolved capture date.
pub fn folder_key(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

/// Next unused index per date folder. Indices start at 1 and are never
/// handed out twice for the same key.
#[derive(Debug, Default)]
pub struct DateCounters {
    next: HashMap<String, u32>,
}

impl DateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the next index for `key`, seeding a new key from `first`.
    pub fn take(&mut self, key: &str, first: impl FnOnce() -> u32) -> u32 {
        let slot = self
            .next
            .entry(key.to_string())
            .or_insert_with(|| first().max(1));
        let index = *slot;
        *slot = slot.saturating_add(1);
        index
    }

    pub fn peek(&self, key: &str) -> Option<u32> {
        self.next.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedName {
    pub folder: String,
    pub file_name: String,
    pub relative: PathBuf,
}

pub struct OutputNamer {
    output_root: PathBuf,
    extension: String,
    continue_numbering: bool,
    counters: DateCounters,
}

impl OutputNamer {
    pub fn new(output_root: &Path, extension: &str, continue_numbering: bool) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
            continue_numbering,
            counters: DateCounters::new(),
        }
    }

    pub fn assign(&mut self, timestamp: &NaiveDateTime) -> AssignedName {
        let folder = folder_key(timestamp);
        let index = if self.continue_numbering {
            let dir = self.output_root.join(&folder);
            let extension = self.extension.as_str();
            self.counters
                .take(&folder, || highest_existing_index(&dir, extension).saturating_add(1))
        } else {
            self.counters.take(&folder, || 1)
        };
        let file_name = format!("{index:04}.{}", self.extension);
        let relative = Path::new(&folder).join(&file_name);
        AssignedName {
            folder,
            file_name,
            relative,
        }
    }

    pub fn counters(&self) -> &DateCounters {
        &self.counters
    }
}

/// Largest `NNNN.<ext>` index already present in `dir`, 0 when none.
fn highest_existing_index(dir: &Path, extension: &str) -> u32 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut highest = 0u32;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some((stem, ext)) = name.rsplit_once('.') else {
            continue;
        };
        if !ext.eq_ignore_ascii_case(extension) || stem.is_empty() {
            continue;
        }
        if !stem.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        // u32::MAX leaves no successor; such a file cannot seed numbering
        match stem.parse::<u32>() {
            Ok(index) if index < u32::MAX => highest = highest.max(index),
            _ => {}
        }
    }
    debug!(
        "existing output dir={} highest_index={}",
        dir.display(),
        highest
    );
    highest
}
