//! # Date Module
//!
//! Assigns each candidate a capture timestamp: the EXIF `DateTimeOriginal`
//! when it can be read, otherwise the wall-clock time at resolution.

pub mod exif;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock, matching the naive local time EXIF dates are written in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    Exif,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub timestamp: NaiveDateTime,
    pub source: DateSource,
}

pub struct DateResolver {
    clock: Box<dyn Clock>,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DateResolver {
    pub fn new() -> Self {
        Self::with_clock(Box::new(LocalClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Never fails: metadata errors resolve to the clock's current time.
    pub fn resolve(&self, bytes: &[u8]) -> ResolvedDate {
        match exif::extract_capture_date(bytes) {
            Ok(timestamp) => ResolvedDate {
                timestamp,
                source: DateSource::Exif,
            },
            Err(err) => {
                debug!("capture date unavailable ({err}); using wall clock");
                ResolvedDate {
                    timestamp: self.clock.now(),
                    source: DateSource::Fallback,
                }
            }
        }
    }
}
