//! # Marker Stream
//!
//! Rolling-buffer segmentation over a sequence of device chunks.
//!
//! Each pushed chunk is appended to the unsearched remainder of the previous
//! ones. Every signature closes the segment opened by the one before it. A
//! segment whose terminating signature has not been seen yet stays in the
//! remainder and keeps growing across chunks; otherwise only the last
//! `longest_signature` bytes are carried so that a signature split across a
//! chunk boundary is still found exactly once.

use std::sync::Arc;

use tracing::warn;

use crate::scanner::SignatureScanner;
use crate::segment::CandidateSegment;

/// Maps a buffer index to the device offset of that byte. A new span starts
/// wherever the buffer stops being contiguous on the device (after a skip).
#[derive(Debug, Clone, Copy)]
struct Span {
    index: usize,
    offset: u64,
}

/// Segment waiting for its terminating signature. Always starts at buffer index 0.
#[derive(Debug, Clone, Copy)]
struct OpenSegment {
    pattern: usize,
    sig_len: usize,
    // buffer indices below this cannot start the terminating signature
    searched: usize,
}

pub struct MarkerStream {
    scanner: Arc<dyn SignatureScanner>,
    buffer: Vec<u8>,
    spans: Vec<Span>,
    open: Option<OpenSegment>,
    carry: usize,
    max_open: Option<u64>,
}

impl MarkerStream {
    pub fn new(scanner: Arc<dyn SignatureScanner>, max_open: Option<u64>) -> Self {
        let carry = scanner.longest_signature().max(1);
        Self {
            scanner,
            buffer: Vec::new(),
            spans: Vec::new(),
            open: None,
            carry,
            max_open,
        }
    }

    /// Bytes currently held back for the next chunk.
    pub fn remainder_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_open_segment(&self) -> bool {
        self.open.is_some()
    }

    /// Appends a chunk read at `offset` and returns the segments it closes,
    /// in ascending offset order.
    pub fn push(&mut self, chunk: &[u8], offset: u64) -> Vec<CandidateSegment> {
        if chunk.is_empty() {
            return Vec::new();
        }
        if self.buffer.is_empty() {
            self.spans.clear();
        }
        let seam = self.buffer.len();
        if self.device_offset(seam) != Some(offset) {
            self.spans.push(Span {
                index: seam,
                offset,
            });
        }
        self.buffer.extend_from_slice(chunk);

        let mut segments = Vec::new();
        let mut cursor = 0usize;
        loop {
            let (start, pattern, sig_len, resume) = match self.open.take() {
                Some(open) => (0, open.pattern, open.sig_len, open.searched),
                None => match self.scanner.find_first(&self.buffer, cursor) {
                    Some(hit) => (hit.offset, hit.pattern, hit.len, 0),
                    None => {
                        let keep_from = self.buffer.len().saturating_sub(self.carry).max(cursor);
                        self.retain_from(keep_from);
                        break;
                    }
                },
            };

            let search_from = resume.max(start + sig_len);
            match self.scanner.find_first(&self.buffer, search_from) {
                Some(next) => {
                    if self.exceeds_cap(next.offset - start) {
                        warn!(
                            "segment at offset={} exceeded max_segment_size; dropping it",
                            self.device_offset(start).unwrap_or(0)
                        );
                    } else {
                        segments.push(self.candidate(start, next.offset, pattern));
                    }
                    cursor = next.offset;
                }
                None => {
                    // a terminating signature may begin in the last carry-1 bytes
                    let searched = (self.buffer.len() + 1).saturating_sub(self.carry);
                    self.retain_from(start);
                    self.open = Some(OpenSegment {
                        pattern,
                        sig_len,
                        searched: searched.saturating_sub(start).max(sig_len),
                    });
                    self.enforce_cap();
                    break;
                }
            }
        }
        segments
    }

    /// Takes the segment still open at the end of the scan, if any.
    pub fn finish(&mut self) -> Option<CandidateSegment> {
        let open = self.open.take()?;
        let segment = self.candidate(0, self.buffer.len(), open.pattern);
        self.buffer.clear();
        self.spans.clear();
        Some(segment)
    }

    fn candidate(&self, start: usize, end: usize, pattern: usize) -> CandidateSegment {
        CandidateSegment {
            start: self.device_offset(start).unwrap_or(0),
            end: self.device_offset(end).unwrap_or(0),
            pattern_id: self.scanner.pattern_id(pattern).to_string(),
            bytes: self.buffer[start..end].to_vec(),
        }
    }

    fn device_offset(&self, index: usize) -> Option<u64> {
        self.spans
            .iter()
            .rev()
            .find(|span| span.index <= index)
            .map(|span| span.offset + (index - span.index) as u64)
    }

    fn retain_from(&mut self, from: usize) {
        if from == 0 {
            return;
        }
        let base = self.device_offset(from);
        self.buffer.drain(..from);
        let mut spans = Vec::with_capacity(self.spans.len());
        if let Some(offset) = base {
            spans.push(Span { index: 0, offset });
        }
        spans.extend(
            self.spans
                .iter()
                .filter(|span| span.index > from)
                .map(|span| Span {
                    index: span.index - from,
                    offset: span.offset,
                }),
        );
        self.spans = spans;
    }

    fn exceeds_cap(&self, len: usize) -> bool {
        self.max_open.is_some_and(|max| len as u64 > max)
    }

    fn enforce_cap(&mut self) {
        if self.open.is_none() || !self.exceeds_cap(self.buffer.len()) {
            return;
        }
        warn!(
            "open segment at offset={} exceeded max_segment_size; dropping it",
            self.device_offset(0).unwrap_or(0)
        );
        self.open = None;
        let keep_from = self.buffer.len().saturating_sub(self.carry);
        self.retain_from(keep_from);
    }
}
