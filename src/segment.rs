//! Candidate byte ranges between consecutive signatures and the size filter
//! that decides which of them are worth writing.

/// Bytes between a signature and the next one (or the end of the scan).
///
/// `start` and `end` are device offsets. They bracket `bytes` exactly unless a
/// skipped bad region fell inside the range, in which case the gap is absent
/// from `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSegment {
    pub start: u64,
    pub end: u64,
    pub pattern_id: String,
    pub bytes: Vec<u8>,
}

impl CandidateSegment {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Stateless minimum-size filter. No upper bound is applied here.
#[derive(Debug, Clone, Copy)]
pub struct SegmentFilter {
    min_size: u64,
}

impl SegmentFilter {
    pub fn new(min_size: u64) -> Self {
        Self { min_size }
    }

    pub fn accept(&self, candidate: CandidateSegment) -> Option<CandidateSegment> {
        if candidate.len() > self.min_size {
            Some(candidate)
        } else {
            None
        }
    }
}
