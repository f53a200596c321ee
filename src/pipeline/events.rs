//! # Session Events
//!
//! Messages sent from the scan worker to whoever observes the session.
//! Every payload is an owned snapshot; observers never see worker state.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }
}

/// Progress after a processed chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Completion percentage (0.0 - 100.0)
    pub percent: f64,
    pub segments_saved: u64,
    pub bytes_scanned: u64,
    pub total_bytes: u64,
}

/// Final accounting for a session, whatever its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub state: SessionState,
    pub total_bytes: u64,
    pub bytes_scanned: u64,
    pub bytes_skipped: u64,
    pub segments_found: u64,
    pub segments_saved: u64,
    pub error: Option<String>,
}

impl SessionReport {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: SessionState::Failed,
            total_bytes: 0,
            bytes_scanned: 0,
            bytes_skipped: 0,
            segments_found: 0,
            segments_saved: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(ProgressSnapshot),
    /// Human-readable line: one per saved segment and per fatal error
    Log(String),
    /// Sent exactly once, last
    Completed(SessionReport),
}
