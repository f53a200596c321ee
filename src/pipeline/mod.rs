//! # Pipeline Module
//!
//! Drives one carving session: sequential device reads feed the marker
//! stream, closed segments pass the size filter, get a capture date and a
//! name, and are written out. Everything runs on a single worker; progress,
//! log lines and the completion report travel to observers over a channel.

pub mod events;

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::carve::{self, CarveError};
use crate::config::LoadedConfig;
use crate::date::DateResolver;
use crate::device::{DeviceError, DeviceReader, DeviceSource, RawDeviceSource, ReadStep};
use crate::metadata::{self, MetadataError, MetadataSink, RunSummary};
use crate::naming::OutputNamer;
use crate::scanner::SignatureScanner;
use crate::scanner::stream::MarkerStream;
use crate::segment::{CandidateSegment, SegmentFilter};
use crate::util::completion_pct;

use events::{ProgressSnapshot, SessionEvent, SessionReport, SessionState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open device {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: DeviceError,
    },
    #[error(transparent)]
    Write(#[from] CarveError),
    #[error("manifest error: {0}")]
    Manifest(#[from] MetadataError),
}

/// Per-session knobs, resolved from configuration and command line.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub run_id: String,
    pub config_hash: String,
    pub chunk_size: u64,
    pub skip_stride: u64,
    pub min_segment_size: u64,
    pub max_segment_size: Option<u64>,
    pub fallback_device_size: u64,
    /// Overrides the device size query when set
    pub assume_size: Option<u64>,
    pub carve_trailing_segment: bool,
    pub continue_numbering: bool,
    pub output_extension: String,
    pub write_manifest: bool,
}

impl SessionSettings {
    pub fn from_config(loaded: &LoadedConfig) -> Self {
        let cfg = &loaded.config;
        Self {
            run_id: cfg.run_id.clone(),
            config_hash: loaded.config_hash.clone(),
            chunk_size: cfg.chunk_size,
            skip_stride: cfg.skip_stride,
            min_segment_size: cfg.min_segment_size,
            max_segment_size: cfg.max_segment_size,
            fallback_device_size: cfg.fallback_device_size,
            assume_size: None,
            carve_trailing_segment: cfg.carve_trailing_segment,
            continue_numbering: cfg.continue_numbering,
            output_extension: cfg.output_extension.clone(),
            write_manifest: cfg.write_manifest,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    total_bytes: u64,
    bytes_scanned: u64,
    bytes_skipped: u64,
    segments_found: u64,
    segments_saved: u64,
    manifest_errors: u64,
}

pub struct ScanSession {
    settings: SessionSettings,
    scanner: Arc<dyn SignatureScanner>,
    output_root: PathBuf,
    events: Sender<SessionEvent>,
    running: Arc<AtomicBool>,
    state: SessionState,
}

/// Control side of a session running on its own worker thread.
pub struct SessionHandle {
    running: Arc<AtomicBool>,
    join: thread::JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Requests cooperative cancellation; honoured at the next chunk boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> SessionReport {
        self.join
            .join()
            .unwrap_or_else(|_| SessionReport::failed("scan worker panicked"))
    }
}

impl ScanSession {
    pub fn new(
        settings: SessionSettings,
        scanner: Arc<dyn SignatureScanner>,
        output_root: &Path,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            settings,
            scanner,
            output_root: output_root.to_path_buf(),
            events,
            running: Arc::new(AtomicBool::new(true)),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared running flag; clearing it cancels the session.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs the session on a dedicated worker thread.
    pub fn spawn(self, device_path: PathBuf) -> std::io::Result<SessionHandle> {
        let running = self.running.clone();
        let events = self.events.clone();
        let join = thread::Builder::new()
            .name("photocarve-scan".to_string())
            .spawn(move || {
                match panic::catch_unwind(AssertUnwindSafe(|| self.run(&device_path))) {
                    Ok(report) => report,
                    Err(_) => {
                        error!("scan worker panicked");
                        let report = SessionReport::failed("scan worker panicked");
                        let _ = events.send(SessionEvent::Log("Error: scan worker panicked".to_string()));
                        let _ = events.send(SessionEvent::Completed(report.clone()));
                        report
                    }
                }
            })?;
        Ok(SessionHandle { running, join })
    }

    /// Opens `device_path` and scans it on the calling thread.
    pub fn run(self, device_path: &Path) -> SessionReport {
        let opened = RawDeviceSource::open(device_path)
            .map(|source| Box::new(source) as Box<dyn DeviceSource>)
            .map_err(|source| SessionError::OpenFailed {
                path: device_path.display().to_string(),
                source,
            });
        self.execute(device_path, opened)
    }

    /// Scans an already opened source; `label` names it in logs and the manifest.
    pub fn run_with_source(self, label: &Path, source: Box<dyn DeviceSource>) -> SessionReport {
        self.execute(label, Ok(source))
    }

    fn execute(
        mut self,
        device_path: &Path,
        opened: Result<Box<dyn DeviceSource>, SessionError>,
    ) -> SessionReport {
        self.state = SessionState::Running;
        let mut tally = Tally::default();
        let mut sink: Option<Box<dyn MetadataSink>> = None;

        let outcome =
            opened.and_then(|source| self.scan(device_path, source, &mut tally, &mut sink));

        let (state, error) = match outcome {
            Ok(state) => (state, None),
            Err(err) => {
                error!("scan failed device={}: {err}", device_path.display());
                self.log(format!("Error: {err}"));
                (SessionState::Failed, Some(err.to_string()))
            }
        };
        self.state = state;

        if let Some(sink) = sink {
            let summary = RunSummary {
                run_id: self.settings.run_id.clone(),
                device_path: device_path.display().to_string(),
                state: state.as_str().to_string(),
                total_bytes: tally.total_bytes,
                bytes_scanned: tally.bytes_scanned,
                bytes_skipped: tally.bytes_skipped,
                segments_found: tally.segments_found,
                segments_saved: tally.segments_saved,
                error: error.clone(),
            };
            if let Err(err) = sink.record_run_summary(&summary) {
                warn!("metadata record error: {err}");
            }
            if let Err(err) = sink.flush() {
                warn!("metadata flush error: {err}");
            }
        }

        if state == SessionState::Completed {
            self.send(SessionEvent::Progress(ProgressSnapshot {
                percent: 100.0,
                segments_saved: tally.segments_saved,
                bytes_scanned: tally.bytes_scanned,
                total_bytes: tally.total_bytes,
            }));
        }
        if state == SessionState::Cancelled {
            info!("cancellation requested; stopping early");
        }
        if tally.manifest_errors > 0 {
            warn!("manifest_errors={}", tally.manifest_errors);
        }
        info!(
            "session_summary state={} bytes_scanned={} bytes_skipped={} segments_found={} segments_saved={}",
            state.as_str(),
            tally.bytes_scanned,
            tally.bytes_skipped,
            tally.segments_found,
            tally.segments_saved
        );

        let report = SessionReport {
            state,
            total_bytes: tally.total_bytes,
            bytes_scanned: tally.bytes_scanned,
            bytes_skipped: tally.bytes_skipped,
            segments_found: tally.segments_found,
            segments_saved: tally.segments_saved,
            error,
        };
        self.send(SessionEvent::Completed(report.clone()));
        report
    }

    fn scan(
        &mut self,
        device_path: &Path,
        source: Box<dyn DeviceSource>,
        tally: &mut Tally,
        sink_slot: &mut Option<Box<dyn MetadataSink>>,
    ) -> Result<SessionState, SessionError> {
        let total = self.total_bytes(source.size_hint());
        tally.total_bytes = total;

        let sink = sink_slot.insert(metadata::build_sink(
            self.settings.write_manifest,
            env!("CARGO_PKG_VERSION"),
            &self.settings.config_hash,
            device_path,
            &self.output_root,
        )?);

        info!(
            "scan started run_id={} device={} total_bytes={} chunk_size={} output={}",
            self.settings.run_id,
            device_path.display(),
            total,
            self.settings.chunk_size,
            self.output_root.display()
        );

        let mut reader = DeviceReader::new(
            source,
            total,
            self.settings.chunk_size,
            self.settings.skip_stride,
        );
        let mut stream = MarkerStream::new(self.scanner.clone(), self.settings.max_segment_size);
        let mut saver = SegmentSaver {
            run_id: &self.settings.run_id,
            output_root: &self.output_root,
            filter: SegmentFilter::new(self.settings.min_segment_size),
            resolver: DateResolver::new(),
            namer: OutputNamer::new(
                &self.output_root,
                &self.settings.output_extension,
                self.settings.continue_numbering,
            ),
            sink: &**sink,
            events: &self.events,
        };

        while tally.bytes_scanned < total {
            if !self.running.load(Ordering::SeqCst) {
                return Ok(SessionState::Cancelled);
            }
            match reader.next_chunk() {
                ReadStep::Data { offset, bytes } => {
                    tally.bytes_scanned += bytes.len() as u64;
                    for candidate in stream.push(&bytes, offset) {
                        saver.save(candidate, tally)?;
                    }
                }
                ReadStep::Skipped { len, .. } => {
                    tally.bytes_scanned += len;
                    tally.bytes_skipped += len;
                }
                ReadStep::End => break,
            }
            let snapshot = ProgressSnapshot {
                percent: completion_pct(tally.bytes_scanned, total),
                segments_saved: tally.segments_saved,
                bytes_scanned: tally.bytes_scanned,
                total_bytes: total,
            };
            let _ = self.events.send(SessionEvent::Progress(snapshot));
        }

        if let Some(tail) = stream.finish() {
            if self.settings.carve_trailing_segment {
                saver.save(tail, tally)?;
            } else {
                debug!(
                    "dropping unterminated segment at offset={} len={}",
                    tail.start,
                    tail.len()
                );
            }
        }

        Ok(SessionState::Completed)
    }

    fn total_bytes(&self, size_hint: u64) -> u64 {
        if let Some(size) = self.settings.assume_size.filter(|s| *s > 0) {
            return size;
        }
        if size_hint > 0 {
            return size_hint;
        }
        warn!(
            "device size unknown; assuming {} bytes",
            self.settings.fallback_device_size
        );
        self.settings.fallback_device_size
    }

    fn log(&self, line: String) {
        self.send(SessionEvent::Log(line));
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Filter, date, name and write stages for closed segments.
struct SegmentSaver<'a> {
    run_id: &'a str,
    output_root: &'a Path,
    filter: SegmentFilter,
    resolver: DateResolver,
    namer: OutputNamer,
    sink: &'a dyn MetadataSink,
    events: &'a Sender<SessionEvent>,
}

impl SegmentSaver<'_> {
    fn save(&mut self, candidate: CandidateSegment, tally: &mut Tally) -> Result<(), SessionError> {
        tally.segments_found += 1;
        let Some(segment) = self.filter.accept(candidate) else {
            return Ok(());
        };
        let date = self.resolver.resolve(&segment.bytes);
        let name = self.namer.assign(&date.timestamp);
        let carved = carve::write_candidate(self.run_id, self.output_root, &name, &segment, &date)?;
        tally.segments_saved += 1;

        if let Err(err) = self.sink.record_file(&carved) {
            tally.manifest_errors += 1;
            warn!("metadata record error: {err}");
        }

        let line = format!(
            "Saved: {}/{} ({} KB)",
            name.folder,
            name.file_name,
            segment.len() / 1024
        );
        info!("{line} offset={}", segment.start);
        let _ = self.events.send(SessionEvent::Log(line));
        Ok(())
    }
}
