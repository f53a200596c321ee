use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use photocarve::pipeline::events::{SessionEvent, SessionState};
use photocarve::pipeline::{ScanSession, SessionSettings};
use photocarve::{cli, config, logging, scanner, util};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_json);

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut settings = SessionSettings::from_config(&loaded);
    if let Some(chunk) = cli_opts.chunk_size_bytes() {
        settings.chunk_size = chunk;
    }
    if let Some(cap) = cli_opts.max_segment_bytes() {
        settings.max_segment_size = Some(cap);
    }
    settings.assume_size = cli_opts.assume_size_bytes();
    settings.continue_numbering |= cli_opts.continue_numbering;
    settings.carve_trailing_segment |= cli_opts.carve_trailing;
    if cli_opts.no_manifest {
        settings.write_manifest = false;
    }

    util::ensure_output_dir(&cli_opts.output)?;
    let device_path = cli_opts.device_path();

    info!(
        "starting run_id={} device={} output={} chunk_size={}",
        settings.run_id,
        device_path.display(),
        cli_opts.output.display(),
        settings.chunk_size
    );

    let sig_scanner = scanner::build_signature_scanner(&loaded.config)?;
    let sig_scanner = Arc::from(sig_scanner);

    let (tx, rx) = crossbeam_channel::unbounded();
    let session = ScanSession::new(settings, sig_scanner, &cli_opts.output, tx);

    let running = session.running_flag();
    ctrlc::set_handler(move || {
        if running.swap(false, Ordering::SeqCst) {
            warn!("interrupt received; stopping after current chunk");
        }
    })
    .context("installing interrupt handler")?;

    let handle = session.spawn(device_path).context("spawning scan worker")?;

    let mut last_pct = -1i64;
    for event in rx.iter() {
        match event {
            SessionEvent::Progress(snapshot) => {
                let pct = snapshot.percent.floor() as i64;
                if pct != last_pct {
                    last_pct = pct;
                    info!(
                        "progress pct={} saved={} scanned={}/{}",
                        pct, snapshot.segments_saved, snapshot.bytes_scanned, snapshot.total_bytes
                    );
                }
            }
            SessionEvent::Log(line) => println!("{line}"),
            SessionEvent::Completed(_) => break,
        }
    }

    let report = handle.join();
    info!(
        "photocarve run finished state={} saved={} found={} skipped_bytes={}",
        report.state.as_str(),
        report.segments_saved,
        report.segments_found,
        report.bytes_skipped
    );
    match report.state {
        SessionState::Failed => bail!(
            "scan failed: {}",
            report.error.unwrap_or_else(|| "unknown error".to_string())
        ),
        _ => Ok(()),
    }
}
