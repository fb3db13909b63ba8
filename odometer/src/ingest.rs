//! `odometer ingest` - feed a JSON-lines event stream into the store.
//!
//! Each line is one [`InputEvent`], e.g.
//! `{"timestamp":"2025-01-01T09:00:00+01:00","kind":"key","key":"KeyA"}`.
//! Malformed lines, including ones that are not valid UTF-8, are logged and
//! skipped. Lines are read on a separate
//! thread so Ctrl+C can flush the recorder while the reader is blocked.

use anyhow::{Context, Result};
use chrono::Local;
use odometer_core::config::{RecorderConfig, RetentionConfig};
use odometer_core::{Database, InputEvent, Recorder, RecorderStats, RetentionTrigger};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often the loop wakes up without input to check for shutdown.
const IDLE_TICK: Duration = Duration::from_millis(200);

/// Outcome of one ingest run
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub recorder: RecorderStats,
    pub skipped_lines: u64,
    pub interrupted: bool,
}

pub fn run(
    db: Arc<Database>,
    input: Option<&Path>,
    recorder_config: &RecorderConfig,
    retention: RetentionConfig,
) -> Result<IngestSummary> {
    let reader: Box<dyn BufRead + Send> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let (tx, rx) = mpsc::channel::<io::Result<String>>();
    thread::spawn(move || {
        for line in reader.lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut recorder = Recorder::new(Arc::clone(&db), recorder_config);
    let mut retention = RetentionTrigger::new(retention);
    let mut summary = IngestSummary::default();
    let mut line_no = 0u64;

    retention.run_if_due(&db, Local::now());

    while running.load(Ordering::SeqCst) {
        let line = match rx.recv_timeout(IDLE_TICK) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        line_no += 1;

        // `lines()` has already consumed the bad bytes; the next read starts
        // on the following line.
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                summary.skipped_lines += 1;
                tracing::warn!(line = line_no, error = %e, "Skipping undecodable line");
                continue;
            }
            Err(e) => return Err(e).context("failed to read input"),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match InputEvent::from_json_line(trimmed) {
            Ok(event) => {
                recorder.record(&event);
                if let Some(report) = retention.run_if_due(&db, Local::now()) {
                    tracing::info!(deleted = report.total(), "Scheduled retention cleanup");
                }
            }
            Err(e) => {
                summary.skipped_lines += 1;
                tracing::warn!(line = line_no, error = %e, "Skipping malformed event");
            }
        }
    }

    summary.interrupted = !running.load(Ordering::SeqCst);
    summary.recorder = recorder.finish();

    tracing::info!(
        recorded = summary.recorder.recorded,
        flushed = summary.recorder.flushed,
        dropped = summary.recorder.dropped,
        skipped = summary.skipped_lines,
        interrupted = summary.interrupted,
        "Ingest finished"
    );

    Ok(summary)
}
