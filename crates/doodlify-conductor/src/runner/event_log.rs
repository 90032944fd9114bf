//! Structured event logging for phase runs.
//!
//! Writes append-only JSONL to `.doodlify/<scope>/events.jsonl` and a
//! `runner-status.json` snapshot for external tools to poll. Both are
//! best-effort: a logging failure never fails a phase.

use crate::runner::report::{UnitKind, UnitOutcome};
use doodlify_core::now_rfc3339;
use doodlify_ledger::{EventStatus, Ledger, LedgerPaths};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

// ── Event types ──

/// A run event. Serialized as tagged JSON (`"type": "phase_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PhaseStart {
        phase: String,
    },
    Unit {
        phase: String,
        unit: UnitKind,
        id: String,
        result: UnitOutcome,
    },
    PhaseCompleted {
        phase: String,
        done: usize,
        skipped: usize,
        failed: usize,
        cancelled: bool,
    },
    PhaseAborted {
        phase: String,
        error: String,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u64,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

// ── EventLogger ──

/// Append-only JSONL event writer. Sequence numbers continue across runs.
pub struct EventLogger {
    jsonl_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
    seq: AtomicU64,
}

impl EventLogger {
    pub fn new(paths: &LedgerPaths) -> Self {
        let seq = count_lines(&paths.events_jsonl);
        Self {
            jsonl_path: Some(paths.events_jsonl.clone()),
            status_path: Some(paths.status_json.clone()),
            seq: AtomicU64::new(seq),
        }
    }

    /// Logger that writes nothing.
    pub fn disabled() -> Self {
        Self {
            jsonl_path: None,
            status_path: None,
            seq: AtomicU64::new(0),
        }
    }

    /// Record an event. Best-effort: silently ignores write failures.
    pub fn record(&self, event: Event) {
        let Some(path) = &self.jsonl_path else {
            return;
        };
        let full = FullEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ts: now_rfc3339(),
            event,
        };
        if let Ok(line) = serde_json::to_string(&full) {
            let _ = append_line(path, &line);
        }
    }

    /// Snapshot the ledger's event statuses for pollers.
    pub fn write_status(&self, ledger: &Ledger, phase: &str, status: &str) {
        let Some(path) = &self.status_path else {
            return;
        };
        let snapshot = RunnerStatus {
            scope: ledger.scope.clone(),
            phase: phase.to_string(),
            status: status.to_string(),
            events: ledger
                .events
                .iter()
                .map(|(id, r)| (id.clone(), r.status))
                .collect(),
            reported_suggestions: ledger.reported_suggestions.len(),
            updated_at: now_rfc3339(),
        };
        if let Ok(data) = serde_json::to_string_pretty(&snapshot) {
            let _ = doodlify_store::write_atomic(path, data.as_bytes());
        }
    }
}

fn count_lines(path: &Path) -> u64 {
    fs::File::open(path)
        .map(|f| BufReader::new(f).lines().count() as u64)
        .unwrap_or(0)
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

// ── RunnerStatus ──

#[derive(Debug, Serialize)]
pub struct RunnerStatus {
    pub scope: String,
    pub phase: String,
    pub status: String,
    pub events: BTreeMap<String, EventStatus>,
    pub reported_suggestions: usize,
    pub updated_at: String,
}
