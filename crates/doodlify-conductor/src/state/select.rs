//! Eligibility: which events and files a phase may act on.

use doodlify_core::analysis::{is_transformable_image, FileKind};
use doodlify_core::config::{Config, EventConfig};
use doodlify_core::fingerprint::normalize_scope;
use doodlify_core::DoodlifyError;
use doodlify_ledger::{EventRecord, EventStatus, FileState, Ledger};
use doodlify_store::{is_backup_path, BackupVault};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use time::Date;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDecision {
    /// Run the event. `resume` is set when a previous run was interrupted.
    Eligible { resume: bool },
    Skip(String),
}

/// Process-phase policy for one event.
///
/// Without an override the event must be active on `today` and in
/// `Unprocessed`, `Error` or an interrupted `Processing`. An explicit id
/// bypasses the date window and also admits `Processed`.
pub fn process_decision(
    event: &EventConfig,
    status: EventStatus,
    explicit: bool,
    today: Date,
) -> EventDecision {
    if !explicit && !event.is_active(today) {
        return EventDecision::Skip(format!(
            "outside date window {}..={}",
            event.start_date, event.end_date
        ));
    }
    match status {
        EventStatus::Unprocessed | EventStatus::Error => EventDecision::Eligible { resume: false },
        EventStatus::Processing => EventDecision::Eligible { resume: true },
        EventStatus::Processed if explicit => EventDecision::Eligible { resume: false },
        EventStatus::Processed => EventDecision::Skip("already processed".into()),
        EventStatus::Pushed => {
            EventDecision::Skip("already pushed; clear the event to redo it".into())
        }
    }
}

/// Events the process phase considers, in configuration order.
pub fn events_for_process<'a>(
    config: &'a Config,
    ledger: &Ledger,
    event_id: Option<&str>,
    today: Date,
) -> Result<Vec<(&'a EventConfig, EventDecision)>, DoodlifyError> {
    let events = scoped_events(config, event_id)?;
    Ok(events
        .into_iter()
        .map(|e| {
            let decision = process_decision(e, ledger.status_of(&e.id), event_id.is_some(), today);
            (e, decision)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDecision {
    Push { from: EventStatus },
    AlreadyPushed,
    Skip(String),
}

/// Push-phase policy: `Processed` events, and `Error` events whose failure
/// happened while pushing. Dates do not matter here.
pub fn push_decision(record: Option<&EventRecord>) -> PushDecision {
    let Some(record) = record else {
        return PushDecision::Skip("not processed yet".into());
    };
    match record.status {
        EventStatus::Processed => PushDecision::Push {
            from: EventStatus::Processed,
        },
        EventStatus::Error if record.failed_in_push() => PushDecision::Push {
            from: EventStatus::Error,
        },
        EventStatus::Pushed => PushDecision::AlreadyPushed,
        EventStatus::Error => PushDecision::Skip("processing failed; run process again".into()),
        EventStatus::Processing => PushDecision::Skip("processing incomplete".into()),
        EventStatus::Unprocessed => PushDecision::Skip("not processed yet".into()),
    }
}

pub fn events_for_push<'a>(
    config: &'a Config,
    ledger: &Ledger,
    event_id: Option<&str>,
) -> Result<Vec<(&'a EventConfig, PushDecision)>, DoodlifyError> {
    let events = scoped_events(config, event_id)?;
    Ok(events
        .into_iter()
        .map(|e| (e, push_decision(ledger.event(&e.id))))
        .collect())
}

/// All configured events, or just the one named by `event_id`.
pub fn scoped_events<'a>(
    config: &'a Config,
    event_id: Option<&str>,
) -> Result<Vec<&'a EventConfig>, DoodlifyError> {
    match event_id {
        Some(id) => config
            .event(id)
            .map(|e| vec![e])
            .ok_or_else(|| DoodlifyError::EventNotFound {
                event_id: id.to_string(),
            }),
        None => Ok(config.events.iter().collect()),
    }
}

// ── Files ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDecision {
    /// Transform it. `from_backup` re-derives from the backup bytes because an
    /// earlier attempt of this event may have left the file half-done.
    Eligible { from_backup: bool },
    SkippedBackup,
    Missing,
    Unsupported,
}

/// Restricts processing to explicit paths or glob patterns.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    set: Option<GlobSet>,
}

impl FileFilter {
    pub fn new(patterns: &[String]) -> Result<Self, DoodlifyError> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let normalized = normalize_scope(Some(pattern.as_str()));
            let glob = Glob::new(&normalized).map_err(|e| {
                DoodlifyError::configuration(format!("invalid file pattern \"{pattern}\": {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| DoodlifyError::configuration(format!("invalid file patterns: {e}")))?;
        Ok(Self { set: Some(set) })
    }

    pub fn allows(&self, path: &str) -> bool {
        self.set.as_ref().map_or(true, |s| s.is_match(path))
    }
}

/// File-level policy inside an eligible event.
///
/// A backup sibling means "already transformed" and the file is skipped,
/// unless `force` is set or this event's own last attempt on the file never
/// finished.
pub fn file_decision(
    vault: &BackupVault,
    record: Option<&EventRecord>,
    path: &str,
    kind: FileKind,
    force: bool,
) -> FileDecision {
    if !vault.root().join(path).is_file() {
        return FileDecision::Missing;
    }
    if kind == FileKind::Image && !is_transformable_image(path) {
        return FileDecision::Unsupported;
    }
    if !vault.has_backup(path) {
        return FileDecision::Eligible { from_backup: false };
    }
    let unfinished = record
        .and_then(|r| r.file_status.get(path))
        .is_some_and(|s| matches!(s.status, FileState::Pending | FileState::Failed));
    if unfinished {
        FileDecision::Eligible { from_backup: true }
    } else if force {
        FileDecision::Eligible { from_backup: false }
    } else {
        FileDecision::SkippedBackup
    }
}

/// Resolve an analysis path to a file under `root`.
///
/// Analyzers may report paths relative to a source root or to a `public/`
/// asset directory. Lookup order: the path as given, under each source, under
/// `public/`, under each source's `public/`. Returns the repo-relative path of
/// the first existing file.
pub fn locate_file(root: &Path, sources: &[String], path: &str) -> Option<String> {
    let rel = normalize_scope(Some(path));
    if rel.is_empty() {
        return None;
    }
    let sources: Vec<String> = sources
        .iter()
        .map(|s| normalize_scope(Some(s.as_str())))
        .filter(|s| !s.is_empty())
        .collect();

    let mut candidates = vec![rel.clone()];
    candidates.extend(sources.iter().map(|s| format!("{s}/{rel}")));
    candidates.push(format!("public/{rel}"));
    candidates.extend(sources.iter().map(|s| format!("{s}/public/{rel}")));
    candidates.into_iter().find(|c| root.join(c).is_file())
}

/// Candidate files for an event: analysis candidates passing `filter`,
/// minus backup siblings themselves.
pub fn candidate_files(
    candidates: &[(String, FileKind)],
    filter: &FileFilter,
) -> Vec<(String, FileKind)> {
    candidates
        .iter()
        .filter(|(path, _)| !is_backup_path(Path::new(path)) && filter.allows(path))
        .cloned()
        .collect()
}
