//! Operator commands outside the three phases: clear, restore, status.

use super::report::{PhaseReport, UnitKind, UnitOutcome};
use crate::collab::Vcs;
use anyhow::Result;
use doodlify_core::config::Config;
use doodlify_core::fingerprint::normalize_scope;
use doodlify_core::{DoodlifyError, ErrorKind};
use doodlify_ledger::{EventStatus, Ledger, LedgerStore};
use doodlify_store::BackupVault;
use serde::Serialize;
use std::collections::BTreeSet;
use time::Date;
use tracing::{info, warn};

// ── Clear ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    Event(String),
    All,
}

/// Delete event records so the events start over as `Unprocessed`.
/// Backups, the analysis cache and reported suggestions are kept.
pub fn clear(config: &Config, store: &dyn LedgerStore, target: &ClearTarget) -> Result<usize> {
    let mut ledger = store.load()?;
    let removed = match target {
        ClearTarget::All => ledger.clear_events(),
        ClearTarget::Event(id) => {
            if config.event(id).is_none() && ledger.event(id).is_none() {
                return Err(DoodlifyError::EventNotFound {
                    event_id: id.clone(),
                }
                .into());
            }
            usize::from(ledger.remove_event(id).is_some())
        }
    };
    if removed > 0 {
        store.save(&ledger)?;
    }
    info!(?target, removed, "cleared event records");
    Ok(removed)
}

// ── Restore ──

/// Put backed-up originals back on the event's branch and commit the result.
///
/// With no `files`, every file the event modified is restored. A file without
/// a backup is reported as `BackupMissing` without stopping the others.
pub async fn restore(
    vcs: &dyn Vcs,
    store: &dyn LedgerStore,
    config: &Config,
    event_id: &str,
    files: &[String],
    target_branch: &str,
) -> Result<PhaseReport> {
    let event = config
        .event(event_id)
        .ok_or_else(|| DoodlifyError::EventNotFound {
            event_id: event_id.to_string(),
        })?;
    let mut report = PhaseReport::new("restore");
    let mut ledger = store.load()?;

    let files: BTreeSet<String> = if files.is_empty() {
        ledger
            .event(event_id)
            .map(|r| r.modified_files.clone())
            .unwrap_or_default()
    } else {
        files.iter().map(|f| normalize_scope(Some(f.as_str()))).collect()
    };
    if files.is_empty() {
        report.push(
            UnitKind::Event,
            event_id,
            UnitOutcome::skipped("no files to restore"),
        );
        return Ok(report);
    }

    let branch = event.branch_name(&config.defaults);
    if let Some(stash) = vcs.stash_if_dirty().await? {
        warn!(stash = %stash, "uncommitted changes stashed before restore");
        report.push(
            UnitKind::Workspace,
            &branch,
            UnitOutcome::problem(
                ErrorKind::WorkspaceStashed,
                format!("uncommitted changes stashed as \"{stash}\""),
            ),
        );
    }
    vcs.ensure_branch(&branch, target_branch).await?;

    let vault = BackupVault::new(vcs.workdir());
    let mut restored = 0usize;
    for path in &files {
        match vault.restore(path) {
            Ok(()) => {
                if let Some(record) = ledger.event_mut(event_id) {
                    record.file_status.remove(path);
                    record.file_hashes.remove(path);
                    store.save(&ledger)?;
                }
                restored += 1;
                info!(event = event_id, file = %path, "restored");
                report.push(UnitKind::File, path, UnitOutcome::done("restored"));
            }
            Err(e) => {
                let kind = ErrorKind::of(&e, ErrorKind::BackupMissing);
                warn!(event = event_id, file = %path, error = %format!("{e:#}"), "restore failed");
                report.push(UnitKind::File, path, UnitOutcome::problem(kind, format!("{e:#}")));
            }
        }
    }

    if restored > 0 {
        let message = format!("Restore original files for {} event\n", event.name);
        match vcs.commit_all(&message).await {
            Ok(commit) => report.push(
                UnitKind::Event,
                event_id,
                UnitOutcome::done(commit.unwrap_or_else(|| "nothing to commit".into())),
            ),
            Err(e) => report.push(
                UnitKind::Event,
                event_id,
                UnitOutcome::problem(
                    ErrorKind::of(&e, ErrorKind::CollaboratorUnavailable),
                    format!("{e:#}"),
                ),
            ),
        }
    }
    Ok(report)
}

// ── Status ──

#[derive(Debug, Clone, Serialize)]
pub struct EventStatusLine {
    pub id: String,
    pub name: String,
    pub status: EventStatus,
    pub active: bool,
    pub branch: String,
    pub modified_files: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInfo {
    pub fingerprint: String,
    pub cached_at: String,
    pub candidate_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub scope: String,
    pub events: Vec<EventStatusLine>,
    /// Ledger records whose event is no longer configured.
    pub orphaned: Vec<String>,
    pub reported_suggestions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisInfo>,
}

pub fn status(config: &Config, ledger: &Ledger, today: Date) -> StatusSummary {
    let events = config
        .events
        .iter()
        .map(|e| {
            let record = ledger.event(&e.id);
            EventStatusLine {
                id: e.id.clone(),
                name: e.name.clone(),
                status: ledger.status_of(&e.id),
                active: e.is_active(today),
                branch: e.branch_name(&config.defaults),
                modified_files: record.map_or(0, |r| r.modified_files.len()),
                attempts: record.map_or(0, |r| r.attempts),
                commit_reference: record.and_then(|r| r.commit_reference.clone()),
                pr_reference: record.and_then(|r| r.pr_reference.clone()),
                last_error: record
                    .and_then(|r| r.last_error.as_ref())
                    .map(|e| format!("{:?} during {:?}: {}", e.kind, e.phase, e.message)),
            }
        })
        .collect();
    let orphaned = ledger
        .events
        .keys()
        .filter(|id| config.event(id).is_none())
        .cloned()
        .collect();
    StatusSummary {
        scope: ledger.scope.clone(),
        events,
        orphaned,
        reported_suggestions: ledger.reported_suggestions.len(),
        analysis: ledger.current_analysis().map(|c| AnalysisInfo {
            fingerprint: c.fingerprint.clone(),
            cached_at: c.cached_at.clone(),
            candidate_files: c.analysis.candidate_files().len(),
        }),
    }
}

impl StatusSummary {
    pub fn render(&self) -> String {
        let mut out = format!("scope {}\n", self.scope);
        for e in &self.events {
            out.push_str(&format!(
                "  {:<16} {:<12} {} {}{}\n",
                e.id,
                format!("{:?}", e.status).to_lowercase(),
                e.branch,
                if e.active { "(active) " } else { "" },
                match (&e.pr_reference, &e.commit_reference) {
                    (Some(pr), _) => format!("pr {pr}"),
                    (None, Some(c)) => format!("commit {c}"),
                    (None, None) => String::new(),
                }
            ));
            if let Some(err) = &e.last_error {
                out.push_str(&format!("    last error: {err}\n"));
            }
        }
        for id in &self.orphaned {
            out.push_str(&format!("  {id:<16} (not in configuration)\n"));
        }
        out.push_str(&format!(
            "{} suggestions reported\n",
            self.reported_suggestions
        ));
        if let Some(a) = &self.analysis {
            out.push_str(&format!(
                "analysis {} cached at {} ({} candidate files)\n",
                &a.fingerprint[..a.fingerprint.len().min(12)],
                a.cached_at,
                a.candidate_files
            ));
        }
        out
    }
}
