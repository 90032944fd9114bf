use super::analyze::current_analysis;
use super::report::{PhaseReport, UnitKind, UnitOutcome};
use super::{message, Orchestrator, ProcessOptions};
use crate::collab::EventContext;
use crate::state::machine::{ensure_record, error_info, fail, transition, EventUpdate};
use crate::state::select::{
    candidate_files, events_for_process, file_decision, locate_file, scoped_events,
    EventDecision, FileDecision, FileFilter,
};
use anyhow::{bail, Context, Result};
use doodlify_core::analysis::FileKind;
use doodlify_core::config::EventConfig;
use doodlify_core::hash::content_hash;
use doodlify_core::{now_rfc3339, DoodlifyError, ErrorKind};
use doodlify_ledger::{EventRecord, EventStatus, FileState, Ledger, PhaseKind};
use doodlify_store::{write_atomic, BackupVault};
use std::collections::BTreeSet;
use std::fs;
use tracing::info;

pub(crate) async fn run(orch: &Orchestrator<'_>, opts: &ProcessOptions) -> Result<PhaseReport> {
    let mut report = PhaseReport::new("process");
    let event_id = opts.event_id.as_deref();
    // Argument errors abort before anything is touched.
    let filter = FileFilter::new(&opts.only)?;
    scoped_events(orch.config, event_id)?;

    orch.prepare_workspace(&mut report).await?;
    let mut ledger = orch.store.load()?;
    let (analysis, _) = current_analysis(orch, &mut ledger, false).await?;
    let candidates = candidate_files(&analysis.candidate_files(), &filter);

    let selected = events_for_process(orch.config, &ledger, event_id, orch.today)?;
    for (event, decision) in selected {
        if orch.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let resume = match decision {
            EventDecision::Eligible { resume } => resume,
            EventDecision::Skip(reason) => {
                orch.note(&mut report, UnitKind::Event, &event.id, UnitOutcome::skipped(reason));
                continue;
            }
        };
        process_event(orch, &mut ledger, &mut report, event, resume, &candidates, opts.force)
            .await?;
    }
    Ok(report)
}

fn record_mut<'l>(ledger: &'l mut Ledger, id: &str) -> Result<&'l mut EventRecord> {
    ledger
        .event_mut(id)
        .with_context(|| format!("no ledger record for event \"{id}\""))
}

/// One event's processing cycle. Per-file and per-event failures end up in
/// the ledger and the report; only ledger persistence errors escape.
async fn process_event(
    orch: &Orchestrator<'_>,
    ledger: &mut Ledger,
    report: &mut PhaseReport,
    event: &EventConfig,
    resume: bool,
    candidates: &[(String, FileKind)],
    force: bool,
) -> Result<()> {
    let id = event.id.as_str();
    let branch = event.branch_name(&orch.config.defaults);
    let vcs = orch.collab.vcs;

    if let Err(e) = switch_branch(orch, report, &branch).await {
        let kind = ErrorKind::of(&e, ErrorKind::CollaboratorUnavailable);
        let message = format!("{e:#}");
        ensure_record(ledger, id, &branch);
        fail(ledger, id, error_info(kind, PhaseKind::Process, &message))?;
        orch.save(ledger)?;
        orch.note(report, UnitKind::Event, id, UnitOutcome::problem(kind, message));
        return Ok(());
    }

    let vault = BackupVault::new(vcs.workdir());
    let sources = &orch.config.project.sources;
    let mut seen = BTreeSet::new();
    let mut decisions: Vec<(String, FileKind, FileDecision)> = Vec::new();
    for (path, kind) in candidates {
        let rel = locate_file(vault.root(), sources, path).unwrap_or_else(|| path.clone());
        if !seen.insert(rel.clone()) {
            continue;
        }
        let decision = file_decision(&vault, ledger.event(id), &rel, *kind, force);
        decisions.push((rel, *kind, decision));
    }
    let eligible = decisions
        .iter()
        .filter(|(_, _, d)| matches!(d, FileDecision::Eligible { .. }))
        .count();
    let has_progress = ledger.event(id).is_some_and(EventRecord::has_progress);
    if eligible == 0 && !has_progress {
        orch.note(report, UnitKind::Event, id, UnitOutcome::skipped("nothing to do"));
        return Ok(());
    }

    // Enter Processing.
    let current = ledger.status_of(id);
    let attempts = ensure_record(ledger, id, &branch).attempts + 1;
    let update = EventUpdate {
        started_at: Some(now_rfc3339()),
        attempts: Some(attempts),
        ..Default::default()
    };
    if resume && current == EventStatus::Processing {
        info!(event = id, "resuming interrupted processing");
        update.apply(record_mut(ledger, id)?);
    } else if !transition(ledger, id, current, EventStatus::Processing, Some(update))? {
        bail!("event \"{id}\" changed status before processing");
    }

    let record = record_mut(ledger, id)?;
    for (path, _, decision) in &decisions {
        let (state, reason) = match decision {
            FileDecision::Eligible { .. } => continue,
            FileDecision::Missing => (FileState::Missing, "missing from working tree"),
            FileDecision::Unsupported => (FileState::Unsupported, "unsupported image format"),
            FileDecision::SkippedBackup => {
                if !record.file_status.contains_key(path) {
                    record.set_file_status(path, FileState::SkippedBackup, None);
                }
                orch.note(report, UnitKind::File, path, UnitOutcome::skipped("backup exists"));
                continue;
            }
        };
        record.set_file_status(path, state, None);
        orch.note(report, UnitKind::File, path, UnitOutcome::skipped(reason));
    }
    orch.save(ledger)?;

    let ctx = EventContext::from_config(event);
    let mut attempted = 0usize;
    let mut succeeded = 0usize;
    for (path, kind, decision) in &decisions {
        let FileDecision::Eligible { from_backup } = *decision else {
            continue;
        };
        if orch.cancel.is_cancelled() {
            report.cancelled = true;
            orch.note(
                report,
                UnitKind::Event,
                id,
                UnitOutcome::skipped("cancelled; the next run resumes"),
            );
            return Ok(());
        }
        attempted += 1;
        record_mut(ledger, id)?.set_file_status(path, FileState::Pending, None);
        orch.save(ledger)?;

        match transform_file(orch, &vault, path, *kind, from_backup, &ctx).await {
            Ok(hash) => {
                let record = record_mut(ledger, id)?;
                record.modified_files.insert(path.to_string());
                record.file_hashes.insert(path.to_string(), hash.clone());
                record.set_file_status(path, FileState::Processed, None);
                orch.save(ledger)?;
                succeeded += 1;
                orch.note(report, UnitKind::File, path, UnitOutcome::done(hash));
            }
            Err(e) => {
                let kind = ErrorKind::of(&e, ErrorKind::TransformFailure);
                let message = format!("{e:#}");
                record_mut(ledger, id)?.set_file_status(
                    path,
                    FileState::Failed,
                    Some(message.clone()),
                );
                orch.save(ledger)?;
                orch.note(report, UnitKind::File, path, UnitOutcome::problem(kind, message));
            }
        }
    }

    // Files finished earlier in this cycle (before a crash or a failed
    // commit) count as successes too.
    let record = record_mut(ledger, id)?;
    let has_progress = record.has_progress();
    let any_processed = record
        .file_status
        .values()
        .any(|s| s.status == FileState::Processed);
    if succeeded == 0 && !any_processed && (attempted > 0 || !has_progress) {
        let message = format!("all {attempted} file transforms failed");
        fail(
            ledger,
            id,
            error_info(ErrorKind::TransformFailure, PhaseKind::Process, &message),
        )?;
        orch.save(ledger)?;
        orch.note(
            report,
            UnitKind::Event,
            id,
            UnitOutcome::problem(ErrorKind::TransformFailure, message),
        );
        return Ok(());
    }

    let files = record_mut(ledger, id)?.modified_files.clone();
    match vcs.commit_all(&message::commit_message(event, &files)).await {
        Ok(commit) => {
            let detail = match &commit {
                Some(c) => format!("{succeeded} files, commit {c}"),
                None => format!("{succeeded} files, nothing new to commit"),
            };
            let moved = transition(
                ledger,
                id,
                EventStatus::Processing,
                EventStatus::Processed,
                Some(EventUpdate {
                    commit_reference: commit,
                    completed_at: Some(now_rfc3339()),
                    clear_error: true,
                    ..Default::default()
                }),
            )?;
            if !moved {
                bail!("event \"{id}\" left Processing unexpectedly");
            }
            orch.save(ledger)?;
            orch.note(report, UnitKind::Event, id, UnitOutcome::done(detail));
        }
        Err(e) => {
            let kind = ErrorKind::of(&e, ErrorKind::CollaboratorUnavailable);
            let message = format!("commit failed: {e:#}");
            fail(ledger, id, error_info(kind, PhaseKind::Process, &message))?;
            orch.save(ledger)?;
            orch.note(report, UnitKind::Event, id, UnitOutcome::problem(kind, message));
        }
    }
    Ok(())
}

async fn switch_branch(orch: &Orchestrator<'_>, report: &mut PhaseReport, branch: &str) -> Result<()> {
    let vcs = orch.collab.vcs;
    if let Some(stash) = vcs.stash_if_dirty().await? {
        orch.note(
            report,
            UnitKind::Workspace,
            branch,
            UnitOutcome::problem(
                ErrorKind::WorkspaceStashed,
                format!("uncommitted changes stashed as \"{stash}\" before switching"),
            ),
        );
    }
    vcs.ensure_branch(branch, &orch.target_branch).await
}

/// Backup, transform, write. Returns the content hash of the new bytes.
///
/// `from_backup` feeds the original bytes to the transform instead of the
/// current file, so a half-finished earlier attempt is never transformed twice.
async fn transform_file(
    orch: &Orchestrator<'_>,
    vault: &BackupVault,
    path: &str,
    kind: FileKind,
    from_backup: bool,
    ctx: &EventContext,
) -> Result<String> {
    vault.backup(path)?;
    let source = if from_backup {
        vault.backup_path(path)
    } else {
        vault.root().join(path)
    };
    let bytes = fs::read(&source).with_context(|| format!("reading {}", source.display()))?;
    let transformer = orch.collab.transformer;
    let output = match kind {
        FileKind::Image => transformer.transform_image(bytes, path, ctx).await?,
        FileKind::Text => {
            let text = String::from_utf8(bytes).map_err(|_| DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: "not valid UTF-8 text".into(),
            })?;
            transformer.transform_text(text, path, ctx).await?.into_bytes()
        }
    };
    write_atomic(&vault.root().join(path), &output)?;
    Ok(content_hash(&output))
}
