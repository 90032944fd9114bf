//! Phase runners: analyze, process, push, plus ledger maintenance.
//!
//! Every runner loads the ledger once, saves it after each unit of work, and
//! turns per-unit failures into [`UnitOutcome::Failed`] entries. Only
//! phase-wide preconditions (working tree, ledger I/O, unknown event ids)
//! return `Err`.

pub mod analyze;
pub mod event_log;
pub mod maintenance;
pub mod message;
pub mod process;
pub mod push;
pub mod report;

#[cfg(test)]
pub(crate) mod fakes;

use crate::collab::{AnalysisCollaborator, RemoteRepo, TransformCollaborator, Vcs};
use anyhow::{Context, Result};
use doodlify_core::config::Config;
use doodlify_core::{today_utc, ErrorKind};
use doodlify_ledger::{Ledger, LedgerStore};
use event_log::{Event, EventLogger};
use report::{PhaseReport, UnitKind, UnitOutcome};
use std::future::Future;
use time::Date;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Ignore the cached analysis.
    pub force: bool,
    /// File suggestions regardless of `reportSuggestions`.
    pub report_all: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Only this event; bypasses the date window and allows reprocessing.
    pub event_id: Option<String>,
    /// Paths or glob patterns restricting the files considered.
    pub only: Vec<String>,
    /// Reprocess files that already have a backup.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub event_id: Option<String>,
}

/// The collaborators a full run needs.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub vcs: &'a dyn Vcs,
    pub remote: &'a dyn RemoteRepo,
    pub analyzer: &'a dyn AnalysisCollaborator,
    pub transformer: &'a dyn TransformCollaborator,
}

pub struct Orchestrator<'a> {
    pub(crate) config: &'a Config,
    pub(crate) store: &'a dyn LedgerStore,
    pub(crate) collab: Collaborators<'a>,
    pub(crate) log: EventLogger,
    pub(crate) target_branch: String,
    pub(crate) today: Date,
    pub(crate) cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, store: &'a dyn LedgerStore, collab: Collaborators<'a>) -> Self {
        Self {
            config,
            store,
            collab,
            log: EventLogger::disabled(),
            target_branch: config.target_branch(None),
            today: today_utc(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_log(mut self, log: EventLogger) -> Self {
        self.log = log;
        self
    }

    /// Base branch override (e.g. from `GIT_BRANCH_CHANGES_TARGET`).
    pub fn with_target_branch(mut self, branch: Option<&str>) -> Self {
        self.target_branch = self.config.target_branch(branch);
        self
    }

    pub fn with_today(mut self, today: Date) -> Self {
        self.today = today;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    pub async fn analyze(&self, opts: &AnalyzeOptions) -> Result<PhaseReport> {
        self.phase("analyze", analyze::run(self, opts)).await
    }

    pub async fn process(&self, opts: &ProcessOptions) -> Result<PhaseReport> {
        self.phase("process", process::run(self, opts)).await
    }

    pub async fn push(&self, opts: &PushOptions) -> Result<PhaseReport> {
        self.phase("push", push::run(self, opts)).await
    }

    /// Bracket a phase with start/end log records and a status snapshot.
    async fn phase(
        &self,
        name: &str,
        body: impl Future<Output = Result<PhaseReport>>,
    ) -> Result<PhaseReport> {
        info!(phase = name, target = %self.target_branch, "phase start");
        self.log.record(Event::PhaseStart {
            phase: name.to_string(),
        });
        let result = body.await;
        let status = match &result {
            Ok(report) => {
                self.log.record(Event::PhaseCompleted {
                    phase: name.to_string(),
                    done: report.done(),
                    skipped: report.skipped(),
                    failed: report.failed(),
                    cancelled: report.cancelled,
                });
                if report.cancelled {
                    "cancelled"
                } else if report.has_failures() {
                    "failed"
                } else {
                    "completed"
                }
            }
            Err(e) => {
                warn!(phase = name, error = %format!("{e:#}"), "phase aborted");
                self.log.record(Event::PhaseAborted {
                    phase: name.to_string(),
                    error: format!("{e:#}"),
                });
                "aborted"
            }
        };
        if let Ok(ledger) = self.store.load() {
            self.log.write_status(&ledger, name, status);
        }
        result
    }

    /// Record a unit outcome in the report, the tracing log and the event log.
    pub(crate) fn note(
        &self,
        report: &mut PhaseReport,
        kind: UnitKind,
        id: &str,
        outcome: UnitOutcome,
    ) {
        match &outcome {
            UnitOutcome::Done { detail } => info!(phase = report.phase, ?kind, id, ?detail, "done"),
            UnitOutcome::Skipped { reason } => {
                debug!(phase = report.phase, ?kind, id, reason = %reason, "skipped")
            }
            UnitOutcome::Warning { kind: k, message } => {
                warn!(phase = report.phase, ?kind, id, error_kind = ?k, message = %message, "warning")
            }
            UnitOutcome::Failed { kind: k, message } => {
                warn!(phase = report.phase, ?kind, id, error_kind = ?k, message = %message, "failed")
            }
        }
        self.log.record(Event::Unit {
            phase: report.phase.to_string(),
            unit: kind,
            id: id.to_string(),
            result: outcome.clone(),
        });
        report.push(kind, id, outcome);
    }

    pub(crate) fn save(&self, ledger: &Ledger) -> Result<()> {
        self.store.save(ledger)
    }

    /// Stash stray changes and bring the base branch up to date. Fatal on
    /// failure: every unit of the phase needs the working tree.
    pub(crate) async fn prepare_workspace(&self, report: &mut PhaseReport) -> Result<()> {
        let vcs = self.collab.vcs;
        if let Some(stash) = vcs
            .stash_if_dirty()
            .await
            .context("stashing uncommitted changes")?
        {
            self.note(
                report,
                UnitKind::Workspace,
                &vcs.workdir().display().to_string(),
                UnitOutcome::problem(
                    ErrorKind::WorkspaceStashed,
                    format!("uncommitted changes stashed as \"{stash}\""),
                ),
            );
        }
        vcs.clone_or_update(&self.target_branch)
            .await
            .with_context(|| format!("preparing working tree on {}", self.target_branch))?;
        Ok(())
    }
}
