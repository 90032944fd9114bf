use super::report::{PhaseReport, UnitKind, UnitOutcome};
use super::{message, Orchestrator, PushOptions};
use crate::collab::PullRequest;
use crate::state::machine::{error_info, fail, transition, EventUpdate};
use crate::state::select::{events_for_push, PushDecision};
use anyhow::{bail, Context, Result};
use doodlify_core::config::EventConfig;
use doodlify_core::{now_rfc3339, ErrorKind};
use doodlify_ledger::{EventStatus, Ledger, PhaseKind};

pub(crate) async fn run(orch: &Orchestrator<'_>, opts: &PushOptions) -> Result<PhaseReport> {
    let mut report = PhaseReport::new("push");
    let mut ledger = orch.store.load()?;
    let selected = events_for_push(orch.config, &ledger, opts.event_id.as_deref())?;
    let explicit = opts.event_id.is_some();

    if selected
        .iter()
        .any(|(_, d)| matches!(d, PushDecision::Push { .. }))
    {
        orch.prepare_workspace(&mut report).await?;
    }

    for (event, decision) in selected {
        if orch.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        match decision {
            PushDecision::Skip(reason) => {
                orch.note(&mut report, UnitKind::Event, &event.id, UnitOutcome::skipped(reason));
            }
            PushDecision::AlreadyPushed => {
                let pr = ledger
                    .event(&event.id)
                    .and_then(|r| r.pr_reference.clone())
                    .unwrap_or_default();
                let outcome = if explicit {
                    UnitOutcome::problem(ErrorKind::AlreadyPushed, format!("already pushed: {pr}"))
                } else {
                    UnitOutcome::skipped(format!("already pushed: {pr}"))
                };
                orch.note(&mut report, UnitKind::Event, &event.id, outcome);
            }
            PushDecision::Push { from } => {
                push_event(orch, &mut ledger, &mut report, event, from).await?;
            }
        }
    }
    Ok(report)
}

/// Push the branch and open its pull request. The event becomes `Pushed`
/// only once both succeeded.
async fn push_event(
    orch: &Orchestrator<'_>,
    ledger: &mut Ledger,
    report: &mut PhaseReport,
    event: &EventConfig,
    from: EventStatus,
) -> Result<()> {
    let id = event.id.as_str();
    let record = ledger
        .event(id)
        .with_context(|| format!("no ledger record for event \"{id}\""))?;
    let pr = PullRequest {
        branch: record.branch_name.clone(),
        target: orch.target_branch.clone(),
        title: message::pr_title(event),
        body: message::pr_body(event, &record.modified_files),
    };

    let remote = orch.collab.remote;
    let result = async {
        remote.push(&pr.branch).await?;
        remote.open_pull_request(&pr).await
    }
    .await;

    match result {
        Ok(reference) => {
            let moved = transition(
                ledger,
                id,
                from,
                EventStatus::Pushed,
                Some(EventUpdate {
                    pr_reference: Some(reference.clone()),
                    completed_at: Some(now_rfc3339()),
                    clear_error: true,
                    ..Default::default()
                }),
            )?;
            if !moved {
                bail!("event \"{id}\" changed status while pushing");
            }
            orch.save(ledger)?;
            orch.note(report, UnitKind::Event, id, UnitOutcome::done(reference));
        }
        Err(e) => {
            let kind = ErrorKind::of(&e, ErrorKind::CollaboratorUnavailable);
            let message = format!("{e:#}");
            fail(ledger, id, error_info(kind, PhaseKind::Push, &message))?;
            orch.save(ledger)?;
            orch.note(report, UnitKind::Event, id, UnitOutcome::problem(kind, message));
        }
    }
    Ok(())
}
