use super::report::{PhaseReport, UnitKind, UnitOutcome};
use super::{message, AnalyzeOptions, Orchestrator};
use crate::collab::{AnalysisRequest, IssueRequest};
use anyhow::{Context, Result};
use doodlify_core::analysis::AnalysisResult;
use doodlify_core::fingerprint::{fingerprint_of, suggestion_fingerprint, Fingerprint};
use doodlify_core::{now_rfc3339, DoodlifyError, ErrorKind};
use doodlify_ledger::{Ledger, SuggestionRecord};
use std::collections::HashSet;
use tracing::debug;

/// Analysis for the current working tree, from the cache when the project
/// fingerprint is unchanged. Returns the result and whether it was cached.
///
/// A fresh analysis is stored (pruning stale fingerprints) and saved before
/// returning.
pub(crate) async fn current_analysis(
    orch: &Orchestrator<'_>,
    ledger: &mut Ledger,
    force: bool,
) -> Result<(AnalysisResult, bool)> {
    let project = &orch.config.project;
    let selector = orch.config.defaults.selector.as_deref();
    let listing = orch
        .collab
        .vcs
        .list_sources(&project.sources)
        .await
        .context("listing project sources")?;
    let fingerprint = fingerprint_of(&Fingerprint::Project {
        description: &project.description,
        selector,
        sources: &project.sources,
        listing: &listing,
    });

    if !force {
        if let Some(cached) = ledger.analysis_cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "analysis cache hit");
            return Ok((cached.analysis.clone(), true));
        }
    }

    let request = AnalysisRequest {
        description: project.description.clone(),
        sources: project.sources.clone(),
        selector: selector.map(str::to_string),
        workdir: orch.collab.vcs.workdir().to_path_buf(),
    };
    let analysis = orch.collab.analyzer.analyze(&request).await.map_err(|e| {
        if e.downcast_ref::<DoodlifyError>().is_some() {
            e
        } else {
            DoodlifyError::collaborator("analyzer", format!("{e:#}")).into()
        }
    })?;
    ledger.cache_analysis(&fingerprint, analysis.clone());
    orch.save(ledger)?;
    Ok((analysis, false))
}

pub(crate) async fn run(orch: &Orchestrator<'_>, opts: &AnalyzeOptions) -> Result<PhaseReport> {
    let mut report = PhaseReport::new("analyze");
    orch.prepare_workspace(&mut report).await?;
    let mut ledger = orch.store.load()?;

    let (analysis, cached) = current_analysis(orch, &mut ledger, opts.force).await?;
    orch.note(
        &mut report,
        UnitKind::Analysis,
        &orch.config.project.name,
        UnitOutcome::done(format!(
            "{} ({} images, {} text files, {} suggestions)",
            if cached { "cached" } else { "analyzed" },
            analysis.image_files.len(),
            analysis.text_files.len(),
            analysis.improvement_suggestions.len()
        )),
    );

    let remote = orch.collab.remote;
    let mut seen = HashSet::new();
    for suggestion in &analysis.improvement_suggestions {
        if orch.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let fingerprint = suggestion_fingerprint(suggestion);
        let id = suggestion.title.as_str();
        if !seen.insert(fingerprint.clone()) {
            orch.note(&mut report, UnitKind::Suggestion, id, UnitOutcome::skipped("duplicate"));
            continue;
        }
        if let Some(existing) = ledger.reported_suggestions.get(&fingerprint) {
            let reason = format!("already reported as {}", existing.issue_reference);
            orch.note(&mut report, UnitKind::Suggestion, id, UnitOutcome::skipped(reason));
            continue;
        }
        if !opts.report_all && !orch.config.defaults.should_report(&suggestion.key) {
            let reason = format!("\"{}\" disabled by reportSuggestions", suggestion.key);
            orch.note(&mut report, UnitKind::Suggestion, id, UnitOutcome::skipped(reason));
            continue;
        }

        let issue = IssueRequest {
            title: suggestion.title.clone(),
            body: message::issue_body(suggestion),
            labels: suggestion.labels.clone(),
        };
        match remote.open_issue(&issue).await {
            Ok(reference) => {
                ledger.record_suggestion(SuggestionRecord {
                    title: suggestion.title.clone(),
                    fingerprint,
                    key: suggestion.key.clone(),
                    issue_reference: reference.clone(),
                    reported_at: now_rfc3339(),
                });
                orch.save(&ledger)?;
                orch.note(&mut report, UnitKind::Suggestion, id, UnitOutcome::done(reference));
            }
            Err(e) => {
                let kind = ErrorKind::of(&e, ErrorKind::CollaboratorUnavailable);
                orch.note(
                    &mut report,
                    UnitKind::Suggestion,
                    id,
                    UnitOutcome::problem(kind, format!("{e:#}")),
                );
            }
        }
    }
    Ok(report)
}
