use crate::settings::Settings;
use anyhow::Result;
use doodlify_conductor::collab::command::{CommandAnalyzer, CommandTransformer};
use doodlify_conductor::collab::git::GitVcs;
use doodlify_conductor::collab::github::GitHubRemote;
use doodlify_conductor::collab::scan::ScanAnalyzer;
use doodlify_conductor::collab::AnalysisCollaborator;
use doodlify_conductor::runner::event_log::EventLogger;
use doodlify_conductor::{
    AnalyzeOptions, Collaborators, Orchestrator, PhaseReport, ProcessOptions, PushOptions,
};
use doodlify_core::config::load_config;
use doodlify_ledger::{FileLedgerStore, LedgerPaths};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub enum Phase {
    Analyze(AnalyzeOptions),
    Process(ProcessOptions),
    Push(PushOptions),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Analyze(_) => "analyze",
            Phase::Process(_) => "process",
            Phase::Push(_) => "push",
        }
    }

    fn needs_gh(&self) -> bool {
        !matches!(self, Phase::Process(_))
    }
}

/// Run one or more phases in order. Returns `false` when any unit failed.
pub fn execute(config_path: &Path, phases: &[Phase]) -> Result<bool> {
    let config = load_config(config_path)?;
    let config_dir = super::config_dir(config_path);
    let settings = Settings::load(&config_dir);
    let repo = settings.repo()?;
    let token = settings.token()?.to_string();
    let workdir = settings.checkout_dir(&config_dir)?;
    debug!(workdir = %workdir.display(), config = %config_path.display(), "resolved checkout");

    let git = GitVcs::github(&workdir, repo).with_token(Some(token.clone()));
    let remote = GitHubRemote::new(git.clone(), repo, Some(token));
    if phases.iter().any(Phase::needs_gh) {
        remote.verify_available()?;
    }
    let analyzer: Box<dyn AnalysisCollaborator> = match &settings.analyze_cmd {
        Some(cmd) => Box::new(CommandAnalyzer::new(cmd.as_str())),
        None => Box::new(ScanAnalyzer),
    };
    let transformer = CommandTransformer::new(
        settings.image_cmd.clone(),
        settings.text_cmd.clone(),
        workdir.clone(),
    );

    let paths = LedgerPaths::for_config(config_path);
    let store = FileLedgerStore::new(paths.clone());
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let orch = Orchestrator::new(
        &config,
        &store,
        Collaborators {
            vcs: &git,
            remote: &remote,
            analyzer: &*analyzer,
            transformer: &transformer,
        },
    )
    .with_target_branch(settings.target_branch.as_deref())
    .with_event_log(EventLogger::new(&paths))
    .with_cancel(cancel);

    println!(
        "{} → {} (base {}, ledger {})",
        config.project.name,
        repo,
        orch.target_branch(),
        paths.ledger_json.display()
    );

    let rt = tokio::runtime::Runtime::new()?;
    let mut ok = true;
    for phase in phases {
        println!("\n── {} ──", phase.name());
        let report: PhaseReport = rt.block_on(async {
            match phase {
                Phase::Analyze(opts) => orch.analyze(opts).await,
                Phase::Process(opts) => orch.process(opts).await,
                Phase::Push(opts) => orch.push(opts).await,
            }
        })?;
        print!("{}", report.render());
        ok &= !report.has_failures();
        if report.cancelled {
            println!("Cancelled. Progress is saved; rerun to resume.");
            break;
        }
    }
    Ok(ok)
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
