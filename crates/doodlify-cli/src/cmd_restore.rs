use crate::settings::Settings;
use anyhow::Result;
use doodlify_conductor::collab::git::GitVcs;
use doodlify_core::config::load_config;
use doodlify_ledger::{FileLedgerStore, LedgerPaths};
use std::path::{Path, PathBuf};

/// Execute `doodlify restore --event-id <id> [--files a,b]`
pub fn execute(
    config_path: &Path,
    event_id: &str,
    files: &[String],
    workdir: Option<PathBuf>,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let config_dir = super::config_dir(config_path);
    let settings = Settings::load(&config_dir);
    let workdir = match workdir {
        Some(dir) => dir,
        None => settings.checkout_dir(&config_dir)?,
    };
    // Restore never clones, so no remote URL or token is needed.
    let git = GitVcs::new(&workdir, String::new());
    let store = FileLedgerStore::new(LedgerPaths::for_config(config_path));
    let target = config.target_branch(settings.target_branch.as_deref());

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(doodlify_conductor::restore(
        &git, &store, &config, event_id, files, &target,
    ))?;
    print!("{}", report.render());
    Ok(!report.has_failures())
}
