use anyhow::Result;
use doodlify_conductor::{clear, ClearTarget};
use doodlify_core::config::load_config;
use doodlify_ledger::{FileLedgerStore, LedgerPaths};
use std::path::Path;

/// Execute `doodlify clear (--event-id <id> | --all)`
pub fn execute(config_path: &Path, event_id: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FileLedgerStore::new(LedgerPaths::for_config(config_path));
    let target = match event_id {
        Some(id) => ClearTarget::Event(id.to_string()),
        None => ClearTarget::All,
    };
    let removed = clear(&config, &store, &target)?;
    match (&target, removed) {
        (ClearTarget::Event(id), 0) => println!("Event \"{id}\" has no record; nothing to clear."),
        (ClearTarget::Event(id), _) => println!("Cleared event \"{id}\"."),
        (ClearTarget::All, n) => println!("Cleared {n} event record(s)."),
    }
    Ok(())
}
