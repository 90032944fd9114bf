use anyhow::Result;
use doodlify_core::config::load_config;
use doodlify_core::today_utc;
use doodlify_ledger::{FileLedgerStore, LedgerPaths, LedgerStore};
use std::path::Path;

/// Execute `doodlify status [--json]`
pub fn execute(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FileLedgerStore::new(LedgerPaths::for_config(config_path));
    let ledger = store.load()?;
    let summary = doodlify_conductor::status(&config, &ledger, today_utc());
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary.render());
    }
    Ok(())
}
