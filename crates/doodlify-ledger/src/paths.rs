use std::path::{Path, PathBuf};

/// Well-known paths for one configuration scope under `.doodlify/<scope_id>/`,
/// next to the configuration file.
#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub config_file: PathBuf,
    pub scope: String,
    pub scope_dir: PathBuf,
    pub ledger_json: PathBuf,
    pub events_jsonl: PathBuf,
    pub status_json: PathBuf,
}

impl LedgerPaths {
    /// Derive all paths from the configuration file. Pure computation, no I/O.
    pub fn for_config(config_file: impl Into<PathBuf>) -> Self {
        let config_file = config_file.into();
        let scope = doodlify_store::scope_id(&config_file);
        let base = config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scope_dir = base.join(".doodlify").join(&scope);
        Self {
            ledger_json: scope_dir.join("ledger.json"),
            events_jsonl: scope_dir.join("events.jsonl"),
            status_json: scope_dir.join("runner-status.json"),
            scope_dir,
            scope,
            config_file,
        }
    }

    /// Display name of the configuration file recorded in the ledger.
    pub fn config_name(&self) -> String {
        self.config_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_next_to_config() {
        let p = LedgerPaths::for_config("/repo/ci/doodlify.json");
        assert!(p.scope_dir.starts_with("/repo/ci/.doodlify"));
        assert!(p.ledger_json.ends_with("ledger.json"));
        assert!(p.events_jsonl.ends_with("events.jsonl"));
        assert_eq!(p.config_name(), "doodlify.json");
        assert_eq!(p.scope.len(), 16);
    }

    #[test]
    fn bare_file_name_uses_cwd() {
        let p = LedgerPaths::for_config("doodlify.json");
        assert!(p.scope_dir.starts_with("./.doodlify"));
    }

    #[test]
    fn scopes_differ_per_config_file() {
        let a = LedgerPaths::for_config("/repo/config.json");
        let b = LedgerPaths::for_config("/repo/config.staging.json");
        assert_ne!(a.ledger_json, b.ledger_json);
    }
}
