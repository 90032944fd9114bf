use crate::ledger::{Ledger, LEDGER_VERSION};
use crate::paths::LedgerPaths;
use anyhow::{bail, Context, Result};
use doodlify_core::{now_rfc3339, DoodlifyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Durable home of one scope's ledger.
///
/// `save` must be atomic: after a crash, `load` returns either the previous or
/// the new document, never a mix.
pub trait LedgerStore: Send + Sync {
    /// Load the ledger. A scope that was never saved yields an empty ledger.
    fn load(&self) -> Result<Ledger>;
    fn save(&self, ledger: &Ledger) -> Result<()>;
}

// ── File-backed ──

/// `ledger.json` under `.doodlify/<scope>/`, written via temp file + rename.
pub struct FileLedgerStore {
    paths: LedgerPaths,
}

impl FileLedgerStore {
    pub fn new(paths: LedgerPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Ledger> {
        let path = &self.paths.ledger_json;
        if !path.exists() {
            return Ok(Ledger::new(&self.paths.scope, &self.paths.config_name()));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger: {}", path.display()))?;
        let ledger: Ledger = serde_json::from_str(&content)
            .with_context(|| format!("parsing ledger: {}", path.display()))?;
        if ledger.version > LEDGER_VERSION {
            bail!(DoodlifyError::configuration(format!(
                "ledger {} has version {}, newer than supported {}",
                path.display(),
                ledger.version,
                LEDGER_VERSION
            )));
        }
        if ledger.scope != self.paths.scope {
            bail!(DoodlifyError::configuration(format!(
                "ledger {} belongs to scope {}, expected {}",
                path.display(),
                ledger.scope,
                self.paths.scope
            )));
        }
        Ok(ledger)
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let path = &self.paths.ledger_json;
        let mut stamped = ledger.clone();
        stamped.updated_at = Some(now_rfc3339());
        let data = serde_json::to_string_pretty(&stamped)?;
        doodlify_store::write_atomic(path, data.as_bytes())
            .with_context(|| format!("saving ledger: {}", path.display()))?;
        debug!(path = %path.display(), events = ledger.events.len(), "ledger saved");
        Ok(())
    }
}

// ── In-memory ──

/// Ledger kept in memory. Used by tests and dry runs.
///
/// `fail_after(n)` makes every save after the first `n` fail, which simulates
/// a process dying between two durable steps.
pub struct MemoryLedgerStore {
    ledger: Mutex<Ledger>,
    saves: AtomicUsize,
    fail_after: Mutex<Option<usize>>,
}

impl MemoryLedgerStore {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            saves: AtomicUsize::new(0),
            fail_after: Mutex::new(None),
        }
    }

    pub fn empty(scope: &str) -> Self {
        Self::new(Ledger::new(scope, "doodlify.json"))
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_after(&self, successful_saves: Option<usize>) {
        if let Ok(mut guard) = self.fail_after.lock() {
            *guard = successful_saves;
        }
    }

    /// Last successfully saved document.
    pub fn snapshot(&self) -> Ledger {
        match self.ledger.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Ledger> {
        Ok(self.snapshot())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let limit = self.fail_after.lock().map(|g| *g).unwrap_or(None);
        if limit.is_some_and(|n| self.save_count() >= n) {
            bail!("simulated ledger write failure");
        }
        let mut guard = self
            .ledger
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger mutex poisoned"))?;
        *guard = ledger.clone();
        guard.updated_at = Some(now_rfc3339());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EventRecord, EventStatus};

    fn file_store(dir: &std::path::Path) -> FileLedgerStore {
        FileLedgerStore::new(LedgerPaths::for_config(dir.join("doodlify.json")))
    }

    #[test]
    fn missing_ledger_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(dir.path());
        let ledger = store.load().unwrap();
        assert!(ledger.events.is_empty());
        assert_eq!(ledger.version, LEDGER_VERSION);
        assert_eq!(ledger.config_file, "doodlify.json");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(dir.path());
        let mut ledger = store.load().unwrap();
        let mut record = EventRecord::new("halloween", "event/halloween");
        record.status = EventStatus::Processed;
        record.modified_files.insert("public/hero.png".into());
        ledger.events.insert("halloween".into(), record);
        store.save(&ledger).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.status_of("halloween"), EventStatus::Processed);
        assert!(loaded.updated_at.is_some());
        assert!(store.paths().ledger_json.starts_with(dir.path().join(".doodlify")));
    }

    #[test]
    fn corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(dir.path());
        std::fs::create_dir_all(&store.paths().scope_dir).unwrap();
        std::fs::write(&store.paths().ledger_json, "{not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn foreign_scope_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(dir.path());
        store.save(&Ledger::new("0000000000000000", "other.json")).unwrap();
        let err = store.load().unwrap_err();
        assert!(err.downcast_ref::<DoodlifyError>().is_some());
    }

    #[test]
    fn memory_store_simulates_write_failure() {
        let store = MemoryLedgerStore::empty("s");
        store.fail_after(Some(1));
        let mut ledger = store.load().unwrap();
        ledger.events.insert("a".into(), EventRecord::new("a", "b"));
        store.save(&ledger).unwrap();
        ledger.events.insert("c".into(), EventRecord::new("c", "d"));
        assert!(store.save(&ledger).is_err());
        assert_eq!(store.snapshot().events.len(), 1);
        assert_eq!(store.save_count(), 1);
    }
}
