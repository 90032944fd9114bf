pub mod ledger;
pub mod paths;
pub mod store;

pub use ledger::{
    CachedAnalysis, ErrorInfo, EventRecord, EventStatus, FileState, FileStatus, Ledger,
    PhaseKind, SuggestionRecord, LEDGER_VERSION,
};
pub use paths::LedgerPaths;
pub use store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};
