pub mod collab;
pub mod runner;
pub mod state;

pub use runner::maintenance::{clear, restore, status, ClearTarget, StatusSummary};
pub use runner::report::{PhaseReport, UnitKind, UnitOutcome, UnitReport};
pub use runner::{AnalyzeOptions, Collaborators, Orchestrator, ProcessOptions, PushOptions};
