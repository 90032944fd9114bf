//! Per-unit outcomes of one phase invocation.

use doodlify_core::{ErrorKind, Severity};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Workspace,
    Analysis,
    Event,
    File,
    Suggestion,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Skipped {
        reason: String,
    },
    /// Not a failure, but something the operator should see.
    Warning {
        #[serde(rename = "error_kind")]
        kind: ErrorKind,
        message: String,
    },
    Failed {
        #[serde(rename = "error_kind")]
        kind: ErrorKind,
        message: String,
    },
}

impl UnitOutcome {
    pub fn done(detail: impl Into<String>) -> Self {
        Self::Done {
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Failure or warning, depending on the severity of `kind`.
    pub fn problem(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind.severity() {
            Severity::Warning => Self::Warning { kind, message },
            Severity::Error => Self::Failed { kind, message },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnitReport {
    pub kind: UnitKind,
    pub id: String,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub units: Vec<UnitReport>,
    pub cancelled: bool,
}

impl PhaseReport {
    pub fn new(phase: &'static str) -> Self {
        Self {
            phase,
            units: Vec::new(),
            cancelled: false,
        }
    }

    pub fn push(&mut self, kind: UnitKind, id: &str, outcome: UnitOutcome) {
        self.units.push(UnitReport {
            kind,
            id: id.to_string(),
            outcome,
        });
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.outcome)).count()
    }

    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Done { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Skipped { .. }))
    }

    pub fn warnings(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Warning { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn units_of(&self, kind: UnitKind) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(move |u| u.kind == kind)
    }

    /// Outcome of the unit `id` of `kind`, if it was reported.
    pub fn outcome(&self, kind: UnitKind, id: &str) -> Option<&UnitOutcome> {
        self.units_of(kind)
            .filter(|u| u.id == id)
            .map(|u| &u.outcome)
            .last()
    }

    /// Human-readable summary for the terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for unit in &self.units {
            let kind = format!("{:?}", unit.kind).to_lowercase();
            let line = match &unit.outcome {
                UnitOutcome::Done { detail } => match detail {
                    Some(d) => format!("  ✓ {kind} {}: {d}", unit.id),
                    None => format!("  ✓ {kind} {}", unit.id),
                },
                UnitOutcome::Skipped { reason } => format!("  ⊘ {kind} {}: {reason}", unit.id),
                UnitOutcome::Warning { message, .. } => {
                    format!("  ! {kind} {}: {message}", unit.id)
                }
                UnitOutcome::Failed { kind: k, message } => {
                    format!("  ✗ {kind} {} [{k:?}]: {message}", unit.id)
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!(
            "{}: {} done, {} skipped, {} warnings, {} failed{}\n",
            self.phase,
            self.done(),
            self.skipped(),
            self.warnings(),
            self.failed(),
            if self.cancelled { " (cancelled)" } else { "" }
        ));
        out
    }
}
