use anyhow::{bail, Context, Result};
use doodlify_core::{now_rfc3339, ErrorKind};
use doodlify_ledger::{ErrorInfo, EventRecord, EventStatus, Ledger, PhaseKind};

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(EventStatus, &[EventStatus])] = &[
    (EventStatus::Unprocessed, &[EventStatus::Processing]),
    (
        EventStatus::Processing,
        &[EventStatus::Processed, EventStatus::Error],
    ),
    (
        EventStatus::Processed,
        &[
            EventStatus::Pushed,
            EventStatus::Error,
            EventStatus::Processing, // explicit reprocess
        ],
    ),
    (
        EventStatus::Error,
        &[EventStatus::Processing, EventStatus::Pushed], // retry
    ),
    // Pushed is terminal; only clear removes it
];

pub fn is_valid_transition(from: EventStatus, to: EventStatus) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

// ── Side effects ──

/// Optional side-effect data applied during a transition.
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub attempts: Option<u32>,
    pub commit_reference: Option<String>,
    pub pr_reference: Option<String>,
    pub error: Option<ErrorInfo>,
    pub clear_error: bool,
}

impl EventUpdate {
    pub fn apply(self, record: &mut EventRecord) {
        if let Some(v) = self.started_at {
            record.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            record.completed_at = Some(v);
        }
        if let Some(v) = self.attempts {
            record.attempts = v;
        }
        if let Some(v) = self.commit_reference {
            record.commit_reference = Some(v);
        }
        if let Some(v) = self.pr_reference {
            record.pr_reference = Some(v);
        }
        if self.clear_error {
            record.last_error = None;
        }
        if self.error.is_some() {
            record.last_error = self.error;
        }
    }
}

// ── CAS-guarded transition ──

/// Transition an event from `from` to `to`, applying side effects.
/// Returns Ok(true) on success, Ok(false) on CAS miss (current != from).
pub fn transition(
    ledger: &mut Ledger,
    event_id: &str,
    from: EventStatus,
    to: EventStatus,
    side_effect: Option<EventUpdate>,
) -> Result<bool> {
    let record = ledger
        .event_mut(event_id)
        .with_context(|| format!("no ledger record for event \"{event_id}\""))?;
    if record.status != from {
        return Ok(false); // CAS miss
    }
    if !is_valid_transition(from, to) {
        bail!("invalid transition: {event_id} {from:?} → {to:?}");
    }
    record.status = to;
    record.updated_at = now_rfc3339();
    if let Some(update) = side_effect {
        update.apply(record);
    }
    Ok(true)
}

/// Record for `event_id`, created as `Unprocessed` on first use.
pub fn ensure_record<'a>(
    ledger: &'a mut Ledger,
    event_id: &str,
    branch_name: &str,
) -> &'a mut EventRecord {
    let record = ledger
        .events
        .entry(event_id.to_string())
        .or_insert_with(|| EventRecord::new(event_id, branch_name));
    record.branch_name = branch_name.to_string();
    record
}

pub fn error_info(kind: ErrorKind, phase: PhaseKind, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo {
        kind,
        phase,
        message: message.into(),
        timestamp: now_rfc3339(),
    }
}

/// Move an event into `Error`, or refresh the error of an event already there.
/// Prior progress (`modified_files`, hashes, references) is kept.
pub fn fail(ledger: &mut Ledger, event_id: &str, error: ErrorInfo) -> Result<()> {
    let mut current = ledger.status_of(event_id);
    if current == EventStatus::Error {
        let record = ledger
            .event_mut(event_id)
            .with_context(|| format!("no ledger record for event \"{event_id}\""))?;
        record.last_error = Some(error);
        record.updated_at = now_rfc3339();
        return Ok(());
    }
    if current == EventStatus::Unprocessed {
        transition(ledger, event_id, current, EventStatus::Processing, None)?;
        current = EventStatus::Processing;
    }
    let moved = transition(
        ledger,
        event_id,
        current,
        EventStatus::Error,
        Some(EventUpdate {
            error: Some(error),
            ..Default::default()
        }),
    )?;
    if !moved {
        bail!("event \"{event_id}\" changed status while recording an error");
    }
    Ok(())
}
