//! The ledger document: everything already done for one configuration scope.
//!
//! All maps are `BTree*` so an unchanged ledger serializes byte-for-byte the
//! same (modulo `updated_at`), which keeps diffs of committed ledgers quiet.

use doodlify_core::analysis::AnalysisResult;
use doodlify_core::{now_rfc3339, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current document version.
pub const LEDGER_VERSION: u32 = 1;

// ── Status enums ──

/// Per-event lifecycle. `Unprocessed` is also the implicit status of an event
/// with no record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Unprocessed,
    Processing,
    Processed,
    Pushed,
    Error,
}

/// Phase in which an error was recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Analyze,
    Process,
    Push,
}

/// Per-file outcome inside an event. `Pending` marks an attempt that started
/// and has not finished yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Processed,
    Failed,
    SkippedBackup,
    Missing,
    Unsupported,
}

// ── Records ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub phase: PhaseKind,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub status: FileState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub status: EventStatus,
    pub branch_name: String,
    /// Grows within a processing cycle; reset only by clearing the record.
    #[serde(default)]
    pub modified_files: BTreeSet<String>,
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub file_status: BTreeMap<String, FileStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInfo>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    /// Project fingerprint the analysis was computed from.
    pub fingerprint: String,
    pub analysis: AnalysisResult,
    pub cached_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub title: String,
    pub fingerprint: String,
    #[serde(default)]
    pub key: String,
    pub issue_reference: String,
    pub reported_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub version: u32,
    pub scope: String,
    #[serde(default)]
    pub config_file: String,
    #[serde(default)]
    pub events: BTreeMap<String, EventRecord>,
    #[serde(default)]
    pub analysis_cache: BTreeMap<String, CachedAnalysis>,
    #[serde(default)]
    pub reported_suggestions: BTreeMap<String, SuggestionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ── Methods ──

impl EventRecord {
    pub fn new(id: &str, branch_name: &str) -> Self {
        Self {
            id: id.to_string(),
            status: EventStatus::Unprocessed,
            branch_name: branch_name.to_string(),
            modified_files: BTreeSet::new(),
            file_hashes: BTreeMap::new(),
            file_status: BTreeMap::new(),
            commit_reference: None,
            pr_reference: None,
            last_error: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
            updated_at: now_rfc3339(),
        }
    }

    /// True once any file of this event has been transformed.
    pub fn has_progress(&self) -> bool {
        !self.modified_files.is_empty()
    }

    /// True when the last recorded failure happened while pushing.
    pub fn failed_in_push(&self) -> bool {
        self.status == EventStatus::Error
            && self
                .last_error
                .as_ref()
                .is_some_and(|e| e.phase == PhaseKind::Push)
    }

    pub fn set_file_status(&mut self, path: &str, status: FileState, detail: Option<String>) {
        self.file_status.insert(
            path.to_string(),
            FileStatus {
                status,
                detail,
                updated_at: now_rfc3339(),
            },
        );
    }
}

impl Ledger {
    /// Empty-but-valid ledger for a scope.
    pub fn new(scope: &str, config_file: &str) -> Self {
        Self {
            version: LEDGER_VERSION,
            scope: scope.to_string(),
            config_file: config_file.to_string(),
            events: BTreeMap::new(),
            analysis_cache: BTreeMap::new(),
            reported_suggestions: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn event(&self, id: &str) -> Option<&EventRecord> {
        self.events.get(id)
    }

    pub fn event_mut(&mut self, id: &str) -> Option<&mut EventRecord> {
        self.events.get_mut(id)
    }

    /// Status of an event; absent records are `Unprocessed`.
    pub fn status_of(&self, id: &str) -> EventStatus {
        self.events
            .get(id)
            .map(|r| r.status)
            .unwrap_or(EventStatus::Unprocessed)
    }

    /// Delete one event record. Returns the removed record, if any.
    pub fn remove_event(&mut self, id: &str) -> Option<EventRecord> {
        self.events.remove(id)
    }

    /// Delete every event record. Analysis cache and reported suggestions stay.
    pub fn clear_events(&mut self) -> usize {
        let n = self.events.len();
        self.events.clear();
        n
    }

    /// Most recent cached analysis.
    pub fn current_analysis(&self) -> Option<&CachedAnalysis> {
        self.analysis_cache.values().max_by(|a, b| a.cached_at.cmp(&b.cached_at))
    }

    /// Store an analysis under its project fingerprint, invalidating entries
    /// computed from any other fingerprint.
    pub fn cache_analysis(&mut self, fingerprint: &str, analysis: AnalysisResult) {
        self.analysis_cache.retain(|fp, _| fp == fingerprint);
        self.analysis_cache.insert(
            fingerprint.to_string(),
            CachedAnalysis {
                fingerprint: fingerprint.to_string(),
                analysis,
                cached_at: now_rfc3339(),
            },
        );
    }

    pub fn is_reported(&self, fingerprint: &str) -> bool {
        self.reported_suggestions.contains_key(fingerprint)
    }

    pub fn record_suggestion(&mut self, record: SuggestionRecord) {
        self.reported_suggestions
            .insert(record.fingerprint.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_event_is_unprocessed() {
        let ledger = Ledger::new("scope", "doodlify.json");
        assert_eq!(ledger.status_of("e1"), EventStatus::Unprocessed);
    }

    #[test]
    fn cache_analysis_invalidates_other_fingerprints() {
        let mut ledger = Ledger::new("scope", "doodlify.json");
        ledger.cache_analysis("fp1", AnalysisResult::default());
        ledger.cache_analysis("fp2", AnalysisResult::default());
        assert_eq!(ledger.analysis_cache.len(), 1);
        assert_eq!(ledger.current_analysis().unwrap().fingerprint, "fp2");
    }

    #[test]
    fn clear_events_keeps_suggestions() {
        let mut ledger = Ledger::new("scope", "doodlify.json");
        ledger
            .events
            .insert("e1".into(), EventRecord::new("e1", "event/e1"));
        ledger.record_suggestion(SuggestionRecord {
            title: "t".into(),
            fingerprint: "fp".into(),
            key: "og_add".into(),
            issue_reference: "#1".into(),
            reported_at: now_rfc3339(),
        });
        assert_eq!(ledger.clear_events(), 1);
        assert!(ledger.events.is_empty());
        assert!(ledger.is_reported("fp"));
    }

    #[test]
    fn failed_in_push_requires_push_phase() {
        let mut record = EventRecord::new("e1", "b");
        record.status = EventStatus::Error;
        record.last_error = Some(ErrorInfo {
            kind: ErrorKind::CollaboratorUnavailable,
            phase: PhaseKind::Process,
            message: "x".into(),
            timestamp: now_rfc3339(),
        });
        assert!(!record.failed_in_push());
        record.last_error.as_mut().unwrap().phase = PhaseKind::Push;
        assert!(record.failed_in_push());
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut ledger = Ledger::new("scope", "doodlify.json");
        let mut record = EventRecord::new("e1", "b");
        record.modified_files.insert("z.png".into());
        record.modified_files.insert("a.png".into());
        ledger.events.insert("e1".into(), record);
        let a = serde_json::to_string(&ledger).unwrap();
        let restored: Ledger = serde_json::from_str(&a).unwrap();
        assert_eq!(serde_json::to_string(&restored).unwrap(), a);
        assert!(a.find("a.png").unwrap() < a.find("z.png").unwrap());
    }
}
