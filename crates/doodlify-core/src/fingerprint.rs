//! Stable identity keys for "already handled" detection.
//!
//! A fingerprint is the SHA-256 of the canonical JSON of a normalized, tagged
//! projection of an entity. Volatile data (timestamps, listing order) never
//! enters the projection, so equal logical entities hash equally across runs,
//! machines and clones.
//!
//! Transformed files are deliberately *not* fingerprinted here: their
//! "already processed" signal is the backup sibling (see `doodlify_store::backup`).

use crate::analysis::Suggestion;
use crate::hash::sha256_hex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// One file of the project source listing: repo-relative path + content digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceEntry {
    pub path: String,
    pub digest: String,
}

/// Entities that can be fingerprinted.
#[derive(Debug, Clone, Copy)]
pub enum Fingerprint<'a> {
    Suggestion {
        key: &'a str,
        title: &'a str,
        scope: Option<&'a str>,
    },
    /// Inputs that determine an analysis result.
    Project {
        description: &'a str,
        selector: Option<&'a str>,
        sources: &'a [String],
        listing: &'a [SourceEntry],
    },
}

impl<'a> Fingerprint<'a> {
    pub fn suggestion(s: &'a Suggestion) -> Self {
        Fingerprint::Suggestion {
            key: &s.key,
            title: &s.title,
            scope: s.scope.as_deref(),
        }
    }

    fn projection(&self) -> serde_json::Value {
        match *self {
            Fingerprint::Suggestion { key, title, scope } => json!({
                "kind": "suggestion",
                "key": key.trim(),
                "title": normalize_title(title),
                "scope": normalize_scope(scope),
            }),
            Fingerprint::Project {
                description,
                selector,
                sources,
                listing,
            } => {
                let mut sources: Vec<String> =
                    sources.iter().map(|s| normalize_scope(Some(s.as_str()))).collect();
                sources.sort();
                sources.dedup();
                let mut files: Vec<SourceEntry> = listing
                    .iter()
                    .map(|e| SourceEntry {
                        path: normalize_scope(Some(e.path.as_str())),
                        digest: e.digest.clone(),
                    })
                    .collect();
                files.sort();
                files.dedup();
                json!({
                    "kind": "project",
                    "description": description.trim(),
                    "selector": selector.map(str::trim).unwrap_or_default(),
                    "sources": sources,
                    "files": files
                        .iter()
                        .map(|e| [e.path.as_str(), e.digest.as_str()])
                        .collect::<Vec<_>>(),
                })
            }
        }
    }
}

/// Deterministic fingerprint of an entity.
pub fn fingerprint_of(entity: &Fingerprint<'_>) -> String {
    let canonical = canonicalize(&entity.projection());
    sha256_hex(canonical.to_string().as_bytes())
}

/// Rebuild `value` with object keys in sorted order at every depth. Array
/// order is meaningful and kept.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Shorthand for suggestion fingerprints.
pub fn suggestion_fingerprint(s: &Suggestion) -> String {
    fingerprint_of(&Fingerprint::suggestion(s))
}

/// Lowercase, trim, and collapse internal whitespace runs to one space.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a repo-relative path or scope: forward slashes, no leading `./`
/// or `/`, no trailing `/`, no empty segments. Project-wide scope is `""`.
pub fn normalize_scope(scope: Option<&str>) -> String {
    let Some(raw) = scope else {
        return String::new();
    };
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}
