//! Configuration file schema and validation.
//!
//! The file is JSON by default; `.yaml`/`.yml` files are parsed as YAML. Field
//! names are camelCase to stay compatible with existing configuration files.

use crate::error::DoodlifyError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use time::Date;

time::serde::format_description!(ymd, Date, "[year]-[month]-[day]");

/// Base branch used when neither the environment nor the config names one.
pub const DEFAULT_TARGET_BRANCH: &str = "main";

/// Suggestion keys that are filed only when explicitly enabled.
const OPT_IN_SUGGESTIONS: &[&str] = &["i18n"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub name: String,
    /// Free-form description handed to the analysis collaborator.
    #[serde(default)]
    pub description: String,
    /// Sub-paths that limit analysis. Empty means the whole repository.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultsConfig {
    /// CSS selector narrowing the files of interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_prefix: Option<String>,
    /// Per-suggestion-key filing policy. Keys not listed fall back to the
    /// built-in default (on, except opt-in keys such as `i18n`).
    #[serde(default)]
    pub report_suggestions: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "ymd")]
    pub start_date: Date,
    #[serde(with = "ymd")]
    pub end_date: Date,
    pub branch: String,
}

impl DefaultsConfig {
    /// Whether suggestions with `key` should be filed as issues.
    pub fn should_report(&self, key: &str) -> bool {
        self.report_suggestions
            .get(key)
            .copied()
            .unwrap_or_else(|| !OPT_IN_SUGGESTIONS.contains(&key))
    }
}

impl EventConfig {
    /// Inclusive date-window containment.
    pub fn is_active(&self, today: Date) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    /// Full branch name: `branchPrefix + branch`.
    pub fn branch_name(&self, defaults: &DefaultsConfig) -> String {
        format!(
            "{}{}",
            defaults.branch_prefix.as_deref().unwrap_or_default(),
            self.branch
        )
    }
}

impl Config {
    pub fn event(&self, id: &str) -> Option<&EventConfig> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Resolve the base branch: explicit override, then `project.targetBranch`,
    /// then [`DEFAULT_TARGET_BRANCH`].
    pub fn target_branch(&self, override_branch: Option<&str>) -> String {
        override_branch
            .filter(|b| !b.trim().is_empty())
            .or(self.project.target_branch.as_deref())
            .unwrap_or(DEFAULT_TARGET_BRANCH)
            .to_string()
    }

    /// Check structural invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), DoodlifyError> {
        if self.project.name.trim().is_empty() {
            return Err(DoodlifyError::configuration("project.name must not be empty"));
        }
        let mut seen = HashSet::new();
        for event in &self.events {
            if event.id.trim().is_empty() {
                return Err(DoodlifyError::configuration("event id must not be empty"));
            }
            if !seen.insert(event.id.as_str()) {
                return Err(DoodlifyError::configuration(format!(
                    "duplicate event id \"{}\"",
                    event.id
                )));
            }
            if event.branch.trim().is_empty() {
                return Err(DoodlifyError::configuration(format!(
                    "event \"{}\" has an empty branch",
                    event.id
                )));
            }
            if event.start_date > event.end_date {
                return Err(DoodlifyError::configuration(format!(
                    "event \"{}\" starts after it ends ({} > {})",
                    event.id, event.start_date, event.end_date
                )));
            }
        }
        Ok(())
    }
}

/// Parse configuration text. `yaml` selects the YAML parser.
pub fn parse_config(content: &str, yaml: bool) -> Result<Config> {
    let config: Config = if yaml {
        serde_yaml::from_str(content)
            .map_err(|e| DoodlifyError::configuration(format!("invalid YAML: {e}")))?
    } else {
        serde_json::from_str(content)
            .map_err(|e| DoodlifyError::configuration(format!("invalid JSON: {e}")))?
    };
    config.validate()?;
    Ok(config)
}

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DoodlifyError::configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    parse_config(&content, yaml).map_err(|e| e.context(format!("loading {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    const SAMPLE: &str = r#"{
        "project": {
            "name": "shop",
            "description": "A storefront",
            "sources": ["web"],
            "targetBranch": "develop"
        },
        "defaults": {
            "branchPrefix": "feature/event/",
            "reportSuggestions": { "og_add": false }
        },
        "events": [
            {
                "id": "halloween",
                "name": "Halloween",
                "description": "Spooky",
                "startDate": "2026-10-01",
                "endDate": "2026-10-31",
                "branch": "halloween-2026"
            }
        ]
    }"#;

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    #[test]
    fn parses_camel_case_fields() {
        let config = parse_config(SAMPLE, false).unwrap();
        assert_eq!(config.project.target_branch.as_deref(), Some("develop"));
        let event = config.event("halloween").unwrap();
        assert_eq!(event.start_date, date(2026, Month::October, 1));
        assert_eq!(event.branch_name(&config.defaults), "feature/event/halloween-2026");
    }

    #[test]
    fn date_window_is_inclusive() {
        let config = parse_config(SAMPLE, false).unwrap();
        let event = config.event("halloween").unwrap();
        assert!(event.is_active(date(2026, Month::October, 1)));
        assert!(event.is_active(date(2026, Month::October, 31)));
        assert!(!event.is_active(date(2026, Month::November, 1)));
        assert!(!event.is_active(date(2026, Month::September, 30)));
    }

    #[test]
    fn report_policy_defaults() {
        let config = parse_config(SAMPLE, false).unwrap();
        assert!(!config.defaults.should_report("og_add"));
        assert!(config.defaults.should_report("favicon_establish"));
        assert!(!config.defaults.should_report("i18n"));
        assert!(config.defaults.should_report("some_new_key"));
    }

    #[test]
    fn target_branch_resolution() {
        let config = parse_config(SAMPLE, false).unwrap();
        assert_eq!(config.target_branch(None), "develop");
        assert_eq!(config.target_branch(Some("release")), "release");
        assert_eq!(config.target_branch(Some("  ")), "develop");
    }

    #[test]
    fn rejects_duplicate_event_ids() {
        let content = r#"{
            "project": {"name": "x"},
            "events": [
                {"id": "a", "name": "A", "startDate": "2026-01-01", "endDate": "2026-01-02", "branch": "a"},
                {"id": "a", "name": "A2", "startDate": "2026-01-01", "endDate": "2026-01-02", "branch": "b"}
            ]
        }"#;
        let err = parse_config(content, false).unwrap_err();
        assert!(err.to_string().contains("duplicate event id"));
        assert!(err.downcast_ref::<DoodlifyError>().is_some());
    }

    #[test]
    fn rejects_inverted_window() {
        let content = r#"{
            "project": {"name": "x"},
            "events": [
                {"id": "a", "name": "A", "startDate": "2026-02-01", "endDate": "2026-01-01", "branch": "a"}
            ]
        }"#;
        assert!(parse_config(content, false).is_err());
    }

    #[test]
    fn rejects_bad_dates() {
        let content = r#"{
            "project": {"name": "x"},
            "events": [
                {"id": "a", "name": "A", "startDate": "01/02/2026", "endDate": "2026-01-01", "branch": "a"}
            ]
        }"#;
        assert!(parse_config(content, false).is_err());
    }

    #[test]
    fn loads_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doodlify.yaml");
        std::fs::write(
            &path,
            "project:\n  name: shop\nevents:\n  - id: xmas\n    name: Christmas\n    startDate: \"2026-12-01\"\n    endDate: \"2026-12-26\"\n    branch: xmas\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.events.len(), 1);
        assert_eq!(config.target_branch(None), DEFAULT_TARGET_BRANCH);
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = load_config(Path::new("/nonexistent/doodlify.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DoodlifyError>(),
            Some(DoodlifyError::Configuration { .. })
        ));
    }
}
