//! Commit, pull request and issue text.

use doodlify_core::analysis::Suggestion;
use doodlify_core::config::EventConfig;
use std::collections::BTreeSet;

const COMMIT_FILE_LIMIT: usize = 10;
const PR_FILE_LIMIT: usize = 20;

fn file_list(files: &BTreeSet<String>, limit: usize) -> String {
    let mut out: Vec<String> = files
        .iter()
        .take(limit)
        .map(|f| format!("- {f}"))
        .collect();
    if files.len() > limit {
        out.push(format!("- ... and {} more", files.len() - limit));
    }
    out.join("\n")
}

pub fn commit_message(event: &EventConfig, files: &BTreeSet<String>) -> String {
    format!(
        "Apply {} event theme\n\n{}\n\nModified files:\n{}\n",
        event.name,
        event.description.trim(),
        file_list(files, COMMIT_FILE_LIMIT)
    )
}

pub fn pr_title(event: &EventConfig) -> String {
    format!("🎨 {} event theme", event.name)
}

pub fn pr_body(event: &EventConfig, files: &BTreeSet<String>) -> String {
    let mut body = format!(
        "## {}\n\n**Period:** {} to {}\n\n",
        event.name, event.start_date, event.end_date
    );
    if !event.description.trim().is_empty() {
        body.push_str(event.description.trim());
        body.push_str("\n\n");
    }
    body.push_str(&format!("### Modified files ({})\n\n", files.len()));
    body.push_str(&file_list(files, PR_FILE_LIMIT));
    body.push_str(
        "\n\nEvery modified file keeps its original next to it as `<name>.original.<ext>`; \
         `doodlify restore` puts the original back.\n",
    );
    body
}

pub fn issue_body(suggestion: &Suggestion) -> String {
    let mut body = suggestion.body.trim().to_string();
    if let Some(scope) = suggestion.scope.as_deref().filter(|s| !s.is_empty()) {
        body.push_str(&format!("\n\n**Scope:** `{scope}`"));
    }
    body.push_str(&format!(
        "\n\n_Reported by doodlify (suggestion `{}`)._\n",
        suggestion.key
    ));
    body
}
