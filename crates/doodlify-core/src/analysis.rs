use serde::{Deserialize, Serialize};

/// Output of the analysis collaborator, cached per project fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub files_of_interest: Vec<String>,
    #[serde(default)]
    pub image_files: Vec<String>,
    #[serde(default)]
    pub text_files: Vec<String>,
    #[serde(default)]
    pub selectors_found: Vec<String>,
    #[serde(default)]
    pub notes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub improvement_suggestions: Vec<Suggestion>,
}

/// An improvement the analysis proposes to file as an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Policy key, matched against `defaults.reportSuggestions`.
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Path or area the suggestion is about. `None` means project-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// How a candidate file is routed to the transform collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Text,
}

/// Image extensions the image transform accepts.
pub const TRANSFORMABLE_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

impl AnalysisResult {
    /// Candidate files for processing in a stable order: images first, then
    /// text files, each path once.
    pub fn candidate_files(&self) -> Vec<(String, FileKind)> {
        let mut seen = std::collections::HashSet::new();
        let images = self.image_files.iter().map(|p| (p, FileKind::Image));
        let texts = self.text_files.iter().map(|p| (p, FileKind::Text));
        images
            .chain(texts)
            .filter(|(p, _)| seen.insert(p.as_str()))
            .map(|(p, kind)| (p.clone(), kind))
            .collect()
    }
}

/// Whether `path` has an image extension the image transform supports.
pub fn is_transformable_image(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| TRANSFORMABLE_IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
