//! Built-in analyzer: a deterministic walk of the working tree.
//!
//! Used when no external analyzer command is configured. Also provides the
//! content-addressed source listing that feeds the project fingerprint.

use crate::collab::{AnalysisCollaborator, AnalysisRequest};
use anyhow::{Context, Result};
use doodlify_core::analysis::{AnalysisResult, Suggestion};
use doodlify_core::fingerprint::{normalize_scope, SourceEntry};
use doodlify_core::hash::content_hash;
use doodlify_store::is_backup_path;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Directories never worth analyzing.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".next",
    "out",
    "coverage",
    ".git",
    ".doodlify",
];

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico"];
const I18N_DIRS: &[&str] = &["i18n", "locales", "locale", "lang", "translations"];
const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "jsx", "tsx", "vue", "svelte", "astro"];
const STYLE_EXTENSIONS: &[&str] = &["css", "scss", "sass", "less"];
const MAX_SCAN_BYTES: u64 = 1024 * 1024;
const MAX_SELECTORS: usize = 200;

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

/// Repo-relative file paths under `sources` (or the whole tree), sorted,
/// forward-slashed, without excluded directories or backup siblings.
pub fn walk_sources(root: &Path, sources: &[String]) -> Vec<String> {
    let roots: Vec<String> = if sources.is_empty() {
        vec![String::new()]
    } else {
        sources.iter().map(|s| normalize_scope(Some(s.as_str()))).collect()
    };

    let mut files = BTreeSet::new();
    for source in roots {
        let start = if source.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&source)
        };
        let walker = WalkDir::new(&start)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir() && is_excluded(&e.file_name().to_string_lossy()))
            });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || is_backup_path(entry.path()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.insert(normalize_scope(Some(rel.to_string_lossy().as_ref())));
            }
        }
    }
    files.into_iter().collect()
}

/// Path + content digest for every analyzed file.
pub fn source_listing(root: &Path, sources: &[String]) -> Result<Vec<SourceEntry>> {
    walk_sources(root, sources)
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(root.join(&path))
                .with_context(|| format!("reading {path}"))?;
            Ok(SourceEntry {
                digest: content_hash(&bytes),
                path,
            })
        })
        .collect()
}

fn read_small(root: &Path, rel: &str) -> Option<String> {
    let path = root.join(rel);
    let meta = std::fs::metadata(&path).ok()?;
    if meta.len() > MAX_SCAN_BYTES {
        return None;
    }
    std::fs::read_to_string(path).ok()
}

/// Tokens of a CSS selector list that can be searched for in source text:
/// `.hero, #banner > a` → `hero`, `banner`, `a`.
fn selector_tokens(selector: &str) -> Vec<String> {
    selector
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '>' | '+' | '~'))
        .map(|t| t.trim_start_matches(['.', '#']).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn suggestion(key: &str, title: &str, body: &str, labels: &[&str]) -> Suggestion {
    Suggestion {
        key: key.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        scope: None,
    }
}

/// Analyze the working tree described by `request`.
pub fn scan(request: &AnalysisRequest) -> Result<AnalysisResult> {
    let root = &request.workdir;
    let files = walk_sources(root, &request.sources);
    let class_attr = Regex::new(r#"class(?:Name)?\s*=\s*["']([^"']+)["']"#)?;
    let custom_property = Regex::new(r"--[A-Za-z0-9_-]+\s*:")?;
    let tokens = request
        .selector
        .as_deref()
        .map(selector_tokens)
        .unwrap_or_default();

    let mut result = AnalysisResult::default();
    let mut selectors = BTreeSet::new();
    let mut has_favicon = false;
    let mut has_og_image = false;
    let mut stylesheets = 0usize;
    let mut has_custom_properties = false;

    for path in &files {
        let ext = extension(path);
        let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            if name.starts_with("favicon") || name.starts_with("apple-touch-icon") {
                has_favicon = true;
            }
            result.image_files.push(path.clone());
            continue;
        }
        if ext == "json" && path.split('/').any(|seg| I18N_DIRS.contains(&seg)) {
            result.text_files.push(path.clone());
            continue;
        }

        let is_markup = MARKUP_EXTENSIONS.contains(&ext.as_str());
        let is_style = STYLE_EXTENSIONS.contains(&ext.as_str());
        if !is_markup && !is_style {
            continue;
        }
        let Some(content) = read_small(root, path) else {
            continue;
        };
        if is_style {
            stylesheets += 1;
            has_custom_properties |= custom_property.is_match(&content);
        }
        if is_markup {
            has_favicon |= content.contains("rel=\"icon\"") || content.contains("rel='icon'");
            has_og_image |= content.contains("og:image");
            for caps in class_attr.captures_iter(&content) {
                for class in caps[1].split_whitespace() {
                    if selectors.len() < MAX_SELECTORS {
                        selectors.insert(format!(".{class}"));
                    }
                }
            }
        }
        let interesting = if tokens.is_empty() {
            is_style
        } else {
            tokens.iter().any(|t| content.contains(t.as_str()))
        };
        if interesting {
            result.files_of_interest.push(path.clone());
        }
    }
    result.selectors_found = selectors.into_iter().collect();

    let notes = &mut result.notes;
    notes.insert("scanned_files".into(), files.len().into());
    notes.insert("stylesheets".into(), stylesheets.into());
    notes.insert("has_favicon".into(), has_favicon.into());
    notes.insert("has_og_image".into(), has_og_image.into());

    let suggestions = &mut result.improvement_suggestions;
    if !has_favicon {
        suggestions.push(suggestion(
            "favicon_establish",
            "Establish a favicon",
            "No favicon was found. Adding one gives event themes a small, visible place to land.",
            &["doodlify", "enhancement"],
        ));
    }
    if !has_og_image {
        suggestions.push(suggestion(
            "og_add",
            "Add an Open Graph image",
            "No `og:image` meta tag was found. An Open Graph image lets shared links carry event artwork.",
            &["doodlify", "enhancement"],
        ));
    }
    if result.text_files.is_empty() {
        suggestions.push(suggestion(
            "i18n",
            "Move user-facing copy into locale files",
            "No locale JSON files were found. Text changes for events are safer when copy lives in i18n files.",
            &["doodlify", "i18n"],
        ));
    }
    if stylesheets > 0 && !has_custom_properties {
        suggestions.push(suggestion(
            "css_variables",
            "Introduce CSS custom properties for theme colors",
            "Stylesheets declare no custom properties. Event palettes can then be swapped by overriding variables.",
            &["doodlify", "enhancement"],
        ));
    }
    if request.selector.is_none() {
        suggestions.push(suggestion(
            "selectors_guidance",
            "Configure a selector for themable areas",
            "No `defaults.selector` is configured, so every stylesheet is treated as a file of interest.",
            &["doodlify", "documentation"],
        ));
    }
    Ok(result)
}

/// Built-in analyzer backed by [`scan`].
pub struct ScanAnalyzer;

#[async_trait::async_trait]
impl AnalysisCollaborator for ScanAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        scan(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let p = dir.path().join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        dir
    }

    fn request(dir: &Path, sources: &[&str], selector: Option<&str>) -> AnalysisRequest {
        AnalysisRequest {
            description: "shop".into(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            selector: selector.map(String::from),
            workdir: dir.to_path_buf(),
        }
    }

    #[test]
    fn walk_skips_excluded_dirs_and_backups() {
        let dir = tree(&[
            ("public/hero.png", "x"),
            ("public/hero.original.png", "x"),
            ("node_modules/pkg/logo.png", "x"),
            ("src/App.tsx", "x"),
        ]);
        let files = walk_sources(dir.path(), &[]);
        assert_eq!(files, vec!["public/hero.png".to_string(), "src/App.tsx".to_string()]);
    }

    #[test]
    fn walk_limits_to_sources() {
        let dir = tree(&[("web/a.png", "x"), ("api/b.png", "x")]);
        let files = walk_sources(dir.path(), &["./web/".to_string()]);
        assert_eq!(files, vec!["web/a.png".to_string()]);
    }

    #[test]
    fn listing_tracks_content() {
        let dir = tree(&[("a.png", "one")]);
        let before = source_listing(dir.path(), &[]).unwrap();
        fs::write(dir.path().join("a.png"), "two").unwrap();
        let after = source_listing(dir.path(), &[]).unwrap();
        assert_eq!(before[0].path, "a.png");
        assert_ne!(before[0].digest, after[0].digest);
    }

    #[test]
    fn classifies_images_and_locale_files() {
        let dir = tree(&[
            ("public/hero.png", "x"),
            ("public/logo.svg", "<svg/>"),
            ("src/locales/en.json", "{}"),
            ("package.json", "{}"),
        ]);
        let result = scan(&request(dir.path(), &[], None)).unwrap();
        assert_eq!(result.image_files, vec!["public/hero.png", "public/logo.svg"]);
        assert_eq!(result.text_files, vec!["src/locales/en.json"]);
    }

    #[test]
    fn derives_suggestions_from_gaps() {
        let dir = tree(&[
            ("index.html", "<div class=\"hero banner\"></div>"),
            ("style.css", ".hero { color: red; }"),
        ]);
        let result = scan(&request(dir.path(), &[], None)).unwrap();
        let keys: Vec<&str> = result
            .improvement_suggestions
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec!["favicon_establish", "og_add", "i18n", "css_variables", "selectors_guidance"]
        );
        assert_eq!(result.selectors_found, vec![".banner", ".hero"]);
    }

    #[test]
    fn complete_project_yields_no_suggestions() {
        let dir = tree(&[
            ("public/favicon.ico", "x"),
            ("index.html", "<meta property=\"og:image\" content=\"/og.png\"><div class=\"hero\"></div>"),
            ("style.css", ":root { --brand: red; } .hero { color: var(--brand); }"),
            ("locales/en.json", "{}"),
        ]);
        let result = scan(&request(dir.path(), &[], Some(".hero"))).unwrap();
        assert!(result.improvement_suggestions.is_empty());
        assert_eq!(result.files_of_interest, vec!["index.html", "style.css"]);
    }

    #[test]
    fn selector_tokens_split_compound_selectors() {
        assert_eq!(selector_tokens(".hero, #banner > a"), vec!["hero", "banner", "a"]);
    }
}
