//! Runtime settings from the environment (and `.env` files).

use anyhow::Result;
use doodlify_core::DoodlifyError;
use std::path::{Path, PathBuf};

const DEFAULT_WORKSPACE: &str = ".doodlify-workspace";

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// `owner/repo` of the target repository.
    pub repo: Option<String>,
    /// Passed to git/gh child processes only. Never logged.
    pub token: Option<String>,
    pub target_branch: Option<String>,
    pub workspace: Option<PathBuf>,
    pub image_cmd: Option<String>,
    pub text_cmd: Option<String>,
    pub analyze_cmd: Option<String>,
}

impl Settings {
    /// Load `.env` next to the configuration file, then the current
    /// directory's `.env`, then read the process environment. Variables
    /// already set win over both files.
    pub fn load(config_dir: &Path) -> Self {
        let _ = dotenvy::from_path(config_dir.join(".env"));
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            repo: get("GITHUB_REPO_NAME"),
            token: get("GITHUB_PERSONAL_ACCESS_TOKEN"),
            target_branch: get("GIT_BRANCH_CHANGES_TARGET"),
            workspace: get("DOODLIFY_WORKSPACE").map(PathBuf::from),
            image_cmd: get("DOODLIFY_IMAGE_CMD"),
            text_cmd: get("DOODLIFY_TEXT_CMD"),
            analyze_cmd: get("DOODLIFY_ANALYZE_CMD"),
        }
    }

    pub fn repo(&self) -> Result<&str> {
        let repo = self
            .repo
            .as_deref()
            .ok_or_else(|| DoodlifyError::configuration("GITHUB_REPO_NAME is not set"))?;
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(repo)
            }
            _ => Err(DoodlifyError::configuration(format!(
                "GITHUB_REPO_NAME must look like owner/repo, got \"{repo}\""
            ))
            .into()),
        }
    }

    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            DoodlifyError::configuration("GITHUB_PERSONAL_ACCESS_TOKEN is not set").into()
        })
    }

    /// Local clone of the target repository: `<workspace>/<repo name>`, with
    /// a relative workspace resolved against the configuration directory.
    pub fn checkout_dir(&self, config_dir: &Path) -> Result<PathBuf> {
        let repo = self.repo()?;
        let name = repo.rsplit('/').next().unwrap_or(repo);
        let workspace = self
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));
        let workspace = if workspace.is_relative() {
            config_dir.join(workspace)
        } else {
            workspace
        };
        Ok(workspace.join(name))
    }
}
