//! Git adapter for the target repository working tree.
//!
//! A thin wrapper around `git` subprocess calls. Authentication goes through
//! the `gh` credential helper with the token in `GH_TOKEN`, so the token never
//! appears in remote URLs, `.git/config` or logs.

use crate::collab::command::mask_secrets;
use crate::collab::Vcs;
use anyhow::{Context, Result};
use doodlify_core::DoodlifyError;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const FALLBACK_NAME: &str = "doodlify";
const FALLBACK_EMAIL: &str = "doodlify@users.noreply.github.com";

#[derive(Debug, Clone)]
pub struct GitVcs {
    workdir: PathBuf,
    remote_url: String,
    token: Option<String>,
}

impl GitVcs {
    pub fn new(workdir: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            remote_url: remote_url.into(),
            token: None,
        }
    }

    /// GitHub repository `owner/repo` over HTTPS.
    pub fn github(workdir: impl Into<PathBuf>, repo: &str) -> Self {
        Self::new(workdir, format!("https://github.com/{repo}.git"))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token)
                .args(["-c", "credential.helper="])
                .args(["-c", "credential.helper=!gh auth git-credential"]);
        }
        cmd
    }

    async fn run_in(&self, cwd: &Path, args: &[&str]) -> Result<Output> {
        self.command(cwd)
            .args(args)
            .output()
            .await
            .with_context(|| format!("spawn git {}", args.join(" ")))
            .map_err(|e| DoodlifyError::collaborator("git", format!("{e:#}")).into())
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        self.run_checked_in(&self.workdir, args).await
    }

    async fn run_checked_in(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let output = self.run_in(cwd, args).await?;
        if !output.status.success() {
            let stderr = mask_secrets(String::from_utf8_lossy(&output.stderr).trim());
            return Err(DoodlifyError::collaborator(
                "git",
                format!("git {} failed: {stderr}", args.join(" ")),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn succeeds(&self, args: &[&str]) -> Result<bool> {
        Ok(self.run_in(&self.workdir, args).await?.status.success())
    }

    async fn branch_exists(&self, reference: &str) -> Result<bool> {
        self.succeeds(&["show-ref", "--verify", "--quiet", reference])
            .await
    }

    /// Check out `branch`, tracking `origin/<branch>` when only the remote has it.
    async fn checkout(&self, branch: &str) -> Result<()> {
        if self.branch_exists(&format!("refs/heads/{branch}")).await? {
            self.run_checked(&["checkout", branch]).await?;
        } else {
            let remote = format!("origin/{branch}");
            self.run_checked(&["checkout", "-b", branch, "--track", &remote])
                .await?;
        }
        Ok(())
    }

    /// Push `branch` to `origin`, setting upstream.
    #[instrument(skip(self))]
    pub async fn push_branch(&self, branch: &str) -> Result<()> {
        self.run_checked(&["push", "--set-upstream", "origin", branch])
            .await?;
        info!(branch, "pushed");
        Ok(())
    }

    async fn ensure_identity(&self) -> Result<Vec<String>> {
        let configured = self.succeeds(&["config", "user.email"]).await?;
        if configured {
            return Ok(vec![]);
        }
        debug!("no git identity configured, using fallback");
        Ok(vec![
            "-c".into(),
            format!("user.name={FALLBACK_NAME}"),
            "-c".into(),
            format!("user.email={FALLBACK_EMAIL}"),
        ])
    }
}

#[async_trait::async_trait]
impl Vcs for GitVcs {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    #[instrument(skip(self), fields(workdir = %self.workdir.display()))]
    async fn clone_or_update(&self, base: &str) -> Result<()> {
        if !self.workdir.join(".git").exists() {
            let parent = self
                .workdir
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
            let target = self.workdir.to_string_lossy().to_string();
            info!(url = %mask_secrets(&self.remote_url), "cloning target repository");
            self.run_checked_in(parent, &["clone", &self.remote_url, &target])
                .await?;
        } else {
            self.run_checked(&["fetch", "origin", "--prune"]).await?;
        }
        self.checkout(base).await?;
        self.run_checked(&["pull", "--ff-only", "origin", base])
            .await?;
        debug!(base, "working tree up to date");
        Ok(())
    }

    async fn stash_if_dirty(&self) -> Result<Option<String>> {
        let status = self.run_checked(&["status", "--porcelain"]).await?;
        if status.is_empty() {
            return Ok(None);
        }
        let message = format!("doodlify auto-stash {}", doodlify_core::now_rfc3339());
        let identity = self.ensure_identity().await?;
        let mut args: Vec<&str> = identity.iter().map(String::as_str).collect();
        args.extend(["stash", "push", "--include-untracked", "-m", &message]);
        self.run_checked(&args).await?;
        warn!(stash = %message, "uncommitted changes stashed; recover with `git stash list`");
        Ok(Some(message))
    }

    #[instrument(skip(self))]
    async fn ensure_branch(&self, name: &str, base: &str) -> Result<()> {
        if self.branch_exists(&format!("refs/heads/{name}")).await? {
            self.run_checked(&["checkout", name]).await?;
        } else if self
            .branch_exists(&format!("refs/remotes/origin/{name}"))
            .await?
        {
            let remote = format!("origin/{name}");
            self.run_checked(&["checkout", "-b", name, "--track", &remote])
                .await?;
        } else {
            self.run_checked(&["checkout", "-b", name, base]).await?;
        }
        debug!(branch = name, "on event branch");
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        self.run_checked(&["add", "-A"]).await?;
        let staged = self.run_checked(&["diff", "--cached", "--name-only"]).await?;
        if staged.is_empty() {
            debug!("nothing staged, skipping commit");
            return Ok(None);
        }
        let identity = self.ensure_identity().await?;
        let mut args: Vec<&str> = identity.iter().map(String::as_str).collect();
        args.extend(["commit", "-m", message]);
        self.run_checked(&args).await?;
        let sha = self.run_checked(&["rev-parse", "HEAD"]).await?;
        info!(commit = %sha, "committed");
        Ok(Some(sha))
    }
}
