//! GitHub remote via `git push` and the `gh` CLI.

use crate::collab::command::mask_secrets;
use crate::collab::git::GitVcs;
use crate::collab::{IssueRequest, PullRequest, RemoteRepo};
use anyhow::{Context, Result};
use doodlify_core::DoodlifyError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct GitHubRemote {
    git: GitVcs,
    repo: String,
    token: Option<String>,
    gh_bin: PathBuf,
}

impl GitHubRemote {
    pub fn new(git: GitVcs, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            git,
            repo: repo.into(),
            token,
            gh_bin: PathBuf::from("gh"),
        }
    }

    /// Check that the `gh` CLI is reachable.
    pub fn verify_available(&self) -> Result<()> {
        let status = std::process::Command::new(&self.gh_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(DoodlifyError::collaborator(
                "gh",
                format!(
                    "GitHub CLI not found (looked for {:?}). Install: https://cli.github.com",
                    self.gh_bin
                ),
            )
            .into()),
        }
    }

    async fn gh(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.gh_bin);
        cmd.args(args)
            .arg("--repo")
            .arg(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }
        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawn gh {}", args.first().unwrap_or(&"")))
            .map_err(|e| DoodlifyError::collaborator("gh", format!("{e:#}")))?;
        if !output.status.success() {
            let stderr = mask_secrets(String::from_utf8_lossy(&output.stderr).trim());
            return Err(DoodlifyError::collaborator(
                "gh",
                format!("gh {} failed: {stderr}", args[..args.len().min(2)].join(" ")),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// URL of a pull request for `branch` in any state, if one exists. A PR
    /// merged or closed after an interrupted push still counts.
    async fn existing_pull_request(&self, branch: &str) -> Result<Option<String>> {
        let out = self
            .gh(&[
                "pr", "list", "--head", branch, "--state", "all", "--json", "url", "--jq",
                ".[0].url",
            ])
            .await?;
        Ok(last_line(&out).filter(|url| !url.is_empty() && url != "null"))
    }
}

fn last_line(out: &str) -> Option<String> {
    out.lines().last().map(|l| l.trim().to_string())
}

/// The URL `gh ... create` prints last. Empty output is an error, not a
/// reference.
fn created_url(out: &str, what: &str) -> Result<String> {
    match last_line(out).filter(|l| !l.is_empty()) {
        Some(url) => Ok(url),
        None => Err(DoodlifyError::collaborator(
            "gh",
            format!("gh created a {what} but printed no URL"),
        )
        .into()),
    }
}

#[async_trait::async_trait]
impl RemoteRepo for GitHubRemote {
    async fn push(&self, branch: &str) -> Result<()> {
        self.git.push_branch(branch).await
    }

    async fn open_pull_request(&self, pr: &PullRequest) -> Result<String> {
        if let Some(url) = self.existing_pull_request(&pr.branch).await? {
            info!(branch = %pr.branch, %url, "pull request already open");
            return Ok(url);
        }
        let out = self
            .gh(&[
                "pr", "create", "--head", &pr.branch, "--base", &pr.target, "--title", &pr.title,
                "--body", &pr.body,
            ])
            .await?;
        let url = created_url(&out, "pull request")?;
        info!(branch = %pr.branch, %url, "pull request opened");
        Ok(url)
    }

    async fn open_issue(&self, issue: &IssueRequest) -> Result<String> {
        let mut args = vec![
            "issue",
            "create",
            "--title",
            issue.title.as_str(),
            "--body",
            issue.body.as_str(),
        ];
        for label in &issue.labels {
            args.push("--label");
            args.push(label.as_str());
        }
        let out = match self.gh(&args).await {
            Ok(out) => out,
            // labels must already exist in the repository
            Err(e) if !issue.labels.is_empty() => {
                warn!(error = %e, "issue creation with labels failed, retrying without labels");
                self.gh(&[
                    "issue",
                    "create",
                    "--title",
                    &issue.title,
                    "--body",
                    &issue.body,
                ])
                .await?
            }
            Err(e) => return Err(e),
        };
        let url = created_url(&out, "issue")?;
        debug!(%url, title = %issue.title, "issue opened");
        Ok(url)
    }
}
