//! Capabilities the orchestrator delegates to: analysis, file transformation,
//! local version control and the remote hosting service.
//!
//! Every adapter is stateless and retry-free. Idempotence is the orchestrator's
//! job, not the adapter's.

pub mod command;
pub mod git;
pub mod github;
pub mod scan;

use anyhow::Result;
use doodlify_core::analysis::AnalysisResult;
use doodlify_core::config::EventConfig;
use doodlify_core::fingerprint::SourceEntry;
use std::path::{Path, PathBuf};
use time::Date;

/// What a transform collaborator knows about the event it works for.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_date: Date,
    pub end_date: Date,
}

impl EventContext {
    pub fn from_config(event: &EventConfig) -> Self {
        Self {
            id: event.id.clone(),
            name: event.name.clone(),
            description: event.description.clone(),
            start_date: event.start_date,
            end_date: event.end_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub description: String,
    /// Sub-paths to analyze; empty means the whole working tree.
    pub sources: Vec<String>,
    pub selector: Option<String>,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PullRequest {
    pub branch: String,
    pub target: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[async_trait::async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}

#[async_trait::async_trait]
pub trait TransformCollaborator: Send + Sync {
    async fn transform_image(
        &self,
        bytes: Vec<u8>,
        path: &str,
        ctx: &EventContext,
    ) -> Result<Vec<u8>>;

    async fn transform_text(&self, content: String, path: &str, ctx: &EventContext)
        -> Result<String>;
}

/// Local working tree of the target repository.
#[async_trait::async_trait]
pub trait Vcs: Send + Sync {
    fn workdir(&self) -> &Path;

    /// Clone the repository if absent, otherwise fetch and fast-forward `base`.
    async fn clone_or_update(&self, base: &str) -> Result<()>;

    /// Stash uncommitted changes. Returns the stash message when something
    /// was stashed.
    async fn stash_if_dirty(&self) -> Result<Option<String>>;

    /// Check out `name`, creating it from `base` when it does not exist.
    async fn ensure_branch(&self, name: &str, base: &str) -> Result<()>;

    /// Stage and commit everything. `None` when there was nothing to commit.
    async fn commit_all(&self, message: &str) -> Result<Option<String>>;

    /// Content-addressed listing of the analyzed sources.
    async fn list_sources(&self, sources: &[String]) -> Result<Vec<SourceEntry>> {
        scan::source_listing(self.workdir(), sources)
    }
}

/// Remote hosting service (push, pull requests, issues).
#[async_trait::async_trait]
pub trait RemoteRepo: Send + Sync {
    async fn push(&self, branch: &str) -> Result<()>;
    async fn open_pull_request(&self, pr: &PullRequest) -> Result<String>;
    async fn open_issue(&self, issue: &IssueRequest) -> Result<String>;
}
