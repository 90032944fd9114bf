//! In-memory collaborators for orchestration tests.

use super::{Collaborators, Orchestrator};
use crate::collab::{
    AnalysisCollaborator, AnalysisRequest, EventContext, IssueRequest, PullRequest, RemoteRepo,
    TransformCollaborator, Vcs,
};
use anyhow::{bail, Result};
use doodlify_core::analysis::{AnalysisResult, Suggestion};
use doodlify_core::config::{parse_config, Config};
use doodlify_core::fingerprint::SourceEntry;
use doodlify_core::DoodlifyError;
use doodlify_ledger::{EventRecord, Ledger, MemoryLedgerStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use time::macros::date;
use time::Date;

pub(crate) const CONFIG: &str = r#"{
    "project": {"name": "shop", "description": "A storefront"},
    "defaults": {"branchPrefix": "event/"},
    "events": [
        {"id": "halloween", "name": "Halloween", "description": "Spooky", "startDate": "2026-10-01", "endDate": "2026-10-31", "branch": "halloween"},
        {"id": "xmas", "name": "Christmas", "startDate": "2026-12-01", "endDate": "2026-12-26", "branch": "xmas"}
    ]
}"#;

pub(crate) const TODAY: Date = date!(2026 - 10 - 15);

// ── Vcs ──

type Tree = BTreeMap<String, Vec<u8>>;

/// Committed trees per branch plus the checked-out branch name.
struct Branches {
    trees: HashMap<String, Tree>,
    head: String,
}

/// A working tree with git-like branches. Switching branches replaces the
/// tree with the branch's committed files, and stashing drops uncommitted
/// changes, tracked or not.
pub(crate) struct FakeVcs {
    dir: tempfile::TempDir,
    listing: Vec<SourceEntry>,
    calls: Mutex<Vec<String>>,
    commits: AtomicUsize,
    stashes: AtomicUsize,
    pub fail_clone: AtomicBool,
    fail_branches: Mutex<HashSet<String>>,
    branches: Mutex<Branches>,
}

impl FakeVcs {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tree: Tree = files
            .iter()
            .map(|(rel, content)| (rel.to_string(), content.as_bytes().to_vec()))
            .collect();
        write_tree(dir.path(), &tree);
        // Fixed listing: the base branch does not change between runs.
        let listing = files
            .iter()
            .map(|(rel, content)| SourceEntry {
                path: rel.to_string(),
                digest: doodlify_core::hash::content_hash(content.as_bytes()),
            })
            .collect();
        Self {
            dir,
            listing,
            calls: Mutex::new(Vec::new()),
            commits: AtomicUsize::new(0),
            stashes: AtomicUsize::new(0),
            fail_clone: AtomicBool::new(false),
            fail_branches: Mutex::new(HashSet::new()),
            branches: Mutex::new(Branches {
                trees: HashMap::from([("main".to_string(), tree)]),
                head: "main".into(),
            }),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn stashes(&self) -> usize {
        self.stashes.load(Ordering::SeqCst)
    }

    /// Committed content of `rel` on `branch`.
    pub fn committed(&self, branch: &str, rel: &str) -> Option<String> {
        let branches = self.branches.lock().unwrap();
        let bytes = branches.trees.get(branch)?.get(rel)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn fail_branch(&self, name: &str) {
        self.fail_branches.lock().unwrap().insert(name.to_string());
    }

    /// Leave an uncommitted scratch file in the working tree.
    pub fn dirty(&self) {
        fs::write(self.dir.path().join("scratch.txt"), "wip").unwrap();
    }

    fn call(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn checkout(&self, branches: &mut Branches, name: &str) {
        let tree = branches.trees.get(name).cloned().unwrap_or_default();
        write_tree(self.dir.path(), &tree);
        branches.head = name.to_string();
    }
}

fn read_tree(root: &Path) -> Tree {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap();
            let rel = rel.to_string_lossy().replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Make the files under `root` exactly `tree`.
fn write_tree(root: &Path, tree: &Tree) {
    for rel in read_tree(root).keys() {
        if !tree.contains_key(rel) {
            fs::remove_file(root.join(rel)).unwrap();
        }
    }
    for (rel, bytes) in tree {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }
}

#[async_trait::async_trait]
impl Vcs for FakeVcs {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    async fn clone_or_update(&self, base: &str) -> Result<()> {
        self.call(format!("update {base}"));
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(DoodlifyError::collaborator("git", "repository not found").into());
        }
        let mut branches = self.branches.lock().unwrap();
        if !branches.trees.contains_key(base) {
            let main = branches.trees["main"].clone();
            branches.trees.insert(base.to_string(), main);
        }
        self.checkout(&mut branches, base);
        Ok(())
    }

    async fn stash_if_dirty(&self) -> Result<Option<String>> {
        let mut branches = self.branches.lock().unwrap();
        let head = branches.head.clone();
        if branches.trees.get(&head) == Some(&read_tree(self.dir.path())) {
            return Ok(None);
        }
        let n = self.stashes.fetch_add(1, Ordering::SeqCst) + 1;
        self.checkout(&mut branches, &head);
        Ok(Some(format!("doodlify auto-stash {n}")))
    }

    async fn ensure_branch(&self, name: &str, base: &str) -> Result<()> {
        self.call(format!("branch {name} from {base}"));
        if self.fail_branches.lock().unwrap().contains(name) {
            return Err(DoodlifyError::collaborator("git", format!("cannot create {name}")).into());
        }
        let mut branches = self.branches.lock().unwrap();
        if !branches.trees.contains_key(name) {
            let Some(tree) = branches.trees.get(base).cloned() else {
                bail!("unknown base branch {base}");
            };
            branches.trees.insert(name.to_string(), tree);
        }
        self.checkout(&mut branches, name);
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<Option<String>> {
        self.call(format!("commit {}", message.lines().next().unwrap_or_default()));
        let tree = read_tree(self.dir.path());
        let mut branches = self.branches.lock().unwrap();
        let head = branches.head.clone();
        if branches.trees.get(&head) == Some(&tree) {
            return Ok(None);
        }
        branches.trees.insert(head, tree);
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("commit-{n}")))
    }

    async fn list_sources(&self, _sources: &[String]) -> Result<Vec<SourceEntry>> {
        Ok(self.listing.clone())
    }
}

// ── RemoteRepo ──

#[derive(Default)]
pub(crate) struct FakeRemote {
    pushes: Mutex<Vec<String>>,
    prs: Mutex<Vec<PullRequest>>,
    issues: Mutex<Vec<IssueRequest>>,
    pub fail_push: AtomicBool,
    failing_issues: Mutex<HashSet<String>>,
}

impl FakeRemote {
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn prs(&self) -> Vec<PullRequest> {
        self.prs.lock().unwrap().clone()
    }

    pub fn issues(&self) -> Vec<IssueRequest> {
        self.issues.lock().unwrap().clone()
    }

    pub fn fail_issue(&self, title: &str) {
        self.failing_issues.lock().unwrap().insert(title.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_issues.lock().unwrap().clear();
        self.fail_push.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RemoteRepo for FakeRemote {
    async fn push(&self, branch: &str) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(DoodlifyError::collaborator("git", "remote rejected push").into());
        }
        self.pushes.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn open_pull_request(&self, pr: &PullRequest) -> Result<String> {
        let mut prs = self.prs.lock().unwrap();
        prs.push(pr.clone());
        Ok(format!("https://example.test/pull/{}", prs.len()))
    }

    async fn open_issue(&self, issue: &IssueRequest) -> Result<String> {
        if self.failing_issues.lock().unwrap().contains(&issue.title) {
            bail!("issue API returned 502");
        }
        let mut issues = self.issues.lock().unwrap();
        issues.push(issue.clone());
        Ok(format!("https://example.test/issues/{}", issues.len()))
    }
}

// ── Analysis / transform ──

pub(crate) struct FakeAnalyzer {
    result: AnalysisResult,
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AnalysisCollaborator for FakeAnalyzer {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Prefixes content with `[<event id>]`, so a doubly transformed file shows
/// the prefix twice.
#[derive(Default)]
pub(crate) struct FakeTransformer {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransformer {
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, path: &str) -> Result<()> {
        self.calls.lock().unwrap().push(path.to_string());
        if self.failing.lock().unwrap().contains(path) {
            return Err(DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: "model refused".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransformCollaborator for FakeTransformer {
    async fn transform_image(
        &self,
        bytes: Vec<u8>,
        path: &str,
        ctx: &EventContext,
    ) -> Result<Vec<u8>> {
        self.check(path)?;
        let mut out = format!("[{}]", ctx.id).into_bytes();
        out.extend(bytes);
        Ok(out)
    }

    async fn transform_text(
        &self,
        content: String,
        path: &str,
        ctx: &EventContext,
    ) -> Result<String> {
        self.check(path)?;
        Ok(format!("[{}]{content}", ctx.id))
    }
}

// ── Harness ──

pub(crate) fn analysis(images: &[&str], texts: &[&str]) -> AnalysisResult {
    AnalysisResult {
        image_files: images.iter().map(|s| s.to_string()).collect(),
        text_files: texts.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub(crate) fn analysis_with_suggestions() -> AnalysisResult {
    let mut result = analysis(&["a.png"], &[]);
    result.improvement_suggestions = vec![
        Suggestion {
            key: "favicon_establish".into(),
            title: "Add a favicon".into(),
            body: "No favicon found.".into(),
            labels: vec!["enhancement".into()],
            scope: None,
        },
        Suggestion {
            key: "og_add".into(),
            title: "Add an Open Graph image".into(),
            body: "No og:image meta tag.".into(),
            labels: vec![],
            scope: Some("public".into()),
        },
    ];
    result
}

pub(crate) struct Harness {
    pub config: Config,
    pub store: MemoryLedgerStore,
    pub vcs: FakeVcs,
    pub remote: FakeRemote,
    pub analyzer: FakeAnalyzer,
    pub transformer: FakeTransformer,
}

impl Harness {
    pub fn new(files: &[(&str, &str)], result: AnalysisResult) -> Self {
        Self {
            config: parse_config(CONFIG, false).unwrap(),
            store: MemoryLedgerStore::empty("test-scope"),
            vcs: FakeVcs::new(files),
            remote: FakeRemote::default(),
            analyzer: FakeAnalyzer {
                result,
                calls: AtomicUsize::new(0),
            },
            transformer: FakeTransformer::default(),
        }
    }

    /// The usual project: `a.png` and `b.json`, both candidates.
    pub fn e1() -> Self {
        Self::new(
            &[("a.png", "A"), ("b.json", "{\"hi\":\"hello\"}")],
            analysis(&["a.png"], &["b.json"]),
        )
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config,
            &self.store,
            Collaborators {
                vcs: &self.vcs,
                remote: &self.remote,
                analyzer: &self.analyzer,
                transformer: &self.transformer,
            },
        )
        .with_today(TODAY)
    }

    pub fn ledger(&self) -> Ledger {
        self.store.snapshot()
    }

    pub fn record(&self, id: &str) -> EventRecord {
        self.ledger().event(id).cloned().unwrap()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.vcs.workdir().join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.vcs.workdir().join(rel).exists()
    }
}
