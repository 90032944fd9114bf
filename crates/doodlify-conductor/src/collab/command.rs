//! Collaborators backed by user-supplied shell commands.
//!
//! The command receives the input on stdin and writes the result to stdout.
//! Event metadata travels in `DOODLIFY_*` environment variables.

use crate::collab::{
    AnalysisCollaborator, AnalysisRequest, EventContext, TransformCollaborator,
};
use anyhow::{Context, Result};
use doodlify_core::analysis::AnalysisResult;
use doodlify_core::DoodlifyError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Shell program and args for the current platform.
#[cfg(windows)]
pub(crate) fn shell_cmd(cmd: &str) -> (String, Vec<String>) {
    ("cmd.exe".into(), vec!["/C".into(), cmd.into()])
}

#[cfg(not(windows))]
pub(crate) fn shell_cmd(cmd: &str) -> (String, Vec<String>) {
    ("sh".into(), vec!["-c".into(), cmd.into()])
}

/// Mask secrets in output strings before logging or storing them.
pub fn mask_secrets(text: &str) -> String {
    let patterns = [
        // GitHub tokens
        (r"gh[pousr]_[A-Za-z0-9]{20,}", "[MASKED]"),
        (r"github_pat_[A-Za-z0-9_]{20,}", "[MASKED]"),
        // API keys
        (r"sk-[a-zA-Z0-9]{20,}", "[MASKED]"),
        // Bearer tokens
        (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
        // credentials embedded in URLs
        (r"://[^/\s:@]+:[^/\s@]+@", "://[MASKED]@"),
        // key=value patterns
        (
            r"(?i)(password|secret|token|key|api_key|apikey)=[^\s&]+",
            "$1=[MASKED]",
        ),
    ];

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, replacement).into_owned();
        }
    }
    result
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Run `cmd` through the platform shell, feeding `input` on stdin.
/// Returns stdout on success; failures carry masked, truncated stderr.
pub async fn run_shell(
    cmd: &str,
    input: Vec<u8>,
    env: &[(&str, String)],
    cwd: &Path,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let (shell, args) = shell_cmd(cmd);
    let mut command = Command::new(&shell);
    command
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning `{cmd}`"))?;
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
        });
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("waiting for `{cmd}`"))?,
        Err(_) => anyhow::bail!("command timed out after {}s: {cmd}", timeout.as_secs()),
    };
    if !output.status.success() {
        let stderr = mask_secrets(&String::from_utf8_lossy(&output.stderr));
        anyhow::bail!(
            "exit {}: {}",
            output.status.code().unwrap_or(-1),
            truncate(stderr.trim(), 2000)
        );
    }
    debug!(cmd, bytes = output.stdout.len(), "command finished");
    Ok(output.stdout)
}

fn event_env(ctx: &EventContext, path: &str) -> Vec<(&'static str, String)> {
    vec![
        ("DOODLIFY_EVENT_ID", ctx.id.clone()),
        ("DOODLIFY_EVENT_NAME", ctx.name.clone()),
        ("DOODLIFY_EVENT_DESCRIPTION", ctx.description.clone()),
        ("DOODLIFY_EVENT_START", ctx.start_date.to_string()),
        ("DOODLIFY_EVENT_END", ctx.end_date.to_string()),
        ("DOODLIFY_FILE_PATH", path.to_string()),
    ]
}

// ── Transform ──

/// Transforms files by piping them through `DOODLIFY_IMAGE_CMD` /
/// `DOODLIFY_TEXT_CMD`. A missing command fails the file, not the run.
pub struct CommandTransformer {
    pub image_cmd: Option<String>,
    pub text_cmd: Option<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl CommandTransformer {
    pub fn new(image_cmd: Option<String>, text_cmd: Option<String>, cwd: PathBuf) -> Self {
        Self {
            image_cmd,
            text_cmd,
            cwd,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn run(
        &self,
        cmd: Option<&str>,
        var: &str,
        input: Vec<u8>,
        path: &str,
        ctx: &EventContext,
    ) -> Result<Vec<u8>> {
        let Some(cmd) = cmd else {
            return Err(DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: format!("no transform command configured ({var})"),
            }
            .into());
        };
        let out = run_shell(cmd, input, &event_env(ctx, path), &self.cwd, self.timeout)
            .await
            .map_err(|e| DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: format!("{e:#}"),
            })?;
        if out.is_empty() {
            return Err(DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: "transform produced no output".into(),
            }
            .into());
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl TransformCollaborator for CommandTransformer {
    async fn transform_image(
        &self,
        bytes: Vec<u8>,
        path: &str,
        ctx: &EventContext,
    ) -> Result<Vec<u8>> {
        self.run(self.image_cmd.as_deref(), "DOODLIFY_IMAGE_CMD", bytes, path, ctx)
            .await
    }

    async fn transform_text(
        &self,
        content: String,
        path: &str,
        ctx: &EventContext,
    ) -> Result<String> {
        let out = self
            .run(
                self.text_cmd.as_deref(),
                "DOODLIFY_TEXT_CMD",
                content.into_bytes(),
                path,
                ctx,
            )
            .await?;
        String::from_utf8(out).map_err(|_| {
            DoodlifyError::TransformFailure {
                path: path.to_string(),
                message: "transform output is not valid UTF-8".into(),
            }
            .into()
        })
    }
}

// ── Analysis ──

/// External analyzer: receives the request as JSON on stdin and prints an
/// `AnalysisResult` as JSON.
pub struct CommandAnalyzer {
    pub cmd: String,
    pub timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait::async_trait]
impl AnalysisCollaborator for CommandAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let input = serde_json::to_vec(&serde_json::json!({
            "description": request.description,
            "sources": request.sources,
            "selector": request.selector,
        }))?;
        let out = run_shell(&self.cmd, input, &[], &request.workdir, self.timeout)
            .await
            .map_err(|e| DoodlifyError::collaborator("analyzer", format!("{e:#}")))?;
        let result: AnalysisResult = serde_json::from_slice(&out).map_err(|e| {
            DoodlifyError::collaborator("analyzer", format!("invalid analyzer output: {e}"))
        })?;
        Ok(result)
    }
}
