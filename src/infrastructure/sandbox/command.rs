//! External command sandbox
//!
//! Writes the artifact into a throwaway workspace and shells out to a configured
//! renderer (typically a headless-browser script). The renderer is expected to
//! exit non-zero on page errors and to write a JPEG to `{screenshot}`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use crate::domain::error::SandboxError;
use crate::domain::models::{SandboxConfig, Snapshot};
use crate::domain::ports::{SandboxExecutor, SandboxRequest, SandboxResponse, SandboxStatus};

const SCREENSHOT_FILE: &str = "snapshot.jpg";

/// Sandbox that runs a command template per execution
#[derive(Debug, Clone)]
pub struct CommandSandbox {
    /// Program followed by its arguments; may contain placeholders
    command: Vec<String>,
    file_extension: String,
}

impl CommandSandbox {
    /// Create a sandbox for `command`
    ///
    /// Recognized placeholders: `{input}`, `{screenshot}`, `{width}`, `{height}`,
    /// `{quality}`, `{timeout_ms}`.
    pub fn new(
        command: Vec<String>,
        file_extension: impl Into<String>,
    ) -> Result<Self, SandboxError> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(SandboxError::NotConfigured(
                "sandbox.command must name a program".to_string(),
            ));
        }
        Ok(Self {
            command,
            file_extension: file_extension.into(),
        })
    }

    pub fn from_config(config: &SandboxConfig, file_extension: &str) -> Result<Self, SandboxError> {
        Self::new(config.command.clone(), file_extension)
    }

    fn render_args(&self, request: &SandboxRequest, input: &Path, screenshot: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let screenshot = screenshot.display().to_string();
        let width = request.viewport.width.to_string();
        let height = request.viewport.height.to_string();
        let quality = request.screenshot_quality.to_string();
        let timeout_ms = request.timeout_ms.to_string();

        self.command
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{screenshot}", &screenshot)
                    .replace("{width}", &width)
                    .replace("{height}", &height)
                    .replace("{quality}", &quality)
                    .replace("{timeout_ms}", &timeout_ms)
            })
            .collect()
    }
}

#[async_trait]
impl SandboxExecutor for CommandSandbox {
    #[instrument(skip_all, fields(program = %self.command[0], timeout_ms = request.timeout_ms))]
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResponse, SandboxError> {
        let workspace = tempfile::tempdir()?;
        let input = workspace
            .path()
            .join(format!("artifact.{}", self.file_extension));
        let screenshot = workspace.path().join(SCREENSHOT_FILE);
        tokio::fs::write(&input, &request.code).await?;

        let args = self.render_args(&request, &input, &screenshot);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| SandboxError::NotConfigured("empty command".to_string()))?;

        let child = Command::new(program)
            .args(rest)
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Launch(format!("failed to spawn {program}: {e}")))?;

        // Dropping the wait future on deadline drops the child, which kills it
        let deadline = Duration::from_millis(request.timeout_ms);
        let Ok(output) = timeout(deadline, child.wait_with_output()).await else {
            warn!(?deadline, "Sandbox execution timed out");
            return Ok(SandboxResponse::timeout(vec![format!(
                "[TIMEOUT] execution exceeded {} ms",
                request.timeout_ms
            )]));
        };
        let output = output?;

        let mut log_lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        log_lines.extend(
            String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(|line| format!("[STDERR] {line}")),
        );

        let status = if output.status.success() {
            SandboxStatus::Success
        } else {
            log_lines.push(format!("[EXIT] {}", output.status));
            SandboxStatus::RuntimeError
        };

        let snapshot = match tokio::fs::read(&screenshot).await {
            Ok(bytes) if !bytes.is_empty() => Some(Snapshot::jpeg(STANDARD.encode(bytes))),
            _ => None,
        };

        debug!(
            ?status,
            log_lines = log_lines.len(),
            has_snapshot = snapshot.is_some(),
            "Sandbox execution finished"
        );

        Ok(SandboxResponse {
            status,
            snapshot,
            log_lines,
        })
    }
}
