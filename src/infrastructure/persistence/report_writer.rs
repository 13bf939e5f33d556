use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::error::RunError;
use crate::domain::models::{Attempt, Decision, Report};
use crate::domain::ports::ReportSink;

/// Report document written for a failed run
#[derive(Debug, Serialize)]
struct FailureReport<'a> {
    run_id: Uuid,
    task: &'a str,
    finished_at: DateTime<Utc>,
    error_kind: &'static str,
    error: String,
    attempts: &'a [Attempt],
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a Decision>,
}

/// Writes run bundles to the local filesystem
///
/// Layout under `root`:
///
/// ```text
/// <timestamp>_<run-id>/
///   report.json
///   final.<ext>
///   branch_<i>_<model-slug>/
///     raw_output.txt  code.<ext>  snapshot.jpg
///     execution.log   verification.json  attempt.json
/// ```
#[derive(Debug, Clone)]
pub struct FsReportWriter {
    root: PathBuf,
    file_extension: String,
}

impl FsReportWriter {
    pub fn new(root: impl Into<PathBuf>, file_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_extension: file_extension.into(),
        }
    }

    fn run_dir(&self, started_at: DateTime<Utc>, run_id: Uuid) -> PathBuf {
        let short_id = run_id.simple().to_string();
        self.root.join(format!(
            "{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            &short_id[..8]
        ))
    }

    async fn write_attempt(&self, run_dir: &Path, attempt: &Attempt) -> Result<()> {
        let dir = run_dir.join(format!(
            "branch_{}_{}",
            attempt.branch_index,
            model_slug(&attempt.model_id)
        ));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        if let Some(raw) = &attempt.raw_output {
            tokio::fs::write(dir.join("raw_output.txt"), raw).await?;
        }
        if let Some(code) = &attempt.code {
            tokio::fs::write(dir.join(format!("code.{}", self.file_extension)), code).await?;
        }
        if let Some(snapshot) = &attempt.snapshot {
            match STANDARD.decode(&snapshot.data_base64) {
                Ok(bytes) => tokio::fs::write(dir.join("snapshot.jpg"), bytes).await?,
                Err(e) => warn!(
                    branch_index = attempt.branch_index,
                    error = %e,
                    "Snapshot is not valid base64, skipping"
                ),
            }
        }
        if let Some(log) = &attempt.execution_log {
            tokio::fs::write(dir.join("execution.log"), log.join("\n")).await?;
        }
        if let Some(verification) = &attempt.verification {
            write_json(&dir.join("verification.json"), verification).await?;
        }
        write_json(&dir.join("attempt.json"), attempt).await
    }

    async fn write_attempts(&self, run_dir: &Path, attempts: &[Attempt]) -> Result<()> {
        for attempt in attempts {
            self.write_attempt(run_dir, attempt)
                .await
                .with_context(|| format!("Failed to persist branch {}", attempt.branch_index))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for FsReportWriter {
    async fn persist(&self, report: &Report) -> Result<PathBuf> {
        let run_dir = self.run_dir(report.started_at, report.run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        self.write_attempts(&run_dir, &report.attempts).await?;
        tokio::fs::write(
            run_dir.join(format!("final.{}", self.file_extension)),
            &report.synthesis.final_code,
        )
        .await
        .context("Failed to write final artifact")?;
        write_json(&run_dir.join("report.json"), report).await?;

        info!(path = %run_dir.display(), "Run report persisted");
        Ok(run_dir)
    }

    async fn persist_failure(&self, task: &str, error: &RunError) -> Result<PathBuf> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let run_dir = self.run_dir(now, run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        self.write_attempts(&run_dir, error.attempts()).await?;

        let decision = match error {
            RunError::Synthesis { decision, .. } => Some(decision.as_ref()),
            _ => None,
        };
        let document = FailureReport {
            run_id,
            task,
            finished_at: now,
            error_kind: error.kind(),
            error: error.to_string(),
            attempts: error.attempts(),
            decision,
        };
        write_json(&run_dir.join("report.json"), &document).await?;

        info!(path = %run_dir.display(), error_kind = error.kind(), "Failed run persisted");
        Ok(run_dir)
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize report data")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Filesystem-safe form of a model id (`openai/gpt-4o` -> `openai_gpt-4o`)
pub fn model_slug(model_id: &str) -> String {
    model_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
