use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::error::RunError;
use crate::domain::models::Report;

/// Persistence collaborator receiving run output
///
/// One addressable bundle per branch index plus one top-level bundle per run.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist a completed run, returning the location of its bundle
    async fn persist(&self, report: &Report) -> Result<PathBuf>;

    /// Persist whatever a failed run produced
    async fn persist_failure(&self, task: &str, error: &RunError) -> Result<PathBuf>;
}
