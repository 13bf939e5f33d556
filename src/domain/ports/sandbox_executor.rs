//! Sandbox Executor Port
//!
//! Runs untrusted generated code in isolation and reports a status, a visual
//! snapshot and a log stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::SandboxError;
use crate::domain::models::{ExecutionStatus, Snapshot, Viewport};

/// Request to execute code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRequest {
    pub code: String,
    pub timeout_ms: u64,
    pub viewport: Viewport,
    pub screenshot_quality: u8,
}

/// Status reported by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Success,
    RuntimeError,
    Timeout,
}

impl From<SandboxStatus> for ExecutionStatus {
    fn from(status: SandboxStatus) -> Self {
        match status {
            SandboxStatus::Success => Self::Success,
            SandboxStatus::RuntimeError => Self::RuntimeError,
            SandboxStatus::Timeout => Self::Timeout,
        }
    }
}

/// Sandbox reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxResponse {
    pub status: SandboxStatus,
    pub snapshot: Option<Snapshot>,
    pub log_lines: Vec<String>,
}

impl SandboxResponse {
    pub fn timeout(log_lines: Vec<String>) -> Self {
        Self {
            status: SandboxStatus::Timeout,
            snapshot: None,
            log_lines,
        }
    }
}

/// Port trait for sandbox implementations
///
/// An `Err` means the sandbox could not run the code at all. Runtime failures
/// and deadline expiry of the code itself are reported through `SandboxStatus`.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResponse, SandboxError>;
}
