use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of running a branch's code in the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Code ran and produced a snapshot
    Success,
    /// Code ran but raised errors
    RuntimeError,
    /// Sandbox deadline elapsed
    Timeout,
    /// Code never reached the sandbox
    NotExecuted,
}

impl ExecutionStatus {
    /// Whether snapshot and execution log are retained for this status
    pub const fn keeps_evidence(self) -> bool {
        matches!(self, Self::Success | Self::RuntimeError)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::RuntimeError => "runtime_error",
            Self::Timeout => "timeout",
            Self::NotExecuted => "not_executed",
        };
        f.write_str(s)
    }
}

/// Verifier's comparison of declared reasoning against actual behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealityCheck {
    /// Declared mechanisms are visible in code or logs
    Pass,
    /// A declared mechanism is contradicted or absent
    Fail,
    /// No declared plan to compare against
    NotApplicable,
}

impl fmt::Display for RealityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotApplicable => "n/a",
        };
        f.write_str(s)
    }
}

/// States of the per-branch state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    Dispatched,
    Generating,
    Parsing,
    Executing,
    Verifying,
    Done,
}

impl BranchState {
    /// Check if a transition to `next` is allowed
    ///
    /// States only move forward, and any state may jump straight to `Done`
    /// when a branch-local failure is recorded.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == Self::Done {
            return false;
        }
        next == Self::Done || next as u8 == self as u8 + 1
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dispatched => "dispatched",
            Self::Generating => "generating",
            Self::Parsing => "parsing",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Terminal branch-local failure, recorded as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BranchError {
    /// Generation failed after the retry ceiling or with a fatal provider error
    Provider {
        failure: String,
        message: String,
        attempts: u32,
    },
    /// Generation output had no code block
    Parse { message: String },
    /// Sandbox infrastructure could not run the code
    Sandbox { message: String },
    /// Run-level cancellation reached this branch
    Cancelled { state: BranchState },
    /// The branch worker died unexpectedly
    Crashed { message: String },
}

impl fmt::Display for BranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider {
                failure,
                message,
                attempts,
            } => write!(f, "provider {failure} after {attempts} attempt(s): {message}"),
            Self::Parse { message } => write!(f, "parse error: {message}"),
            Self::Sandbox { message } => write!(f, "sandbox error: {message}"),
            Self::Cancelled { state } => write!(f, "cancelled while {state}"),
            Self::Crashed { message } => write!(f, "branch crashed: {message}"),
        }
    }
}

/// Visual capture of an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// MIME type of the encoded image, e.g. `image/jpeg`
    pub media_type: String,
    /// Base64-encoded image bytes
    pub data_base64: String,
}

impl Snapshot {
    pub fn jpeg(data_base64: impl Into<String>) -> Self {
        Self {
            media_type: "image/jpeg".to_string(),
            data_base64: data_base64.into(),
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub const fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

/// Verifier findings for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Logic correctness score (0-10)
    pub logic_score: u8,
    /// Visual fidelity score (0-10), omitted when execution did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_score: Option<u8>,
    /// Ordered findings
    pub bugs: Vec<String>,
    pub reality_check: RealityCheck,
    /// Declared mechanisms with no trace in code or logs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_claims: Vec<String>,
    /// Free-text critique from the verifier model
    #[serde(default)]
    pub critique: String,
    /// Set when the verifier call itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_error: Option<String>,
}

/// One branch's complete recorded outcome
///
/// Built by exactly one branch and never modified once that branch reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Stable dispatch index, unique within a run
    pub branch_index: usize,
    /// Identifier of the generating model
    pub model_id: String,
    /// Optional human label from configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Full generation text as returned by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub execution_status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_log: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_error: Option<BranchError>,
    /// Provider calls made while generating (1 = first try succeeded)
    pub generation_attempts: u32,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Attempt {
    /// Attempt for a branch that never ran its own worker
    pub fn not_executed(
        branch_index: usize,
        model_id: impl Into<String>,
        label: Option<String>,
        error: BranchError,
    ) -> Self {
        Self {
            branch_index,
            model_id: model_id.into(),
            label,
            raw_output: None,
            declared_plan: None,
            code: None,
            execution_status: ExecutionStatus::NotExecuted,
            snapshot: None,
            execution_log: None,
            verification: None,
            branch_error: Some(error),
            generation_attempts: 0,
            usage: TokenUsage::default(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.execution_status == ExecutionStatus::Success
    }

    /// Label if configured, otherwise the model id
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.model_id)
    }

    /// Reality check outcome, `NotApplicable` when verification never ran
    pub fn reality_check(&self) -> RealityCheck {
        self.verification
            .as_ref()
            .map_or(RealityCheck::NotApplicable, |v| v.reality_check)
    }
}

/// Mutable attempt under construction inside a single branch
#[derive(Debug, Clone)]
pub struct AttemptDraft {
    attempt: Attempt,
}

impl AttemptDraft {
    pub fn new(branch_index: usize, model_id: impl Into<String>, label: Option<String>) -> Self {
        Self {
            attempt: Attempt {
                branch_index,
                model_id: model_id.into(),
                label,
                raw_output: None,
                declared_plan: None,
                code: None,
                execution_status: ExecutionStatus::NotExecuted,
                snapshot: None,
                execution_log: None,
                verification: None,
                branch_error: None,
                generation_attempts: 0,
                usage: TokenUsage::default(),
                duration_ms: 0,
            },
        }
    }

    pub fn view(&self) -> &Attempt {
        &self.attempt
    }

    pub fn record_generation(&mut self, raw_output: String, attempts: u32, usage: Option<TokenUsage>) {
        self.attempt.raw_output = Some(raw_output);
        self.attempt.generation_attempts = attempts;
        if let Some(usage) = usage {
            self.attempt.usage = self.attempt.usage.add(usage);
        }
    }

    pub fn record_generation_attempts(&mut self, attempts: u32) {
        self.attempt.generation_attempts = attempts;
    }

    pub fn record_extraction(&mut self, declared_plan: Option<String>, code: String) {
        self.attempt.declared_plan = declared_plan;
        self.attempt.code = Some(code);
    }

    /// Record sandbox outcome; evidence is only kept for statuses that retain it
    pub fn record_execution(
        &mut self,
        status: ExecutionStatus,
        snapshot: Option<Snapshot>,
        log_lines: Vec<String>,
    ) {
        self.attempt.execution_status = status;
        if status.keeps_evidence() {
            self.attempt.snapshot = snapshot;
            self.attempt.execution_log = Some(log_lines);
        } else {
            self.attempt.snapshot = None;
            self.attempt.execution_log = None;
        }
    }

    pub fn record_verification(&mut self, verification: Verification, usage: Option<TokenUsage>) {
        self.attempt.verification = Some(verification);
        if let Some(usage) = usage {
            self.attempt.usage = self.attempt.usage.add(usage);
        }
    }

    /// Record a terminal branch error; the code is no longer usable afterwards
    pub fn record_failure(&mut self, error: BranchError) {
        self.attempt.code = None;
        self.attempt.snapshot = None;
        self.attempt.execution_log = None;
        self.attempt.execution_status = ExecutionStatus::NotExecuted;
        self.attempt.branch_error = Some(error);
    }

    pub fn finish(mut self, duration_ms: u64) -> Attempt {
        self.attempt.duration_ms = duration_ms;
        self.attempt
    }
}
