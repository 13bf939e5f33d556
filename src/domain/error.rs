use thiserror::Error;

use super::models::{Attempt, Decision};

/// Typed failure returned by a provider client call
///
/// `RateLimited`, `Timeout` and `ServerError` are transient and may be retried.
/// `AuthError` and `Unavailable` are immediately fatal for the call that raised them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Credentials rejected for this model
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Request did not complete in time
    #[error("Provider timeout")]
    Timeout,

    /// Provider-side failure worth retrying
    #[error("Provider server error: {0}")]
    ServerError(String),

    /// Model cannot serve requests (capacity, routing, provider down)
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Returns true if this failure is transient and the call may be retried
    ///
    /// # Examples
    ///
    /// ```
    /// use tribunal::domain::error::ProviderError;
    ///
    /// assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
    /// assert!(!ProviderError::AuthError("bad key".into()).is_retryable());
    /// ```
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout | Self::ServerError(_)
        )
    }

    /// Short machine-friendly name of the failure kind
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::AuthError(_) => "auth_error",
            Self::Timeout => "timeout",
            Self::ServerError(_) => "server_error",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Infrastructure failure of the sandbox executor itself
///
/// Runtime errors and timeouts of the executed code are *statuses*, not errors;
/// this type covers the executor being unable to run the code at all.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The sandbox process or browser could not be launched
    #[error("Sandbox launch failed: {0}")]
    Launch(String),

    /// Workspace preparation or artifact collection failed
    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandbox is not configured for execution
    #[error("Sandbox not configured: {0}")]
    NotConfigured(String),
}

/// Write-once violations of the run accumulator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    /// A second attempt arrived for an index that is already filled
    #[error("Branch {0} already merged")]
    DuplicateBranch(usize),

    /// Branch index outside the configured fan-out width
    #[error("Branch {index} outside configured width {width}")]
    UnknownBranch { index: usize, width: usize },

    /// Reduction requested before every branch reported
    #[error("Run state incomplete: {filled}/{expected} branches merged")]
    Incomplete { filled: usize, expected: usize },
}

/// Errors raised by the judge stage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgeError {
    /// No attempt finished with a successful execution
    #[error("No viable candidate: no attempt executed successfully")]
    NoViableCandidate,
}

/// Errors raised by the synthesis stage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// Decision references an attempt that is missing or not successful
    #[error("Decision references branch {0} which is not a successful attempt")]
    InvalidWinner(usize),

    /// Both the winning model and the fallback model failed
    #[error("Synthesis failed with primary model {primary} ({primary_error}) and fallback {fallback}")]
    Exhausted {
        primary: String,
        primary_error: String,
        fallback: String,
    },

    /// Winning model failed and no fallback model is configured
    #[error("Synthesis failed with model {model} and no fallback is configured: {error}")]
    NoFallback { model: String, error: String },

    /// Run cancelled while synthesizing
    #[error("Synthesis cancelled")]
    Cancelled,
}

/// Run-level failures
///
/// Every variant that can occur after branches were dispatched carries the full,
/// ordered set of attempts so the caller can still persist a report.
#[derive(Error, Debug)]
pub enum RunError {
    /// Zero attempts reached a successful execution
    #[error("No viable candidate: none of {} branches executed successfully", attempts.len())]
    NoViableCandidate { attempts: Vec<Attempt> },

    /// Primary and fallback synthesis paths were exhausted
    #[error("Synthesis failed: {source}")]
    Synthesis {
        #[source]
        source: SynthesisError,
        attempts: Vec<Attempt>,
        decision: Box<Decision>,
    },

    /// Run-level cancellation (timeout or external abort)
    #[error("Run cancelled")]
    Cancelled { attempts: Vec<Attempt> },

    /// Write-once merge contract violated
    #[error("Accumulator contract violated: {0}")]
    Accumulator(#[from] AccumulatorError),

    /// Run was started with no branch configurations
    #[error("No branches configured")]
    NoBranches,
}

impl RunError {
    /// Attempts gathered before the run failed, if any
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::NoViableCandidate { attempts }
            | Self::Synthesis { attempts, .. }
            | Self::Cancelled { attempts } => attempts,
            Self::Accumulator(_) | Self::NoBranches => &[],
        }
    }

    /// Short machine-friendly name of the fatal condition
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoViableCandidate { .. } => "no_viable_candidate",
            Self::Synthesis { .. } => "synthesis_error",
            Self::Cancelled { .. } => "cancelled",
            Self::Accumulator(_) => "accumulator_error",
            Self::NoBranches => "no_branches",
        }
    }
}
