//! Branch state machine
//!
//! One branch owns one generate → parse → execute → verify sequence for one
//! configured model:
//!
//! ```text
//! Dispatched → Generating → Parsing → Executing → Verifying → Done
//!                  │            │          │
//!                  └────────────┴──────────┴──→ Done (branch error recorded)
//! ```
//!
//! Every failure becomes data on the attempt; a branch always returns an
//! [`Attempt`] and never blocks or aborts its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::extraction;
use super::prompts::{generation_prompt, GENERATOR_SYSTEM};
use super::retry::{RetryError, RetryPolicy};
use super::verifier::Verifier;
use crate::domain::models::{
    Attempt, AttemptDraft, BranchConfig, BranchError, BranchState, ExecutionStatus, SandboxConfig,
};
use crate::domain::ports::{CompletionRequest, ProviderClient, SandboxExecutor, SandboxRequest};

/// Extra time granted to the sandbox beyond its own deadline before the branch
/// records a timeout itself
pub const SANDBOX_GRACE: Duration = Duration::from_secs(5);

/// Collaborators and settings shared read-only by every branch of a run
pub struct BranchContext {
    pub client: Arc<dyn ProviderClient>,
    pub sandbox: Arc<dyn SandboxExecutor>,
    pub verifier: Option<Arc<Verifier>>,
    pub retry: RetryPolicy,
    pub sandbox_settings: SandboxConfig,
    /// Fence language of the expected artifact
    pub language: String,
}

/// One isolated branch of a run
pub struct Branch {
    index: usize,
    config: BranchConfig,
    state: BranchState,
    draft: AttemptDraft,
    context: Arc<BranchContext>,
}

impl Branch {
    pub fn new(index: usize, config: BranchConfig, context: Arc<BranchContext>) -> Self {
        let draft = AttemptDraft::new(index, config.model.id.clone(), config.label.clone());
        Self {
            index,
            config,
            state: BranchState::Dispatched,
            draft,
            context,
        }
    }

    pub const fn state(&self) -> BranchState {
        self.state
    }

    /// Drive the branch to `Done`
    #[instrument(skip_all, fields(branch_index = self.index, model_id = %self.config.model.id))]
    pub async fn run(mut self, task: &str, cancel: &CancellationToken) -> Attempt {
        let started = Instant::now();

        if cancel.is_cancelled() {
            return self.cancelled(started);
        }

        // Generating
        self.transition(BranchState::Generating);
        let request = CompletionRequest::new(
            self.config.model.clone(),
            GENERATOR_SYSTEM,
            generation_prompt(task, &self.context.language),
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let client = Arc::clone(&self.context.client);
        let outcome = self
            .context
            .retry
            .execute(cancel, || client.complete(request.clone()))
            .await;

        let raw_output = match outcome.result {
            Ok(completion) => {
                info!(attempts = outcome.attempts, "Generation complete");
                self.draft
                    .record_generation(completion.text.clone(), outcome.attempts, completion.usage);
                completion.text
            }
            Err(RetryError::Cancelled) => {
                self.draft.record_generation_attempts(outcome.attempts);
                return self.cancelled(started);
            }
            Err(RetryError::Provider(err)) => {
                self.draft.record_generation_attempts(outcome.attempts);
                return self.fail(
                    BranchError::Provider {
                        failure: err.kind().to_string(),
                        message: err.to_string(),
                        attempts: outcome.attempts,
                    },
                    started,
                );
            }
        };

        // Parsing
        self.transition(BranchState::Parsing);
        let Some(extracted) = extraction::extract(&raw_output, &self.context.language) else {
            let message = format!(
                "no {} code block found in generation output",
                self.context.language
            );
            return self.fail(BranchError::Parse { message }, started);
        };
        if extracted.declared_plan.is_none() {
            debug!("No plan block in generation output");
        }
        let code = extracted.code.clone();
        self.draft
            .record_extraction(extracted.declared_plan, extracted.code);

        // Executing
        self.transition(BranchState::Executing);
        if cancel.is_cancelled() {
            return self.cancelled(started);
        }

        let settings = &self.context.sandbox_settings;
        let request = SandboxRequest {
            code,
            timeout_ms: settings.timeout_ms,
            viewport: settings.viewport,
            screenshot_quality: settings.screenshot_quality,
        };
        let deadline = Duration::from_millis(settings.timeout_ms) + SANDBOX_GRACE;

        let execution = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = timeout(deadline, self.context.sandbox.execute(request)) => Some(result),
        };

        match execution {
            None => {
                return self.cancelled(started);
            }
            Some(Err(_elapsed)) => {
                warn!(?deadline, "Sandbox did not report in time");
                self.draft
                    .record_execution(ExecutionStatus::Timeout, None, vec![]);
            }
            Some(Ok(Ok(response))) => {
                let status = ExecutionStatus::from(response.status);
                info!(%status, log_lines = response.log_lines.len(), "Execution finished");
                self.draft
                    .record_execution(status, response.snapshot, response.log_lines);
            }
            Some(Ok(Err(err))) => {
                warn!(error = %err, "Sandbox could not run the code");
                return self.fail(
                    BranchError::Sandbox {
                        message: err.to_string(),
                    },
                    started,
                );
            }
        }

        // Verifying
        self.transition(BranchState::Verifying);
        if let Some(verifier) = self.context.verifier.clone() {
            let (verification, usage) = verifier.verify(task, self.draft.view(), cancel).await;
            self.draft.record_verification(verification, usage);
        }

        self.transition(BranchState::Done);
        self.finish(started)
    }

    fn transition(&mut self, next: BranchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal branch transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Branch transition");
        self.state = next;
    }

    fn cancelled(self, started: Instant) -> Attempt {
        let state = self.state;
        self.fail(BranchError::Cancelled { state }, started)
    }

    fn fail(mut self, error: BranchError, started: Instant) -> Attempt {
        warn!(state = %self.state, error = %error, "Branch failed");
        self.draft.record_failure(error);
        self.transition(BranchState::Done);
        self.finish(started)
    }

    fn finish(self, started: Instant) -> Attempt {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let attempt = self.draft.finish(duration_ms);
        info!(
            status = %attempt.execution_status,
            failed = attempt.branch_error.is_some(),
            duration_ms,
            "Branch done"
        );
        attempt
    }
}
