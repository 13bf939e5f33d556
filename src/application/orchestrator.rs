//! Run orchestrator
//!
//! Owns one run end to end: fans out one branch per configured model, waits at a
//! full join barrier, then reduces the ordered attempts through the judge and the
//! synthesizer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                Orchestrator                  │
//! ├──────────────────────────────────────────────┤
//! │ - Worker pool (Semaphore sized to N)         │
//! │ - Aggregation channel (mpsc) → RunState      │
//! │ - Run-level CancellationToken                │
//! └──────────────────────────────────────────────┘
//!        │ spawn N                        ▲
//!        ▼                                │ (index, Attempt)
//!   Branch 0 … Branch N-1 ────────────────┘
//!                     │ barrier
//!                     ▼
//!           Judge → Synthesizer → Report
//! ```

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::branch::{Branch, BranchContext};
use super::judge::Judge;
use super::retry::RetryPolicy;
use super::synthesizer::Synthesizer;
use super::verifier::Verifier;
use crate::domain::error::{JudgeError, RunError, SynthesisError};
use crate::domain::models::{
    Attempt, BranchConfig, BranchError, BranchState, Config, Report, RunState, SynthesisResult,
};
use crate::domain::ports::{ProviderClient, SandboxExecutor};

/// Pipeline orchestrator
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use tribunal::application::Orchestrator;
/// use tribunal::domain::models::Config;
/// use tribunal::infrastructure::mock::{ScriptedProvider, ScriptedSandbox};
///
/// # async fn example(config: Config) -> Result<(), tribunal::domain::RunError> {
/// let orchestrator = Orchestrator::new(
///     &config,
///     Arc::new(ScriptedProvider::new()),
///     Arc::new(ScriptedSandbox::new()),
/// );
///
/// let (result, report) = orchestrator
///     .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
///     .await?;
/// println!("{} won, {} attempts", result.model_used, report.attempts.len());
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    branch_context: Arc<BranchContext>,
    judge: Judge,
    synthesizer: Synthesizer,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        client: Arc<dyn ProviderClient>,
        sandbox: Arc<dyn SandboxExecutor>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);

        let verifier = config.verifier_model.clone().map(|model| {
            Arc::new(Verifier::new(
                Arc::clone(&client),
                model,
                config.verifier_temperature,
                config.reduction_max_tokens,
                retry.clone(),
            ))
        });

        let judge = Judge::new(
            Arc::clone(&client),
            config.judge_model.clone(),
            config.judge_temperature,
            config.reduction_max_tokens,
            retry.clone(),
        );

        let synthesizer = Synthesizer::new(
            Arc::clone(&client),
            config.synthesizer_fallback_model.clone(),
            config.synthesizer_temperature,
            config.reduction_max_tokens,
            retry.clone(),
            config.artifact.language.clone(),
        );

        let branch_context = Arc::new(BranchContext {
            client,
            sandbox,
            verifier,
            retry,
            sandbox_settings: config.sandbox.clone(),
            language: config.artifact.language.clone(),
        });

        Self {
            branch_context,
            judge,
            synthesizer,
            run_timeout: config.run.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Execute one full run
    ///
    /// Returns the synthesized artifact plus a report covering every branch, or
    /// a run-level error naming the fatal condition.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, branches = branches.len()))]
    pub async fn run(
        &self,
        task: &str,
        branches: &[BranchConfig],
        cancel: CancellationToken,
    ) -> Result<(SynthesisResult, Report), RunError> {
        if branches.is_empty() {
            return Err(RunError::NoBranches);
        }

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        info!(task_len = task.len(), "Run started");

        let cancel = cancel.child_token();
        let deadline = self.run_timeout.map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(limit) => {
                        warn!(?limit, "Run deadline reached, cancelling");
                        token.cancel();
                    }
                    () = token.cancelled() => {}
                }
            })
        });

        let outcome = self.execute(run_id, task, branches, &cancel, started_at).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        match &outcome {
            Ok((result, _)) => info!(model_used = %result.model_used, "Run complete"),
            Err(err) => error!(kind = err.kind(), error = %err, "Run failed"),
        }
        outcome
    }

    async fn execute(
        &self,
        run_id: Uuid,
        task: &str,
        branches: &[BranchConfig],
        cancel: &CancellationToken,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<(SynthesisResult, Report), RunError> {
        let attempts = self.fan_out(task, branches, cancel).await?;

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { attempts });
        }

        let viable = attempts.iter().filter(|a| a.is_success()).count();
        info!(viable, total = attempts.len(), "Barrier reached");
        if viable == 0 {
            return Err(RunError::NoViableCandidate { attempts });
        }

        let decision = match self.judge.decide(task, &attempts, cancel).await {
            Ok(decision) => decision,
            Err(JudgeError::NoViableCandidate) => {
                return Err(RunError::NoViableCandidate { attempts });
            }
        };

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { attempts });
        }

        let synthesis = match self
            .synthesizer
            .synthesize(task, &decision, &attempts, cancel)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(SynthesisError::Cancelled) => return Err(RunError::Cancelled { attempts }),
            Err(source) => {
                return Err(RunError::Synthesis {
                    source,
                    attempts,
                    decision: Box::new(decision),
                });
            }
        };

        let report = Report {
            run_id,
            task: task.to_string(),
            started_at,
            finished_at: Utc::now(),
            attempts,
            decision,
            synthesis: synthesis.clone(),
        };

        Ok((synthesis, report))
    }

    /// Spawn every branch and merge their attempts once all have reported
    async fn fan_out(
        &self,
        task: &str,
        branches: &[BranchConfig],
        cancel: &CancellationToken,
    ) -> Result<Vec<Attempt>, RunError> {
        let width = branches.len();
        let pool = Arc::new(Semaphore::new(width));
        let (tx, mut rx) = mpsc::channel::<(usize, Attempt)>(width);
        let task: Arc<str> = Arc::from(task);
        let mut workers = JoinSet::new();

        for (index, config) in branches.iter().cloned().enumerate() {
            let pool = Arc::clone(&pool);
            let tx = tx.clone();
            let task = Arc::clone(&task);
            let cancel = cancel.clone();
            let context = Arc::clone(&self.branch_context);

            workers.spawn(async move {
                let model_id = config.model.id.clone();
                let label = config.label.clone();

                let attempt = match pool.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => {
                        let branch = Branch::new(index, config, context);
                        AssertUnwindSafe(branch.run(&task, &cancel))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| {
                                error!(branch_index = index, "Branch panicked");
                                Attempt::not_executed(
                                    index,
                                    model_id,
                                    label,
                                    BranchError::Crashed {
                                        message: panic_message(panic.as_ref()),
                                    },
                                )
                            })
                    }
                    _ => Attempt::not_executed(
                        index,
                        model_id,
                        label,
                        BranchError::Cancelled {
                            state: BranchState::Dispatched,
                        },
                    ),
                };

                if tx.send((index, attempt)).await.is_err() {
                    warn!(branch_index = index, "Aggregation channel closed");
                }
            });
        }
        drop(tx);

        let mut state = RunState::new(width);
        while let Some((index, attempt)) = rx.recv().await {
            state.insert(index, attempt)?;
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Branch worker did not complete");
            }
        }

        for (index, config) in branches.iter().enumerate() {
            if !state.contains(index) {
                state.insert(
                    index,
                    Attempt::not_executed(
                        index,
                        config.model.id.clone(),
                        config.label.clone(),
                        BranchError::Crashed {
                            message: "branch worker exited without reporting".to_string(),
                        },
                    ),
                )?;
            }
        }

        Ok(state.into_sorted()?)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExecutionStatus, ModelDescriptor, RetryConfig};
    use crate::domain::ports::SandboxStatus;
    use crate::infrastructure::mock::{ScriptedProvider, ScriptedSandbox};

    fn reply(index: usize) -> String {
        format!("<thought>plan {index}</thought>\n```html\n<html>{index}</html>\n```")
    }

    fn config(width: usize) -> Config {
        Config {
            branches: (0..width).map(|i| BranchConfig::new(format!("gen-{i}"))).collect(),
            judge_model: ModelDescriptor::new("judge"),
            retry: RetryConfig {
                max_attempts: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_no_branches() {
        let config = config(0);
        let orchestrator = Orchestrator::new(
            &config,
            Arc::new(ScriptedProvider::new()),
            Arc::new(ScriptedSandbox::new()),
        );
        let err = orchestrator
            .run("task", &[], CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoBranches));
    }

    #[tokio::test]
    async fn test_attempts_are_sorted_regardless_of_completion_order() {
        let config = config(3);
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_delayed_text("gen-0", &reply(0), Duration::from_millis(60));
        provider.push_delayed_text("gen-1", &reply(1), Duration::from_millis(30));
        provider.push_text("gen-2", &reply(2));
        provider.push_text("judge", r#"{"scores": [{"branch_index": 2, "score": 9}], "reasoning": "r"}"#);
        provider.push_text("gen-2", "```html\n<html>final</html>\n```\n<improvements>\n- tidy\n</improvements>");
        let sandbox = Arc::new(ScriptedSandbox::new());

        let (result, report) = Orchestrator::new(&config, provider, sandbox)
            .run("task", &config.branches, CancellationToken::new())
            .await
            .unwrap();

        let indices: Vec<usize> = report.attempts.iter().map(|a| a.branch_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.decision.winning_branch_index, 2);
        assert_eq!(result.model_used, "gen-2");
    }

    #[tokio::test]
    async fn test_run_deadline_cancels() {
        let mut config = config(2);
        config.run.timeout_secs = Some(0);
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_delayed_text("gen-0", &reply(0), Duration::from_secs(60));
        provider.push_delayed_text("gen-1", &reply(1), Duration::from_secs(60));
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.push_status(SandboxStatus::Success);

        let err = Orchestrator::new(&config, Arc::clone(&provider) as Arc<dyn ProviderClient>, sandbox)
            .run("task", &config.branches, CancellationToken::new())
            .await
            .unwrap_err();

        let RunError::Cancelled { attempts } = err else {
            panic!("expected cancellation, got {err:?}");
        };
        assert_eq!(attempts.len(), 2);
        assert!(attempts
            .iter()
            .all(|a| a.execution_status == ExecutionStatus::NotExecuted));
        assert_eq!(provider.calls_for("judge"), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
