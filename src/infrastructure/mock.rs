//! Scripted provider and sandbox doubles for testing.
//!
//! Both record every request they receive so tests can assert call counts and
//! inspect exactly what each stage was shown.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::error::{ProviderError, SandboxError};
use crate::domain::models::{Snapshot, TokenUsage};
use crate::domain::ports::{
    Completion, CompletionRequest, ProviderClient, SandboxExecutor, SandboxRequest,
    SandboxResponse, SandboxStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct ProviderStep {
    reply: Result<Completion, ProviderError>,
    delay: Option<Duration>,
}

/// Provider double answering from per-model scripts
///
/// Each model has a queue of replies consumed in order. When the queue is empty
/// the model's standing reply (see [`ScriptedProvider::always_error`]) is used,
/// otherwise the call fails with `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<ProviderStep>>>,
    standing: Mutex<HashMap<String, ProviderStep>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, model_id: &str, step: ProviderStep) {
        lock(&self.scripts)
            .entry(model_id.to_string())
            .or_default()
            .push_back(step);
    }

    /// Queue a text reply for `model_id`
    pub fn push_text(&self, model_id: &str, text: impl Into<String>) {
        self.push_completion(
            model_id,
            Completion {
                text: text.into(),
                usage: Some(TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                }),
            },
        );
    }

    /// Queue a text reply delivered after `delay`
    pub fn push_delayed_text(&self, model_id: &str, text: impl Into<String>, delay: Duration) {
        self.push(
            model_id,
            ProviderStep {
                reply: Ok(Completion::text(text)),
                delay: Some(delay),
            },
        );
    }

    pub fn push_completion(&self, model_id: &str, completion: Completion) {
        self.push(
            model_id,
            ProviderStep {
                reply: Ok(completion),
                delay: None,
            },
        );
    }

    /// Queue a single failure for `model_id`
    pub fn push_error(&self, model_id: &str, error: ProviderError) {
        self.push(
            model_id,
            ProviderStep {
                reply: Err(error),
                delay: None,
            },
        );
    }

    /// Fail every unscripted call to `model_id` with `error`
    pub fn always_error(&self, model_id: &str, error: ProviderError) {
        lock(&self.standing).insert(
            model_id.to_string(),
            ProviderStep {
                reply: Err(error),
                delay: None,
            },
        );
    }

    /// Answer every unscripted call to `model_id` with `text`
    pub fn always_text(&self, model_id: &str, text: impl Into<String>) {
        lock(&self.standing).insert(
            model_id.to_string(),
            ProviderStep {
                reply: Ok(Completion::text(text)),
                delay: None,
            },
        );
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_for(&self, model_id: &str) -> Vec<CompletionRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.model.id == model_id)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn calls_for(&self, model_id: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.model.id == model_id)
            .count()
    }

    fn next_step(&self, model_id: &str) -> ProviderStep {
        if let Some(step) = lock(&self.scripts)
            .get_mut(model_id)
            .and_then(VecDeque::pop_front)
        {
            return step;
        }
        lock(&self.standing)
            .get(model_id)
            .cloned()
            .unwrap_or_else(|| ProviderStep {
                reply: Err(ProviderError::Unavailable(format!(
                    "no scripted reply for {model_id}"
                ))),
                delay: None,
            })
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let step = self.next_step(&request.model.id);
        lock(&self.requests).push(request);
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        step.reply
    }
}

#[derive(Debug, Clone)]
enum SandboxStep {
    Respond(SandboxResponse),
    Delayed(SandboxResponse, Duration),
    LaunchFailure(String),
    Panic(String),
}

/// Sandbox double
///
/// Rules keyed on a code fragment take precedence and are never consumed, which
/// keeps concurrent branches deterministic. Then queued steps apply in order, and
/// finally a successful execution with a snapshot.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    rules: Mutex<Vec<(String, SandboxStep)>>,
    queue: Mutex<VecDeque<SandboxStep>>,
    requests: Mutex<Vec<SandboxRequest>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response for an execution with `status`
    pub fn response(status: SandboxStatus) -> SandboxResponse {
        match status {
            SandboxStatus::Success => SandboxResponse {
                status,
                snapshot: Some(Snapshot::jpeg("/9j/4AAQSkZJRg==")),
                log_lines: vec!["[LOG] rendered".to_string()],
            },
            SandboxStatus::RuntimeError => SandboxResponse {
                status,
                snapshot: Some(Snapshot::jpeg("/9j/4AAQSkZJRg==")),
                log_lines: vec!["[PAGE ERROR] ReferenceError: x is not defined".to_string()],
            },
            SandboxStatus::Timeout => SandboxResponse::timeout(vec![]),
        }
    }

    pub fn push_status(&self, status: SandboxStatus) {
        lock(&self.queue).push_back(SandboxStep::Respond(Self::response(status)));
    }

    pub fn push_delayed(&self, status: SandboxStatus, delay: Duration) {
        lock(&self.queue).push_back(SandboxStep::Delayed(Self::response(status), delay));
    }

    pub fn push_launch_failure(&self, message: impl Into<String>) {
        lock(&self.queue).push_back(SandboxStep::LaunchFailure(message.into()));
    }

    /// Answer every execution whose code contains `fragment` with `status`
    pub fn when_code_contains(&self, fragment: impl Into<String>, status: SandboxStatus) {
        lock(&self.rules).push((fragment.into(), SandboxStep::Respond(Self::response(status))));
    }

    /// Panic inside every execution whose code contains `fragment`
    pub fn panic_when_code_contains(&self, fragment: impl Into<String>, message: impl Into<String>) {
        lock(&self.rules).push((fragment.into(), SandboxStep::Panic(message.into())));
    }

    pub fn requests(&self) -> Vec<SandboxRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_step(&self, code: &str) -> SandboxStep {
        if let Some((_, step)) = lock(&self.rules)
            .iter()
            .find(|(fragment, _)| code.contains(fragment.as_str()))
        {
            return step.clone();
        }
        lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| SandboxStep::Respond(Self::response(SandboxStatus::Success)))
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxResponse, SandboxError> {
        let step = self.next_step(&request.code);
        lock(&self.requests).push(request);
        match step {
            SandboxStep::Respond(response) => Ok(response),
            SandboxStep::Delayed(response, delay) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            SandboxStep::LaunchFailure(message) => Err(SandboxError::Launch(message)),
            SandboxStep::Panic(message) => panic!("{message}"),
        }
    }
}
