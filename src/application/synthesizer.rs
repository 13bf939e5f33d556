//! Synthesis stage
//!
//! The winning branch's own model builds the final artifact from every attempt
//! plus the judge's advice. If that model stays unavailable after retries, or its
//! reply is unusable, one statically configured fallback model gets exactly one
//! call. Exhausting both is fatal for the run.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::extraction::{extract_code, extract_improvements, extract_plan};
use super::prompts::{synthesis_prompt, SYNTHESIZER_SYSTEM};
use super::retry::{RetryError, RetryPolicy};
use crate::domain::error::{ProviderError, SynthesisError};
use crate::domain::models::{Attempt, Decision, ModelDescriptor, SynthesisResult};
use crate::domain::ports::{Completion, CompletionRequest, ProviderClient};

/// Why one synthesis call produced nothing usable
#[derive(Debug)]
enum CallFailure {
    Provider(ProviderError, u32),
    NoCode,
    NoImprovements,
    Cancelled,
}

impl CallFailure {
    fn describe(&self) -> String {
        match self {
            Self::Provider(err, attempts) => format!("{err} after {attempts} attempt(s)"),
            Self::NoCode => "reply contained no code block".to_string(),
            Self::NoImprovements => {
                "reply listed no improvements for a winner that was not judged flawless".to_string()
            }
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Synthesis stage
pub struct Synthesizer {
    client: Arc<dyn ProviderClient>,
    fallback: Option<ModelDescriptor>,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
    language: String,
}

impl Synthesizer {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        fallback: Option<ModelDescriptor>,
        temperature: f32,
        max_tokens: u32,
        retry: RetryPolicy,
        language: impl Into<String>,
    ) -> Self {
        Self {
            client,
            fallback,
            temperature,
            max_tokens,
            retry,
            language: language.into(),
        }
    }

    /// Produce the final artifact for `decision`
    #[instrument(skip_all, fields(winner = decision.winning_branch_index))]
    pub async fn synthesize(
        &self,
        task: &str,
        decision: &Decision,
        attempts: &[Attempt],
        cancel: &CancellationToken,
    ) -> Result<SynthesisResult, SynthesisError> {
        let winner = attempts
            .iter()
            .find(|a| a.branch_index == decision.winning_branch_index && a.is_success())
            .ok_or(SynthesisError::InvalidWinner(decision.winning_branch_index))?;

        let prompt = synthesis_prompt(task, decision, attempts);
        let primary = ModelDescriptor::new(winner.model_id.clone());

        info!(model = %primary.id, "Synthesizing with winning model");
        let request = self.request(primary.clone(), &prompt);
        let outcome = self
            .retry
            .execute(cancel, || self.client.complete(request.clone()))
            .await;

        let primary_failure = match outcome.result {
            Ok(completion) => match self.accept(completion, decision, &primary, false) {
                Ok(result) => return Ok(result),
                Err(failure) => failure,
            },
            Err(RetryError::Cancelled) => return Err(SynthesisError::Cancelled),
            Err(RetryError::Provider(err)) => CallFailure::Provider(err, outcome.attempts),
        };

        warn!(
            model = %primary.id,
            error = %primary_failure.describe(),
            "Winning model could not synthesize"
        );

        let Some(fallback) = self.fallback.clone() else {
            return Err(SynthesisError::NoFallback {
                model: primary.id,
                error: primary_failure.describe(),
            });
        };

        info!(model = %fallback.id, "Synthesizing with fallback model");
        let request = self.request(fallback.clone(), &prompt);
        let fallback_result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CallFailure::Cancelled),
            result = self.client.complete(request) => match result {
                Ok(completion) => self.accept(completion, decision, &fallback, true),
                Err(err) => Err(CallFailure::Provider(err, 1)),
            },
        };

        match fallback_result {
            Ok(result) => Ok(result),
            Err(CallFailure::Cancelled) => Err(SynthesisError::Cancelled),
            Err(failure) => {
                warn!(model = %fallback.id, error = %failure.describe(), "Fallback synthesis failed");
                Err(SynthesisError::Exhausted {
                    primary: primary.id,
                    primary_error: primary_failure.describe(),
                    fallback: format!("{} ({})", fallback.id, failure.describe()),
                })
            }
        }
    }

    fn request(&self, model: ModelDescriptor, prompt: &str) -> CompletionRequest {
        CompletionRequest::new(model, SYNTHESIZER_SYSTEM, prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    fn accept(
        &self,
        completion: Completion,
        decision: &Decision,
        model: &ModelDescriptor,
        used_fallback: bool,
    ) -> Result<SynthesisResult, CallFailure> {
        let final_code = extract_code(&completion.text, &self.language).ok_or(CallFailure::NoCode)?;
        let applied_improvements = extract_improvements(&completion.text);
        if applied_improvements.is_empty() && !decision.winner_flawless {
            return Err(CallFailure::NoImprovements);
        }

        info!(
            model = %model.id,
            used_fallback,
            improvements = applied_improvements.len(),
            code_len = final_code.len(),
            "Final artifact synthesized"
        );

        Ok(SynthesisResult {
            final_code,
            model_used: model.id.clone(),
            used_fallback,
            applied_improvements,
            declared_plan: extract_plan(&completion.text),
            usage: completion.usage.unwrap_or_default(),
        })
    }
}
