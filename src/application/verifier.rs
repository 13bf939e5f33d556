//! Branch-local verification
//!
//! Asks the verifier model to score one attempt and merges its verdict with the
//! static reality check. A failed verifier call never fails the branch: scores are
//! zeroed, the failure is listed as a bug and the static check still applies.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::extraction::extract_json_object;
use super::prompts::{verification_prompt, VERIFIER_SYSTEM};
use super::reality_check::{self, RealityAssessment};
use super::retry::{RetryError, RetryPolicy};
use crate::domain::models::{Attempt, ModelDescriptor, RealityCheck, TokenUsage, Verification};
use crate::domain::ports::{CompletionRequest, ProviderClient, ResponseFormat, VisionInput};

#[derive(Debug, Deserialize)]
struct VerifierReply {
    #[serde(default, alias = "logic_score")]
    score_logic: f64,
    #[serde(default, alias = "visual_score")]
    score_visual: f64,
    #[serde(default, alias = "bugs")]
    found_bugs: Vec<String>,
    #[serde(default)]
    reality_check: Option<String>,
    #[serde(default, alias = "critique")]
    critique_text: String,
}

/// Verifier stage bound to one configured model
pub struct Verifier {
    client: Arc<dyn ProviderClient>,
    model: ModelDescriptor,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl Verifier {
    pub fn new(
        client: Arc<dyn ProviderClient>,
        model: ModelDescriptor,
        temperature: f32,
        max_tokens: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            model,
            temperature,
            max_tokens,
            retry,
        }
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Verify one attempt
    ///
    /// An in-flight verifier call is allowed to finish after cancellation, but no
    /// retry is issued once `cancel` has fired.
    #[instrument(skip_all, fields(branch_index = attempt.branch_index, verifier = %self.model.id))]
    pub async fn verify(
        &self,
        task: &str,
        attempt: &Attempt,
        cancel: &CancellationToken,
    ) -> (Verification, Option<TokenUsage>) {
        let assessment = reality_check::assess(
            attempt.declared_plan.as_deref(),
            attempt.code.as_deref(),
            attempt.execution_log.as_deref(),
        );

        let mut vision_inputs = vec![];
        if attempt.is_success() {
            if let Some(snapshot) = &attempt.snapshot {
                vision_inputs.push(VisionInput {
                    caption: format!("branch {} snapshot", attempt.branch_index),
                    image: snapshot.clone(),
                });
            }
        }

        let request = CompletionRequest::new(
            self.model.clone(),
            VERIFIER_SYSTEM,
            verification_prompt(task, attempt),
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_format(ResponseFormat::Json)
        .with_vision_inputs(vision_inputs);

        let outcome = self
            .retry
            .execute_to_completion(cancel, || self.client.complete(request.clone()))
            .await;

        let completion = match outcome.result {
            Ok(completion) => completion,
            Err(err) => {
                let message = match err {
                    RetryError::Cancelled => "verification cancelled".to_string(),
                    RetryError::Provider(e) => {
                        format!("verifier call failed after {} attempt(s): {e}", outcome.attempts)
                    }
                };
                warn!(error = %message, "Verifier failed");
                return (failed_verification(attempt, assessment, message), None);
            }
        };

        let Some(reply) = extract_json_object(&completion.text)
            .and_then(|json| serde_json::from_str::<VerifierReply>(json).ok())
        else {
            let message = "verifier reply was not a JSON verdict".to_string();
            warn!("Verifier returned an unparseable reply");
            return (
                failed_verification(attempt, assessment, message),
                completion.usage,
            );
        };

        let model_verdict = reply.reality_check.as_deref().and_then(parse_verdict);
        let reality_check = reality_check::combine(assessment.outcome, model_verdict);

        let mut bugs = reply.found_bugs;
        if reality_check == RealityCheck::Fail {
            for claim in &assessment.unsupported {
                bugs.push(format!("declared mechanism '{claim}' has no trace in code or logs"));
            }
        }

        let verification = Verification {
            logic_score: to_score(reply.score_logic),
            visual_score: attempt.is_success().then(|| to_score(reply.score_visual)),
            bugs,
            reality_check,
            unsupported_claims: assessment.unsupported,
            critique: reply.critique_text,
            verifier_error: None,
        };

        info!(
            logic = verification.logic_score,
            visual = ?verification.visual_score,
            reality = %verification.reality_check,
            bugs = verification.bugs.len(),
            "Verification complete"
        );

        (verification, completion.usage)
    }
}

fn failed_verification(
    attempt: &Attempt,
    assessment: RealityAssessment,
    message: String,
) -> Verification {
    Verification {
        logic_score: 0,
        visual_score: attempt.is_success().then_some(0),
        bugs: vec![format!("Verifier failure: {message}")],
        reality_check: assessment.outcome,
        unsupported_claims: assessment.unsupported,
        critique: String::new(),
        verifier_error: Some(message),
    }
}

fn parse_verdict(raw: &str) -> Option<RealityCheck> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pass" | "passed" | "consistent" => Some(RealityCheck::Pass),
        "fail" | "failed" | "inconsistent" => Some(RealityCheck::Fail),
        "n/a" | "na" | "not_applicable" => Some(RealityCheck::NotApplicable),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 10.0) as u8
}
