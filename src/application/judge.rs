//! Judge stage
//!
//! Picks the winning branch among attempts whose execution succeeded. The judge
//! model scores candidates; when it fails or replies with nothing usable, a
//! deterministic ranking over verifier findings decides instead. Ties always go
//! to the lowest branch index.

use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::extraction::extract_json_object;
use super::prompts::{judge_prompt, JUDGE_SYSTEM};
use super::retry::RetryPolicy;
use crate::domain::error::JudgeError;
use crate::domain::models::{
    Attempt, Decision, DecisionSource, ModelDescriptor, RealityCheck, TokenUsage,
};
use crate::domain::ports::{CompletionRequest, ProviderClient, ResponseFormat};

#[derive(Debug, Deserialize)]
struct JudgeReply {
    #[serde(default)]
    scores: Vec<BranchScore>,
    #[serde(default, alias = "best_candidate_index", alias = "winner")]
    best_branch_index: Option<usize>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    synthesis_advice: String,
    #[serde(default)]
    winner_flawless: bool,
}

#[derive(Debug, Deserialize)]
struct BranchScore {
    branch_index: usize,
    score: f64,
}

/// Judge stage bound to one configured model
pub struct Judge {
    client: Arc<dyn ProviderClient>,
    model: ModelDescriptor,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl Judge {
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

    /// Select a winning branch from the full, ordered set of attempts
    #[instrument(skip_all, fields(judge = %self.model.id, candidates = attempts.len()))]
    pub async fn decide(
        &self,
        task: &str,
        attempts: &[Attempt],
        cancel: &CancellationToken,
    ) -> Result<Decision, JudgeError> {
        if !attempts.iter().any(Attempt::is_success) {
            return Err(JudgeError::NoViableCandidate);
        }

        let request = CompletionRequest::new(self.model.clone(), JUDGE_SYSTEM, judge_prompt(task, attempts))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_format(ResponseFormat::Json);

        let outcome = self
            .retry
            .execute(cancel, || self.client.complete(request.clone()))
            .await;

        let (reply, usage) = match outcome.result {
            Ok(completion) => {
                let reply = extract_json_object(&completion.text)
                    .and_then(|json| serde_json::from_str::<JudgeReply>(json).ok());
                if reply.is_none() {
                    warn!("Judge reply was not a JSON decision, ranking heuristically");
                }
                (reply, completion.usage.unwrap_or_default())
            }
            Err(err) => {
                warn!(error = %err, attempts = outcome.attempts, "Judge model failed, ranking heuristically");
                (None, TokenUsage::default())
            }
        };

        let decision = match reply.and_then(|reply| from_reply(reply, attempts)) {
            Some(mut decision) => {
                decision.usage = usage;
                decision
            }
            None => {
                let mut decision = heuristic_decision(attempts).ok_or(JudgeError::NoViableCandidate)?;
                decision.usage = usage;
                decision
            }
        };

        info!(
            winner = decision.winning_branch_index,
            source = ?decision.source,
            flawless = decision.winner_flawless,
            "Judge decision"
        );
        Ok(decision)
    }
}

/// Decision from the judge model's scores, or `None` if it named no eligible branch
fn from_reply(reply: JudgeReply, attempts: &[Attempt]) -> Option<Decision> {
    let eligible = |index: usize| {
        attempts
            .iter()
            .any(|a| a.branch_index == index && a.is_success())
    };

    let scored = reply
        .scores
        .iter()
        .filter(|s| eligible(s.branch_index) && s.score.is_finite())
        .fold(None::<&BranchScore>, |best, candidate| match best {
            None => Some(candidate),
            Some(best) => match candidate.score.partial_cmp(&best.score) {
                Some(Ordering::Greater) => Some(candidate),
                Some(Ordering::Equal) if candidate.branch_index < best.branch_index => {
                    Some(candidate)
                }
                _ => Some(best),
            },
        })
        .map(|s| s.branch_index);

    let winner = scored.or_else(|| reply.best_branch_index.filter(|&i| eligible(i)))?;

    let synthesis_advice = if reply.synthesis_advice.trim().is_empty() {
        attributed_advice(attempts, winner)
    } else {
        reply.synthesis_advice
    };

    Some(Decision {
        winning_branch_index: winner,
        rationale: reply.reasoning,
        synthesis_advice,
        winner_flawless: reply.winner_flawless,
        source: DecisionSource::JudgeModel,
        usage: TokenUsage::default(),
    })
}

const fn reality_rank(check: RealityCheck) -> u8 {
    match check {
        RealityCheck::Pass => 2,
        RealityCheck::NotApplicable => 1,
        RealityCheck::Fail => 0,
    }
}

fn heuristic_key(attempt: &Attempt) -> (u8, u16, usize) {
    let verification = attempt.verification.as_ref();
    let scores = verification.map_or(0, |v| {
        u16::from(v.logic_score) + u16::from(v.visual_score.unwrap_or(0))
    });
    let bugs = verification.map_or(0, |v| v.bugs.len());
    (reality_rank(attempt.reality_check()), scores, bugs)
}

/// Deterministic ranking: reality check, then scores, then fewest bugs, then lowest index
pub fn heuristic_decision(attempts: &[Attempt]) -> Option<Decision> {
    let winner = attempts
        .iter()
        .filter(|a| a.is_success())
        .reduce(|best, candidate| {
            let (b_reality, b_scores, b_bugs) = heuristic_key(best);
            let (c_reality, c_scores, c_bugs) = heuristic_key(candidate);
            let ordering = c_reality
                .cmp(&b_reality)
                .then(c_scores.cmp(&b_scores))
                .then(b_bugs.cmp(&c_bugs))
                .then(best.branch_index.cmp(&candidate.branch_index));
            if ordering == Ordering::Greater {
                candidate
            } else {
                best
            }
        })?;

    let (_, scores, bugs) = heuristic_key(winner);
    let rationale = format!(
        "Heuristic selection: branch {} ({}) ranked highest among successful executions (reality check {}, combined score {scores}, {bugs} reported bug(s)).",
        winner.branch_index,
        winner.display_name(),
        winner.reality_check(),
    );

    Some(Decision {
        winning_branch_index: winner.branch_index,
        rationale,
        synthesis_advice: attributed_advice(attempts, winner.branch_index),
        winner_flawless: false,
        source: DecisionSource::Heuristic,
        usage: TokenUsage::default(),
    })
}

/// Advice built only from findings recorded in the attempts
fn attributed_advice(attempts: &[Attempt], winner: usize) -> String {
    let mut advice = String::new();
    for attempt in attempts {
        let Some(verification) = &attempt.verification else {
            continue;
        };
        for bug in &verification.bugs {
            let _ = writeln!(
                advice,
                "- branch {} ({}): {bug}",
                attempt.branch_index,
                attempt.display_name()
            );
        }
    }

    if advice.is_empty() {
        format!("No verifier findings were reported; keep branch {winner}'s approach and polish it.")
    } else {
        format!("Address these verifier findings while building on branch {winner}:\n{advice}")
    }
}
