use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::{Attempt, TokenUsage};

/// How the judge reached its decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Scores came from the judge model
    JudgeModel,
    /// Judge model failed; deterministic ranking over verifier findings
    Heuristic,
}

/// Judge output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Index of an attempt with a successful execution
    pub winning_branch_index: usize,
    pub rationale: String,
    pub synthesis_advice: String,
    /// Judge considered the winner free of defects
    #[serde(default)]
    pub winner_flawless: bool,
    pub source: DecisionSource,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Final stage output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub final_code: String,
    /// Model that produced `final_code`
    pub model_used: String,
    /// True when the winning model failed and the fallback model was used
    pub used_fallback: bool,
    /// Ordered account of deltas versus the winning attempt's code
    pub applied_improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_plan: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Everything a run produced, handed to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every attempt, ordered by branch index
    pub attempts: Vec<Attempt>,
    pub decision: Decision,
    pub synthesis: SynthesisResult,
}

impl Report {
    /// Attempt chosen by the judge
    pub fn winner(&self) -> Option<&Attempt> {
        self.attempts
            .iter()
            .find(|a| a.branch_index == self.decision.winning_branch_index)
    }

    /// Tokens spent across all stages
    pub fn total_usage(&self) -> TokenUsage {
        self.attempts
            .iter()
            .fold(TokenUsage::default(), |acc, a| acc.add(a.usage))
            .add(self.decision.usage)
            .add(self.synthesis.usage)
    }
}
