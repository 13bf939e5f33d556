//! Common test utilities for integration tests
//!
//! Fixtures for driving full runs against the scripted provider and sandbox.

#![allow(dead_code)]

use std::sync::Arc;

use tribunal::application::Orchestrator;
use tribunal::domain::models::{BranchConfig, Config, ModelDescriptor, RetryConfig};
use tribunal::domain::ports::{ProviderClient, SandboxExecutor};
use tribunal::infrastructure::mock::{ScriptedProvider, ScriptedSandbox};

pub const VERIFIER: &str = "verifier";
pub const JUDGE: &str = "judge";
pub const FALLBACK: &str = "fallback";

/// Verifier verdict used when a test does not care about scores
pub const NEUTRAL_VERDICT: &str = r#"{"score_logic": 7, "score_visual": 7, "found_bugs": [], "reality_check": "pass", "critique_text": "fine"}"#;

/// Synthesis reply with code and a non-empty improvement list
pub const SYNTHESIS_REPLY: &str = "<thought>keep the loop, add trails</thought>\n```html\n<html><body>final</body></html>\n```\n<improvements>\n- added motion trails\n- clamped the time step\n</improvements>";

/// Configuration with one branch per model id, a vision verifier, a judge and a fallback
pub fn config(models: &[&str]) -> Config {
    Config {
        branches: models.iter().map(|m| BranchConfig::new(*m)).collect(),
        verifier_model: Some(ModelDescriptor::new(VERIFIER).with_vision(true)),
        judge_model: ModelDescriptor::new(JUDGE),
        synthesizer_fallback_model: Some(ModelDescriptor::new(FALLBACK)),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..Config::default()
    }
}

/// Generation reply whose code carries `marker` so sandbox rules can target it
pub fn generation_reply(marker: &str) -> String {
    format!(
        "<thought>Drive the loop with `requestAnimationFrame`.</thought>\n```html\n<html><script>/* {marker} */ function step() {{ requestAnimationFrame(step); }}</script></html>\n```"
    )
}

pub fn judge_reply(scores: &[(usize, f64)], advice: &str) -> String {
    let scores: Vec<serde_json::Value> = scores
        .iter()
        .map(|(index, score)| serde_json::json!({"branch_index": index, "score": score}))
        .collect();
    serde_json::json!({
        "scores": scores,
        "reasoning": "scored on correctness and polish",
        "synthesis_advice": advice,
        "winner_flawless": false,
    })
    .to_string()
}

pub fn orchestrator(
    config: &Config,
    provider: &Arc<ScriptedProvider>,
    sandbox: &Arc<ScriptedSandbox>,
) -> Orchestrator {
    let client: Arc<dyn ProviderClient> = provider.clone();
    let executor: Arc<dyn SandboxExecutor> = sandbox.clone();
    Orchestrator::new(config, client, executor)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
