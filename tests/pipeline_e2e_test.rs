//! End-to-end pipeline tests against scripted collaborators
//!
//! Each test drives a full run through the orchestrator: fan-out, sandbox
//! execution, verification, judging and synthesis.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    config, generation_reply, judge_reply, orchestrator, setup_test_logging, FALLBACK, JUDGE,
    NEUTRAL_VERDICT, SYNTHESIS_REPLY, VERIFIER,
};
use tokio_util::sync::CancellationToken;
use tribunal::domain::models::{BranchError, DecisionSource, ExecutionStatus, RealityCheck};
use tribunal::domain::ports::SandboxStatus;
use tribunal::domain::{ProviderError, RunError};
use tribunal::infrastructure::mock::{ScriptedProvider, ScriptedSandbox};

#[tokio::test]
async fn test_full_run_survives_one_timed_out_branch() {
    setup_test_logging();
    let config = config(&["gen-a", "gen-b", "gen-c"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    for (model, marker) in [("gen-a", "branch-a"), ("gen-b", "branch-b"), ("gen-c", "branch-c")] {
        provider.push_text(model, generation_reply(marker));
    }
    provider.push_text("gen-c", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 7.0), (2, 9.0)], "borrow the trails from branch 0"));
    sandbox.when_code_contains("branch-b", SandboxStatus::Timeout);

    let (result, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempts.len(), 3);
    let indices: Vec<usize> = report.attempts.iter().map(|a| a.branch_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(report.attempts[1].execution_status, ExecutionStatus::Timeout);
    assert!(report.attempts[1].snapshot.is_none());

    assert_eq!(report.decision.winning_branch_index, 2);
    assert_eq!(report.decision.source, DecisionSource::JudgeModel);
    assert_eq!(result.model_used, "gen-c");
    assert!(!result.used_fallback);
    assert_eq!(result.final_code, "<html><body>final</body></html>");
    assert_eq!(
        result.applied_improvements,
        vec!["added motion trails", "clamped the time step"]
    );

    assert_eq!(provider.calls_for("gen-c"), 2);
    assert_eq!(provider.calls_for(FALLBACK), 0);
    assert_eq!(provider.calls_for(JUDGE), 1);
    assert_eq!(provider.calls_for(VERIFIER), 3);
    assert_eq!(sandbox.call_count(), 3);
}

#[tokio::test]
async fn test_branches_never_see_each_other() {
    let config = config(&["gen-a", "gen-b", "gen-c"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    for (model, marker) in [("gen-a", "branch-a"), ("gen-b", "branch-b"), ("gen-c", "branch-c")] {
        provider.push_text(model, generation_reply(marker));
    }
    provider.push_text("gen-a", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 9.0), (1, 8.0), (2, 8.0)], "polish"));

    orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    let markers = ["branch-a", "branch-b", "branch-c"];
    for model in ["gen-a", "gen-b", "gen-c"] {
        let generation = &provider.requests_for(model)[0];
        for marker in markers {
            assert!(!generation.prompt.contains(marker));
        }
    }

    let verifications = provider.requests_for(VERIFIER);
    assert_eq!(verifications.len(), 3);
    for request in &verifications {
        let visible: Vec<&str> = markers
            .iter()
            .copied()
            .filter(|m| request.prompt.contains(m))
            .collect();
        assert_eq!(visible.len(), 1, "verifier saw {visible:?}");
        assert_eq!(request.vision_inputs.len(), 1);
    }

    // The reduction stages see every attempt
    let judge = &provider.requests_for(JUDGE)[0];
    let synthesis = &provider.requests_for("gen-a")[1];
    for marker in markers {
        assert!(judge.prompt.contains(marker));
        assert!(synthesis.prompt.contains(marker));
    }
}

#[tokio::test]
async fn test_no_successful_execution_is_no_viable_candidate() {
    let config = config(&["gen-a", "gen-b", "gen-c"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text("gen-a", generation_reply("branch-a"));
    provider.push_text("gen-b", generation_reply("branch-b"));
    provider.push_text("gen-c", "I cannot help with that.");
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    sandbox.when_code_contains("branch-a", SandboxStatus::RuntimeError);
    sandbox.when_code_contains("branch-b", SandboxStatus::Timeout);

    let err = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap_err();

    let RunError::NoViableCandidate { attempts } = &err else {
        panic!("expected NoViableCandidate, got {err:?}");
    };
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].execution_status, ExecutionStatus::RuntimeError);
    assert_eq!(attempts[1].execution_status, ExecutionStatus::Timeout);
    assert_eq!(attempts[2].execution_status, ExecutionStatus::NotExecuted);
    assert!(matches!(attempts[2].branch_error, Some(BranchError::Parse { .. })));

    assert_eq!(provider.calls_for(JUDGE), 0);
    assert_eq!(provider.calls_for(FALLBACK), 0);
    for model in ["gen-a", "gen-b", "gen-c"] {
        assert_eq!(provider.calls_for(model), 1);
    }
    assert_eq!(sandbox.call_count(), 2);
}

#[tokio::test]
async fn test_unavailable_winner_falls_back_exactly_once() {
    let config = config(&["gen-a", "gen-b"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text("gen-a", generation_reply("branch-a"));
    provider.always_error("gen-a", ProviderError::Unavailable("model offline".to_string()));
    provider.push_text("gen-b", generation_reply("branch-b"));
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 9.0), (1, 6.0)], "tighten the bounce"));
    provider.push_text(FALLBACK, SYNTHESIS_REPLY);

    let (result, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.decision.winning_branch_index, 0);
    assert!(result.used_fallback);
    assert_eq!(result.model_used, FALLBACK);
    assert!(!result.applied_improvements.is_empty());

    // Unavailable is not retried: one generation call plus one synthesis call
    assert_eq!(provider.calls_for("gen-a"), 2);
    assert_eq!(provider.calls_for(FALLBACK), 1);
}

#[tokio::test]
async fn test_exhausted_synthesis_keeps_decision_and_attempts() {
    let config = config(&["gen-a"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text("gen-a", generation_reply("branch-a"));
    provider.always_error("gen-a", ProviderError::AuthError("key revoked".to_string()));
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 8.0)], "ship it"));
    provider.push_text(FALLBACK, "no code here");

    let err = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "synthesis_error");
    let RunError::Synthesis { decision, attempts, .. } = &err else {
        panic!("expected Synthesis, got {err:?}");
    };
    assert_eq!(decision.winning_branch_index, 0);
    assert_eq!(attempts.len(), 1);
    assert_eq!(provider.calls_for(FALLBACK), 1);
}

#[tokio::test]
async fn test_retry_accounting_per_branch() {
    let config = config(&["gen-a", "gen-b"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_error("gen-a", ProviderError::RateLimited("429".to_string()));
    provider.push_error("gen-a", ProviderError::ServerError("502".to_string()));
    provider.push_text("gen-a", generation_reply("branch-a"));
    provider.push_text("gen-a", SYNTHESIS_REPLY);
    provider.push_error("gen-b", ProviderError::AuthError("401".to_string()));
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 8.0)], "polish"));

    let (_, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempts[0].generation_attempts, 3);
    assert_eq!(report.attempts[0].execution_status, ExecutionStatus::Success);

    assert_eq!(report.attempts[1].generation_attempts, 1);
    assert_eq!(report.attempts[1].execution_status, ExecutionStatus::NotExecuted);
    assert!(matches!(
        report.attempts[1].branch_error,
        Some(BranchError::Provider { attempts: 1, .. })
    ));
    assert_eq!(sandbox.call_count(), 1);
}

#[tokio::test]
async fn test_judge_outage_picks_lowest_index_among_equals() {
    let config = config(&["gen-a", "gen-b", "gen-c"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    for (model, marker) in [("gen-a", "branch-a"), ("gen-b", "branch-b"), ("gen-c", "branch-c")] {
        provider.push_text(model, generation_reply(marker));
    }
    provider.push_text("gen-b", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.always_error(JUDGE, ProviderError::Unavailable("judge offline".to_string()));
    sandbox.when_code_contains("branch-a", SandboxStatus::RuntimeError);

    let (result, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.decision.source, DecisionSource::Heuristic);
    assert_eq!(report.decision.winning_branch_index, 1);
    assert_eq!(result.model_used, "gen-b");
    assert_eq!(provider.calls_for(JUDGE), 1);
}

#[tokio::test]
async fn test_reality_check_separates_claims_from_code() {
    let config = config(&["gen-a", "gen-b"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text(
        "gen-a",
        "<thought>Physics update using `Verlet` integration.</thought>\n```html\n<html><script>p.x += p.vx * dt;</script></html>\n```",
    );
    provider.push_text("gen-b", generation_reply("branch-b"));
    provider.push_text("gen-b", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.always_error(JUDGE, ProviderError::Unavailable("judge offline".to_string()));

    let (_, report) = orchestrator(&config, &provider, &sandbox)
        .run("Simulate a pendulum", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    let dishonest = &report.attempts[0];
    assert_eq!(dishonest.reality_check(), RealityCheck::Fail);
    let verification = dishonest.verification.as_ref().unwrap();
    assert!(verification
        .bugs
        .iter()
        .any(|bug| bug.contains("declared mechanism 'Verlet'")));

    assert_eq!(report.attempts[1].reality_check(), RealityCheck::Pass);
    assert_eq!(report.decision.winning_branch_index, 1);
    assert!(report.decision.synthesis_advice.contains("Verlet"));
}

#[tokio::test]
async fn test_cancellation_before_barrier() {
    let config = config(&["gen-a", "gen-b"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_delayed_text("gen-a", generation_reply("branch-a"), Duration::from_secs(30));
    provider.push_text("gen-b", generation_reply("branch-b"));
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator(&config, &provider, &sandbox).run("Draw", &config.branches, cancel),
    )
    .await
    .expect("cancellation must end the run promptly")
    .unwrap_err();

    let RunError::Cancelled { attempts } = &err else {
        panic!("expected Cancelled, got {err:?}");
    };
    assert_eq!(attempts.len(), 2);
    assert!(matches!(
        attempts[0].branch_error,
        Some(BranchError::Cancelled { .. })
    ));
    assert_eq!(attempts[1].execution_status, ExecutionStatus::Success);
    assert_eq!(provider.calls_for(JUDGE), 0);
}

#[tokio::test]
async fn test_branch_panic_is_isolated() {
    let config = config(&["gen-a", "gen-b", "gen-c"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    for (model, marker) in [("gen-a", "branch-a"), ("gen-b", "branch-b"), ("gen-c", "branch-c")] {
        provider.push_text(model, generation_reply(marker));
    }
    provider.push_text("gen-a", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 9.0), (2, 7.0)], "polish"));
    sandbox.panic_when_code_contains("branch-b", "renderer exploded");

    let (result, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.attempts.len(), 3);
    match &report.attempts[1].branch_error {
        Some(BranchError::Crashed { message }) => assert!(message.contains("renderer exploded")),
        other => panic!("expected Crashed, got {other:?}"),
    }
    assert_eq!(report.attempts[1].execution_status, ExecutionStatus::NotExecuted);
    assert_eq!(result.model_used, "gen-a");
}
