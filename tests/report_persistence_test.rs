//! Run reports written to disk after full pipeline runs

mod common;

use std::sync::Arc;

use common::{config, generation_reply, judge_reply, orchestrator, JUDGE, NEUTRAL_VERDICT, SYNTHESIS_REPLY, VERIFIER};
use tokio_util::sync::CancellationToken;
use tribunal::domain::ports::{ReportSink, SandboxStatus};
use tribunal::infrastructure::mock::{ScriptedProvider, ScriptedSandbox};
use tribunal::infrastructure::persistence::FsReportWriter;

#[tokio::test]
async fn test_successful_run_bundle_layout() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["openai/gpt-4o", "google/gemini-pro"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text("openai/gpt-4o", generation_reply("branch-a"));
    provider.push_text("google/gemini-pro", generation_reply("branch-b"));
    provider.push_text("google/gemini-pro", SYNTHESIS_REPLY);
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    provider.push_text(JUDGE, judge_reply(&[(0, 5.0), (1, 9.0)], "polish"));
    sandbox.when_code_contains("branch-a", SandboxStatus::Timeout);

    let (_, report) = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap();

    let writer = FsReportWriter::new(dir.path(), "html");
    let run_dir = writer.persist(&report).await.unwrap();

    assert!(run_dir.starts_with(dir.path()));
    assert_eq!(
        std::fs::read_to_string(run_dir.join("final.html")).unwrap(),
        "<html><body>final</body></html>"
    );

    let timed_out = run_dir.join("branch_0_openai_gpt-4o");
    assert!(timed_out.join("code.html").exists());
    assert!(timed_out.join("raw_output.txt").exists());
    assert!(!timed_out.join("snapshot.jpg").exists());

    let winner = run_dir.join("branch_1_google_gemini-pro");
    assert!(winner.join("snapshot.jpg").exists());
    assert!(winner.join("verification.json").exists());
    assert_eq!(
        std::fs::read_to_string(winner.join("execution.log")).unwrap(),
        "[LOG] rendered"
    );

    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("report.json")).unwrap())
            .unwrap();
    assert_eq!(document["decision"]["winning_branch_index"], 1);
    assert_eq!(document["attempts"].as_array().unwrap().len(), 2);
    assert_eq!(document["synthesis"]["model_used"], "google/gemini-pro");
}

#[tokio::test]
async fn test_failed_run_still_persists_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&["gen-a", "gen-b"]);
    let provider = Arc::new(ScriptedProvider::new());
    let sandbox = Arc::new(ScriptedSandbox::new());

    provider.push_text("gen-a", generation_reply("branch-a"));
    provider.push_text("gen-b", generation_reply("branch-b"));
    provider.always_text(VERIFIER, NEUTRAL_VERDICT);
    sandbox.when_code_contains("<html>", SandboxStatus::RuntimeError);

    let err = orchestrator(&config, &provider, &sandbox)
        .run("Draw a bouncing ball", &config.branches, CancellationToken::new())
        .await
        .unwrap_err();

    let writer = FsReportWriter::new(dir.path(), "html");
    let run_dir = writer.persist_failure("Draw a bouncing ball", &err).await.unwrap();

    assert!(!run_dir.join("final.html").exists());
    assert!(run_dir.join("branch_0_gen-a").join("attempt.json").exists());
    assert!(run_dir.join("branch_1_gen-b").join("attempt.json").exists());

    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("report.json")).unwrap())
            .unwrap();
    assert_eq!(document["error_kind"], "no_viable_candidate");
    assert_eq!(document["task"], "Draw a bouncing ball");
    assert!(document.get("decision").is_none() || document["decision"].is_null());
}
