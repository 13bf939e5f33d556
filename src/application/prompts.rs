//! Prompt assembly for every pipeline stage
//!
//! Wording here is policy; the structural contract is which data reaches which
//! stage. Generation sees only the task. Verification sees only its own branch.
//! Judge and synthesizer see every attempt in full, ordered by branch index.

use std::fmt::Write;

use crate::domain::models::{Attempt, Decision};

pub const GENERATOR_SYSTEM: &str = "You are an expert engineer producing a single self-contained artifact.
First explain your approach inside <thought>...</thought>, naming the concrete mechanisms (algorithms, update rules, APIs) you use.
Then output the complete artifact in exactly one fenced code block tagged with its language.";

pub const VERIFIER_SYSTEM: &str = "You are a strict QA reviewer.
You receive a task, a candidate's declared plan, its code, its execution status and logs, and possibly a screenshot.
Check whether the code really implements the mechanisms the plan claims.
Reply with a JSON object:
{\"score_logic\": 0-10, \"score_visual\": 0-10, \"found_bugs\": [\"...\"], \"reality_check\": \"pass\" | \"fail\", \"critique_text\": \"...\"}";

pub const JUDGE_SYSTEM: &str = "You are the judge of a competition between independent candidates solving the same task.
Only candidates whose execution status is success may win.
Score each eligible candidate from 0 to 10 and cite concrete observations from the inputs; never invent findings.
Reply with a JSON object:
{\"scores\": [{\"branch_index\": 0, \"score\": 0}], \"best_branch_index\": 0, \"reasoning\": \"...\", \"synthesis_advice\": \"...\", \"winner_flawless\": false}";

pub const SYNTHESIZER_SYSTEM: &str = "You won the competition. Produce the final artifact.
Start from your winning code, fix the reported defects and adopt the best ideas of the other candidates as the judge advises.
Output <thought>...</thought>, then the complete artifact in one fenced code block tagged with its language, then
<improvements>
- one line per concrete change versus your winning code
</improvements>";

const RULE: &str = "====================================================================";

/// Generation prompt: the task and the expected artifact language, nothing else
pub fn generation_prompt(task: &str, language: &str) -> String {
    format!("TASK:\n{task}\n\nDeliver the artifact as a ```{language} block.")
}

/// Verification prompt for one branch's own attempt
pub fn verification_prompt(task: &str, attempt: &Attempt) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "USER_TASK:\n{task}\n");
    let _ = writeln!(
        prompt,
        "=== DECLARED_PLAN ===\n{}\n",
        attempt.declared_plan.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(
        prompt,
        "=== CODE ===\n{}\n",
        attempt.code.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(prompt, "=== EXECUTION_STATUS ===\n{}\n", attempt.execution_status);
    let _ = writeln!(prompt, "=== EXECUTION_LOG ===\n{}\n", log_text(attempt));
    if attempt.is_success() {
        prompt.push_str("A screenshot of the result is attached when the model supports images.\n");
    } else {
        prompt.push_str(
            "Execution did not succeed: score logic from the plan and code alone and set score_visual to 0.\n",
        );
    }
    prompt
}

/// Judge prompt with every attempt rendered in full
pub fn judge_prompt(task: &str, attempts: &[Attempt]) -> String {
    let mut prompt = format!("ORIGINAL TASK:\n{task}\n");
    for attempt in attempts {
        prompt.push_str(&render_attempt(attempt, None));
    }
    let eligible: Vec<String> = attempts
        .iter()
        .filter(|a| a.is_success())
        .map(|a| a.branch_index.to_string())
        .collect();
    let _ = write!(
        prompt,
        "\n{RULE}\nEligible branch indices: [{}]\n",
        eligible.join(", ")
    );
    prompt
}

/// Synthesis prompt with every attempt in full plus the judge's decision
pub fn synthesis_prompt(task: &str, decision: &Decision, attempts: &[Attempt]) -> String {
    let winner = decision.winning_branch_index;
    let mut prompt = format!("{RULE}\nORIGINAL TASK:\n{RULE}\n{task}\n");
    for attempt in attempts {
        prompt.push_str(&render_attempt(attempt, Some(winner)));
    }
    let _ = write!(
        prompt,
        "\n{RULE}\nJUDGE'S DECISION\n{RULE}\nWinner: branch {winner}\nReasoning: {}\n\nSynthesis advice:\n{}\n",
        decision.rationale, decision.synthesis_advice
    );
    prompt
}

fn render_attempt(attempt: &Attempt, winner: Option<usize>) -> String {
    let mut block = String::new();
    let marker = if winner == Some(attempt.branch_index) {
        " [WINNER]"
    } else {
        ""
    };
    let _ = writeln!(
        block,
        "\n{RULE}\nBRANCH #{}{marker} | MODEL: {}\n{RULE}",
        attempt.branch_index,
        attempt.display_name()
    );
    let _ = writeln!(block, "Execution status: {}", attempt.execution_status);
    if let Some(error) = &attempt.branch_error {
        let _ = writeln!(block, "Branch error: {error}");
    }
    let _ = writeln!(
        block,
        "Snapshot: {}",
        if attempt.snapshot.is_some() {
            "captured"
        } else {
            "none"
        }
    );
    let _ = writeln!(
        block,
        "\n--- DECLARED PLAN ---\n{}",
        attempt.declared_plan.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(
        block,
        "\n--- CODE ---\n{}",
        attempt.code.as_deref().unwrap_or("(no code)")
    );
    let _ = writeln!(block, "\n--- EXECUTION LOG ---\n{}", log_text(attempt));
    match &attempt.verification {
        Some(v) => {
            let visual = v
                .visual_score
                .map_or_else(|| "n/a".to_string(), |s| format!("{s}/10"));
            let bugs = if v.bugs.is_empty() {
                "none reported".to_string()
            } else {
                v.bugs.join("; ")
            };
            let _ = writeln!(
                block,
                "\n--- VERIFICATION ---\nLogic score: {}/10\nVisual score: {visual}\nReality check: {}\nBugs: {bugs}\nCritique:\n{}",
                v.logic_score, v.reality_check, v.critique
            );
            if !v.unsupported_claims.is_empty() {
                let _ = writeln!(
                    block,
                    "Claims with no trace in code or logs: {}",
                    v.unsupported_claims.join("; ")
                );
            }
        }
        None => block.push_str("\n--- VERIFICATION ---\nnot performed\n"),
    }
    block
}

fn log_text(attempt: &Attempt) -> String {
    match &attempt.execution_log {
        Some(lines) if !lines.is_empty() => lines.join("\n"),
        Some(_) => "(empty)".to_string(),
        None => "(not captured)".to_string(),
    }
}
