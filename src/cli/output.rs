//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::error::RunError;
use crate::domain::models::{Attempt, ExecutionStatus, RealityCheck, Report, TokenUsage};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// One table row per branch
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRow {
    pub branch_index: usize,
    pub model: String,
    pub status: ExecutionStatus,
    pub reality_check: RealityCheck,
    pub logic_score: Option<u8>,
    pub visual_score: Option<u8>,
    pub bugs: usize,
    pub generation_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Attempt> for AttemptRow {
    fn from(attempt: &Attempt) -> Self {
        let verification = attempt.verification.as_ref();
        Self {
            branch_index: attempt.branch_index,
            model: attempt.display_name().to_string(),
            status: attempt.execution_status,
            reality_check: attempt.reality_check(),
            logic_score: verification.map(|v| v.logic_score),
            visual_score: verification.and_then(|v| v.visual_score),
            bugs: verification.map_or(0, |v| v.bugs.len()),
            generation_attempts: attempt.generation_attempts,
            error: attempt.branch_error.as_ref().map(ToString::to_string),
        }
    }
}

/// Result of `tribunal run`, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub used_fallback: bool,
    pub applied_improvements: Vec<String>,
    pub usage: TokenUsage,
    pub attempts: Vec<AttemptRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

impl RunOutput {
    pub fn success(report: &Report, report_dir: Option<PathBuf>) -> Self {
        Self {
            run_id: Some(report.run_id),
            succeeded: true,
            error_kind: None,
            error: None,
            winner: Some(report.decision.winning_branch_index),
            rationale: Some(report.decision.rationale.clone()),
            model_used: Some(report.synthesis.model_used.clone()),
            used_fallback: report.synthesis.used_fallback,
            applied_improvements: report.synthesis.applied_improvements.clone(),
            usage: report.total_usage(),
            attempts: report.attempts.iter().map(AttemptRow::from).collect(),
            report_dir,
        }
    }

    pub fn failure(error: &RunError, report_dir: Option<PathBuf>) -> Self {
        let (winner, rationale) = match error {
            RunError::Synthesis { decision, .. } => (
                Some(decision.winning_branch_index),
                Some(decision.rationale.clone()),
            ),
            _ => (None, None),
        };
        let usage = error
            .attempts()
            .iter()
            .fold(TokenUsage::default(), |acc, a| acc.add(a.usage));
        Self {
            run_id: None,
            succeeded: false,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            winner,
            rationale,
            model_used: None,
            used_fallback: false,
            applied_improvements: vec![],
            usage,
            attempts: error.attempts().iter().map(AttemptRow::from).collect(),
            report_dir,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![attempts_table(&self.attempts, self.winner), String::new()];

        if self.succeeded {
            if let Some(winner) = self.winner {
                lines.push(format!("{} branch {winner}", style("Winner:").bold().green()));
            }
            if let Some(rationale) = &self.rationale {
                lines.push(format!("  {}", truncate(rationale, 200)));
            }
            if let Some(model) = &self.model_used {
                let fallback = if self.used_fallback { " (fallback)" } else { "" };
                lines.push(format!("{} {model}{fallback}", style("Synthesized by:").bold()));
            }
            if self.applied_improvements.is_empty() {
                lines.push("No changes applied to the winning code".to_string());
            } else {
                lines.push(style("Improvements:").bold().to_string());
                for improvement in &self.applied_improvements {
                    lines.push(format!("  - {improvement}"));
                }
            }
        } else {
            lines.push(format!(
                "{} {}",
                style("Run failed:").bold().red(),
                self.error.as_deref().unwrap_or("unknown error")
            ));
        }

        lines.push(format!(
            "Tokens: {} in / {} out",
            self.usage.input_tokens, self.usage.output_tokens
        ));
        if let Some(dir) = &self.report_dir {
            lines.push(format!("Report: {}", dir.display()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Per-branch summary table
pub fn attempts_table(rows: &[AttemptRow], winner: Option<usize>) -> String {
    let use_colors = console::colors_enabled();
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Model").add_attribute(Attribute::Bold),
        Cell::new("Execution").add_attribute(Attribute::Bold),
        Cell::new("Reality").add_attribute(Attribute::Bold),
        Cell::new("Logic").add_attribute(Attribute::Bold),
        Cell::new("Visual").add_attribute(Attribute::Bold),
        Cell::new("Bugs").add_attribute(Attribute::Bold),
        Cell::new("Calls").add_attribute(Attribute::Bold),
        Cell::new("Error").add_attribute(Attribute::Bold),
    ]);

    for row in rows {
        let index = if winner == Some(row.branch_index) {
            format!("{} *", row.branch_index)
        } else {
            row.branch_index.to_string()
        };
        let mut status = Cell::new(row.status.to_string());
        let mut reality = Cell::new(row.reality_check.to_string());
        if use_colors {
            status = status.fg(status_color(row.status));
            reality = reality.fg(reality_color(row.reality_check));
        }

        table.add_row(vec![
            Cell::new(index),
            Cell::new(truncate(&row.model, 40)),
            status,
            reality,
            Cell::new(score(row.logic_score)),
            Cell::new(score(row.visual_score)),
            Cell::new(row.bugs),
            Cell::new(row.generation_attempts),
            Cell::new(row.error.as_deref().map_or_else(|| "-".to_string(), |e| truncate(e, 60))),
        ]);
    }

    table.to_string()
}

fn score(value: Option<u8>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

const fn status_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Success => Color::Green,
        ExecutionStatus::RuntimeError => Color::Yellow,
        ExecutionStatus::Timeout => Color::Magenta,
        ExecutionStatus::NotExecuted => Color::Red,
    }
}

const fn reality_color(check: RealityCheck) -> Color {
    match check {
        RealityCheck::Pass => Color::Green,
        RealityCheck::Fail => Color::Red,
        RealityCheck::NotApplicable => Color::DarkGrey,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BranchError;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_failure_output_names_condition() {
        let error = RunError::NoViableCandidate {
            attempts: vec![Attempt::not_executed(
                0,
                "m",
                Some("alpha".to_string()),
                BranchError::Parse {
                    message: "no code block".to_string(),
                },
            )],
        };

        let output = RunOutput::failure(&error, None);
        let json = output.to_json();
        assert_eq!(json["succeeded"], false);
        assert_eq!(json["error_kind"], "no_viable_candidate");
        assert_eq!(json["attempts"][0]["model"], "alpha");
        assert!(output.to_human().contains("Run failed"));
    }

    #[test]
    fn test_table_marks_winner() {
        let rows = vec![AttemptRow {
            branch_index: 2,
            model: "openai/gpt-4o".to_string(),
            status: ExecutionStatus::Success,
            reality_check: RealityCheck::Pass,
            logic_score: Some(9),
            visual_score: None,
            bugs: 1,
            generation_attempts: 1,
            error: None,
        }];
        let table = attempts_table(&rows, Some(2));
        assert!(table.contains("2 *"));
        assert!(table.contains("openai/gpt-4o"));
    }
}
