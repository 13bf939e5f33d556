//! Implementation of the `tribunal check-config` command.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Configuration file (defaults to .tribunal/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct CheckConfigOutput {
    pub valid: bool,
    pub api_key_present: bool,
    pub sandbox_command: Option<String>,
    pub config: Config,
}

impl CheckConfigOutput {
    pub fn new(mut config: Config) -> Self {
        let api_key_present = config.provider.resolve_api_key().is_some();
        if config.provider.api_key.is_some() {
            config.provider.api_key = Some("***".to_string());
        }
        let sandbox_command = config.sandbox.command.first().cloned();
        Self {
            valid: true,
            api_key_present,
            sandbox_command,
            config,
        }
    }
}

impl CommandOutput for CheckConfigOutput {
    fn to_human(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Stage").add_attribute(Attribute::Bold),
                Cell::new("Model").add_attribute(Attribute::Bold),
                Cell::new("Vision").add_attribute(Attribute::Bold),
                Cell::new("Temperature").add_attribute(Attribute::Bold),
            ]);

        for (index, branch) in self.config.branches.iter().enumerate() {
            let stage = branch
                .label
                .as_ref()
                .map_or_else(|| format!("branch {index}"), |l| format!("branch {index} ({l})"));
            table.add_row(vec![
                Cell::new(stage),
                Cell::new(&branch.model.id),
                Cell::new(branch.model.supports_vision),
                Cell::new(branch.temperature),
            ]);
        }
        if let Some(verifier) = &self.config.verifier_model {
            table.add_row(vec![
                Cell::new("verifier"),
                Cell::new(&verifier.id),
                Cell::new(verifier.supports_vision),
                Cell::new(self.config.verifier_temperature),
            ]);
        }
        table.add_row(vec![
            Cell::new("judge"),
            Cell::new(&self.config.judge_model.id),
            Cell::new(self.config.judge_model.supports_vision),
            Cell::new(self.config.judge_temperature),
        ]);
        if let Some(fallback) = &self.config.synthesizer_fallback_model {
            table.add_row(vec![
                Cell::new("synthesis fallback"),
                Cell::new(&fallback.id),
                Cell::new(fallback.supports_vision),
                Cell::new(self.config.synthesizer_temperature),
            ]);
        }

        let mut lines = vec!["Configuration is valid".to_string(), table.to_string()];
        lines.push(format!(
            "API key: {}",
            if self.api_key_present { "present" } else { "missing" }
        ));
        lines.push(format!(
            "Sandbox command: {}",
            self.sandbox_command.as_deref().unwrap_or("not configured")
        ));
        lines.push(format!(
            "Reports: {}",
            self.config.output.experiments_dir.display()
        ));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CheckConfigArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_with(args.config.as_deref())?;
    output(&CheckConfigOutput::new(config), json_mode);
    Ok(())
}
