//! Implementation of the `tribunal run` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::Orchestrator;
use crate::cli::output::{output, RunOutput};
use crate::domain::ports::ReportSink;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::infrastructure::persistence::FsReportWriter;
use crate::infrastructure::provider::HttpProviderClient;
use crate::infrastructure::sandbox::CommandSandbox;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Natural-language description of the artifact to produce
    #[arg(long)]
    pub task: String,

    /// Configuration file (defaults to .tribunal/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: RunArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_with(args.config.as_deref())?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let api_key = config
        .provider
        .resolve_api_key()
        .context("No provider API key: set provider.api_key or OPENROUTER_API_KEY")?;
    let client = HttpProviderClient::new(&config.provider, &api_key)?;
    let sandbox = CommandSandbox::from_config(&config.sandbox, &config.artifact.file_extension)
        .context("Sandbox is not usable")?;

    let orchestrator = Orchestrator::new(&config, Arc::new(client), Arc::new(sandbox));
    let writer = FsReportWriter::new(
        config.output.experiments_dir.clone(),
        config.artifact.file_extension.clone(),
    );

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let outcome = orchestrator.run(&args.task, &config.branches, cancel).await;
    interrupt.abort();

    match outcome {
        Ok((_, report)) => {
            let report_dir = writer
                .persist(&report)
                .await
                .context("Failed to persist run report")?;
            info!(path = %report_dir.display(), "Report written");
            output(&RunOutput::success(&report, Some(report_dir)), json_mode);
            Ok(())
        }
        Err(err) => {
            let report_dir = match writer.persist_failure(&args.task, &err).await {
                Ok(dir) => Some(dir),
                Err(persist_err) => {
                    warn!(error = %persist_err, "Failed to persist failure report");
                    None
                }
            };
            output(&RunOutput::failure(&err, report_dir), json_mode);
            anyhow::bail!("Run failed ({}): {err}", err.kind())
        }
    }
}
