//! Tribunal CLI entry point.

use clap::Parser;

use tribunal::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => tribunal::cli::commands::run::execute(args, cli.json).await,
        Commands::CheckConfig(args) => {
            tribunal::cli::commands::check_config::execute(args, cli.json).await
        }
    };

    if let Err(err) = result {
        tribunal::cli::handle_error(err, cli.json);
    }
}
