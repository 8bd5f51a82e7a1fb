use anyhow::Context;
use clap::Parser;

use fsreact::Settings;
use fsreact::cli::commands;
use fsreact::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load settings")?;
    cli.apply_overrides(&mut settings);

    let _log_guard = fsreact::logging::init_with_config(&settings.logging, settings.debug);

    match &cli.command {
        Commands::Run { .. } => commands::run::run(&settings).await,
        Commands::Check { .. } => commands::check::run_check(&settings.rules_path),
        Commands::Config => commands::config::run_config(&settings),
    }
}
