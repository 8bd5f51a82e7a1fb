//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Settings;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "fsreact",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch directories and react to filesystem events",
    long_about = "Watch the paths listed in a rule file and run a command for every matching \
                  filesystem event, optionally reporting the outcome to a remote endpoint.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a custom settings file (default: ./fsreact.toml)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start watching until interrupted
    #[command(
        about = "Watch the configured paths until Ctrl+C",
        after_help = "Examples:\n  fsreact run\n  fsreact run --rules watch.toml --timeout 30\n  fsreact run --remote 127.0.0.1:8080 --workers 4"
    )]
    Run {
        /// Rule file (.json or .toml, overrides settings)
        #[arg(short, long, value_name = "PATH")]
        rules: Option<PathBuf>,

        /// Remote address receiving reaction reports (overrides settings)
        #[arg(long, value_name = "URL")]
        remote: Option<String>,

        /// Command timeout in seconds, 0 waits forever (overrides settings)
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Worker threads running commands (overrides settings)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Validate a rule file
    #[command(about = "Load and validate the rule file, then list its containers")]
    Check {
        /// Rule file (.json or .toml, overrides settings)
        #[arg(short, long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },

    /// Show current configuration settings
    #[command(about = "Display the effective settings as TOML")]
    Config,
}

impl Cli {
    /// Apply flag overrides on top of loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if self.debug {
            settings.debug = true;
        }

        match &self.command {
            Commands::Run {
                rules,
                remote,
                timeout,
                workers,
            } => {
                if let Some(rules) = rules {
                    settings.rules_path = rules.clone();
                }
                if let Some(remote) = remote {
                    settings.remote.address = Some(remote.clone());
                }
                if let Some(timeout) = timeout {
                    settings.reaction.timeout_secs = *timeout;
                }
                if let Some(workers) = workers {
                    settings.reaction.workers = *workers;
                }
            }
            Commands::Check { rules: Some(rules) } => {
                settings.rules_path = rules.clone();
            }
            Commands::Check { rules: None } | Commands::Config => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_override_settings() {
        let cli = Cli::parse_from([
            "fsreact",
            "run",
            "--rules",
            "rules.toml",
            "--remote",
            "127.0.0.1:8080",
            "--timeout",
            "15",
            "--workers",
            "2",
            "--debug",
        ]);

        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings);

        assert!(settings.debug);
        assert_eq!(settings.rules_path, PathBuf::from("rules.toml"));
        assert_eq!(settings.remote.address.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(settings.reaction.timeout_secs, 15);
        assert_eq!(settings.reaction.workers, 2);
    }

    #[test]
    fn test_check_without_flags_keeps_settings() {
        let cli = Cli::parse_from(["fsreact", "check"]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings);

        assert_eq!(settings, Settings::default());
    }
}
