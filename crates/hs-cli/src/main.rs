use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hs_cli::commands::{blocks, entries, sync};
use hs_cli::{Cli, Commands, Config, Settings};

/// Load and validate config before any network call.
fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config.settings().context("invalid configuration")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout stays machine-readable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Some(Commands::Sync(args)) => {
            let settings = load_settings(cli.config.as_deref())?;
            sync::run(&mut stdout, args, &settings)?;
        }
        Some(Commands::Entries(args)) => {
            let settings = load_settings(cli.config.as_deref())?;
            entries::run(&mut stdout, args, &settings)?;
        }
        Some(Commands::Blocks(args)) => {
            let settings = load_settings(cli.config.as_deref())?;
            blocks::run(&mut stdout, args, &settings)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
