mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lywsd02_cli::cli::{Cli, Commands};
use lywsd02_cli::config::{Config, Settings};

use crate::commands::{
    cmd_battery, cmd_clock, cmd_history, cmd_read, cmd_status, cmd_units, open_session,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let settings = Settings::resolve(&cli, &config);
    let format = settings.format;

    let mut session = open_session(&settings).await?;
    let output = match cli.command {
        Commands::Read => cmd_read(&mut session, format).await?,
        Commands::History { from } => cmd_history(&mut session, from, format).await?,
        Commands::Units { action } => cmd_units(&mut session, action, format).await?,
        Commands::Clock { action } => cmd_clock(&mut session, action, format).await?,
        Commands::Battery => cmd_battery(&mut session, format).await?,
        Commands::Status => cmd_status(&mut session, format).await?,
    };

    print!("{}", output);
    Ok(())
}
