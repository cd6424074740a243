use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gator::commands::{dispatch, AppContext, Cli};
use gator::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gator=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path().context("Failed to locate config file")?,
    };

    let mut ctx = AppContext::open(config_path.clone())
        .await
        .with_context(|| format!("Failed to start with config '{}'", config_path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    dispatch(&mut ctx, cli.command, &mut out).await?;

    Ok(())
}
