//! pour - install an application from a formula

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pour_cli::ops::Context;
use pour_cli::ui::Output;
use pour_cli::{Cli, Commands, cmd};
use pour_core::{Layout, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr alongside status lines; quiet unless RUST_LOG is set.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }
    if let Commands::Hash { files } = &cli.command {
        return cmd::hash::hash(files);
    }

    let layout = match &cli.home {
        Some(home) => Layout::new(home),
        None => Layout::from_env(),
    }
    .context("Failed to resolve the pour home directory")?;
    let settings = Settings::for_layout(&layout)?;
    let client = settings
        .http_client()
        .context("Failed to build HTTP client")?;
    let output = Output::new(cli.quiet);
    let ctx = Context::new(layout, settings, client, Arc::new(output.clone()));

    match cli.command {
        Commands::Install { formulas, force } => {
            cmd::install::install(&ctx, &output, &formulas, force, dry_run).await
        }
        Commands::Uninstall { packages } => {
            cmd::uninstall::uninstall(&ctx, &output, &packages, dry_run).await
        }
        Commands::Use { spec } => cmd::r#use::use_package(&ctx, &output, &spec, dry_run).await,
        Commands::Pin { spec } => cmd::pin::pin(&ctx, &output, &spec, dry_run).await,
        Commands::Unpin { package } => cmd::pin::unpin(&ctx, &output, &package, dry_run).await,
        Commands::List => cmd::list::list(&ctx),
        Commands::Info { package } => cmd::info::info(&ctx, &package),
        Commands::History { package } => cmd::history::history(&ctx, &output, &package),
        Commands::Clean => cmd::clean::clean(&ctx, &output, dry_run),
        Commands::Hash { .. } | Commands::Completions { .. } => Ok(()),
    }
}
