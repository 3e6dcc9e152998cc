//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use halide_client::ClusterPolicy;
use tracing_subscriber::EnvFilter;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let ctx = commands::Context {
        output_format: cli.output.unwrap_or_default(),
        policy: ClusterPolicy::from_env(),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Bootstrap(args) => commands::bootstrap::execute(ctx, args).await,
        Commands::Policy => commands::policy::execute(&ctx),
        Commands::Nodes(args) => commands::nodes::execute(&ctx, args),
    }
}

/// Log to stderr so structured output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
