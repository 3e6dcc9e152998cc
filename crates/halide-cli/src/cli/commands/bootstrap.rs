//! `halide bootstrap` - Run node bootstrap once.

use anyhow::{Context as _, Result};
use colored::Colorize;
use halide_client::JwksCache;
use halide_node::{init_config, NodeConfig, ThemeStatus};

use super::Context;
use crate::cli::args::BootstrapArgs;

pub async fn execute(ctx: Context, args: BootstrapArgs) -> Result<()> {
    let mut config = NodeConfig::load(&args.config)
        .with_context(|| format!("failed to load options from {}", args.config.display()))?
        .with_app("halide", env!("CARGO_PKG_VERSION"));

    let keys = JwksCache::new();
    let report = init_config(&mut config, ctx.policy, &keys).await;

    if ctx.output_format.print_structured(&report)? {
        return Ok(());
    }

    println!("{}", "Cluster Bootstrap".bold().underline());
    println!();

    if let Some(reason) = &report.skipped {
        println!("{}: {}", "Skipped".bold(), reason.to_string().yellow());
        return Ok(());
    }

    match (&report.node_uuid, &report.registration_error) {
        (Some(uuid), _) => println!("{}: {} ({})", "Registration".bold(), "ok".green(), uuid),
        (None, Some(err)) => println!("{}: {}", "Registration".bold(), err.red()),
        (None, None) => println!("{}: {}", "Registration".bold(), "disabled".dimmed()),
    }
    if let Some(err) = &report.persist_error {
        println!("{}: {}", "Options not saved".bold(), err.yellow());
    }

    let theme = match (&report.theme, &report.theme_error) {
        (Some(ThemeStatus::UpToDate), _) => "up to date".green().to_string(),
        (Some(ThemeStatus::Installed { version }), _) => {
            format!("installed {}", if version.is_empty() { "(unversioned)" } else { version.as_str() })
                .green()
                .to_string()
        }
        (Some(ThemeStatus::NotConfigured), _) => "none configured on portal".dimmed().to_string(),
        (Some(ThemeStatus::MissingCredentials), _) => {
            "no client credentials yet".yellow().to_string()
        }
        (None, Some(err)) => err.red().to_string(),
        (None, None) => "disabled".dimmed().to_string(),
    };
    println!("{}: {}", "Theme".bold(), theme);

    if !config.theme_path.as_os_str().is_empty() {
        println!("{}: {}", "Serving theme".bold(), config.theme_path.display());
    }

    if ctx.verbose {
        println!();
        println!(
            "{}",
            format!("Options file: {}", config.options_file().display()).dimmed()
        );
        let cached = keys.len().await;
        if cached > 0 {
            println!("{}", format!("Portal keys cached: {cached}").dimmed());
        }
    }

    Ok(())
}
