//! `halide policy` - Effective bootstrap policy.

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use std::time::Duration;

use super::Context;

pub fn execute(ctx: &Context) -> Result<()> {
    let policy = ctx.policy;

    let value = json!({
        "auto_join": policy.auto_join,
        "auto_theme": policy.auto_theme,
        "max_attempts": policy.max_attempts,
        "retry_delay_ms": millis(policy.retry_delay),
        "request_timeout_ms": millis(policy.request_timeout),
        "worst_case_ms": millis(policy.worst_case()),
    });
    if ctx.output_format.print_structured(&value)? {
        return Ok(());
    }

    println!("{}", "Cluster Policy".bold().underline());
    println!();
    println!("{}: {}", "Auto join".bold(), on_off(policy.auto_join));
    println!("{}: {}", "Auto theme".bold(), on_off(policy.auto_theme));
    println!("{}: {}", "Attempts".bold(), policy.max_attempts);
    println!("{}: {:?}", "Retry delay".bold(), policy.retry_delay);
    println!("{}: {:?}", "Request timeout".bold(), policy.request_timeout);
    println!();
    println!(
        "{}",
        format!("Registration blocks startup for at most {:?}", policy.worst_case()).dimmed()
    );

    Ok(())
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".yellow()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
