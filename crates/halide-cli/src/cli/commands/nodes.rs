//! `halide nodes` - Node identity registry.

use anyhow::{anyhow, bail, Context as _, Result};
use colored::Colorize;
use directories::ProjectDirs;
use halide_core::NodeRole;
use halide_registry::{NodeIdentity, NodeStore, Registry, SqliteStore};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use super::Context;
use crate::cli::args::{NodesArgs, NodesCommands, PutArgs};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Client ID")]
    client_id: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub fn execute(ctx: &Context, args: NodesArgs) -> Result<()> {
    let path = registry_path(args.registry)?;
    debug!(path = %path.display(), "opening node registry");
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open registry {}", path.display()))?;
    let registry = Registry::new(store);

    match args.command {
        NodesCommands::List => list(ctx, &registry),
        NodesCommands::Show { uuid } => show(ctx, &registry.get(&uuid)?),
        NodesCommands::FindName { name } => show(ctx, &registry.find_by_name(&name)?),
        NodesCommands::FindClient { client_id } => {
            show(ctx, &registry.find_by_client_id(&client_id)?)
        }
        NodesCommands::Put(put) => {
            let input = identity_from_args(put)?;
            show(ctx, &registry.put(&input)?)
        }
        NodesCommands::Rm { uuid } => remove(ctx, &registry, &uuid),
        NodesCommands::Rotate { uuid } => rotate(ctx, &registry, &uuid),
    }
}

fn registry_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    let dirs = ProjectDirs::from("org", "halide", "halide")
        .ok_or_else(|| anyhow!("Could not determine data directory, pass --registry"))?;
    std::fs::create_dir_all(dirs.data_dir())?;
    Ok(dirs.data_dir().join("registry.db"))
}

fn list<S: NodeStore>(ctx: &Context, registry: &Registry<S>) -> Result<()> {
    let nodes = registry.list()?;
    if ctx.output_format.print_structured(&nodes)? {
        return Ok(());
    }

    if nodes.is_empty() {
        println!("{}", "No registered nodes".dimmed());
        return Ok(());
    }

    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            uuid: n.uuid.clone(),
            name: n.name.chars().take(30).collect(),
            role: n.role_or_default().to_string(),
            client_id: n.client_id.clone(),
            updated: n.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));
    println!();
    println!("{}", format!("{} node(s)", nodes.len()).dimmed());
    Ok(())
}

fn show(ctx: &Context, node: &NodeIdentity) -> Result<()> {
    if ctx.output_format.print_structured(node)? {
        return Ok(());
    }

    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    println!("{}: {}", "UUID".bold(), or_dash(&node.uuid));
    println!("{}: {}", "Name".bold(), or_dash(&node.name));
    println!("{}: {}", "Role".bold(), node.role_or_default());
    println!("{}: {}", "Client ID".bold(), node.client_id);
    println!("{}: {}", "Site URL".bold(), or_dash(&node.site_url));
    println!("{}: {}", "Advertise URL".bold(), or_dash(&node.advertise_url));
    for (key, value) in &node.labels {
        println!("{}: {}={}", "Label".bold(), key, value);
    }
    if !node.database.is_empty() {
        println!(
            "{}: {} {} as {}",
            "Database".bold(),
            node.database.driver,
            node.database.name,
            node.database.user
        );
    }
    println!("{}: {}", "Updated".bold(), node.updated_at.to_rfc3339());
    if let Some(rotated) = node.secret_rotated_at {
        println!("{}: {}", "Secret rotated".bold(), rotated.to_rfc3339());
    }

    if let Some(secret) = &node.client_secret {
        println!();
        println!("{}: {}", "Client secret".bold(), secret.yellow());
        println!("{}", "Store it now; it is not shown again.".dimmed());
    }

    Ok(())
}

fn remove<S: NodeStore>(ctx: &Context, registry: &Registry<S>, uuid: &str) -> Result<()> {
    let removed = registry.delete(uuid)?;
    let value = serde_json::json!({ "uuid": uuid, "removed": removed });
    if ctx.output_format.print_structured(&value)? {
        return Ok(());
    }

    if removed == 0 {
        println!("{}", format!("No node with UUID {uuid}").yellow());
    } else {
        println!("Removed {} record(s) of {}", removed, uuid.bold());
    }
    Ok(())
}

fn rotate<S: NodeStore>(ctx: &Context, registry: &Registry<S>, uuid: &str) -> Result<()> {
    let secret = registry.rotate_secret(uuid)?;
    let node = registry.get(uuid)?;

    let value = serde_json::json!({
        "uuid": uuid,
        "client_id": node.client_id,
        "client_secret": secret,
    });
    if ctx.output_format.print_structured(&value)? {
        return Ok(());
    }

    println!("{}: {}", "Client ID".bold(), node.client_id);
    println!("{}: {}", "Client secret".bold(), secret.yellow());
    println!("{}", "Store it now; it is not shown again.".dimmed());
    Ok(())
}

/// Turn `put` flags into a registry input.
///
/// Without `--role` the registry keeps the node's current role.
fn identity_from_args(args: PutArgs) -> Result<NodeIdentity> {
    let mut input = NodeIdentity::update(args.uuid.unwrap_or_default());
    input.name = args.name.unwrap_or_default();
    input.role = args.role.as_deref().map(str::parse::<NodeRole>).transpose()?;
    input.client_id = args.client_id.unwrap_or_default();
    input.client_secret = args.secret.filter(|s| !s.is_empty());
    input.site_url = args.site_url.unwrap_or_default();
    input.advertise_url = args.advertise_url.unwrap_or_default();
    input.database.driver = args.db_driver.unwrap_or_default();
    input.database.name = args.db_name.unwrap_or_default();
    input.database.user = args.db_user.unwrap_or_default();
    input.database.password = args.db_password.unwrap_or_default();

    for label in &args.labels {
        let Some((key, value)) = label.split_once('=') else {
            bail!("Invalid label {label:?}, expected key=value");
        };
        input.labels.insert(key.trim().to_string(), value.trim().to_string());
    }

    if input.uuid.is_empty() && input.client_id.is_empty() && input.name.trim().is_empty() {
        bail!("Nothing identifies the node; pass --uuid, --client-id or --name");
    }

    Ok(input)
}
