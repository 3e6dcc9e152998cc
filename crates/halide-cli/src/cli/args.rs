//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Cluster bootstrap and node registry tool for halide
///
/// Nodes join a Portal with `halide bootstrap`; the Portal side keeps
/// node identities in a registry managed with `halide nodes`.
#[derive(Parser, Debug)]
#[command(name = "halide")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join the Portal and sync the cluster theme, as a node does at startup
    Bootstrap(BootstrapArgs),

    /// Show the bootstrap policy taken from the environment
    Policy,

    /// Manage the node identity registry
    Nodes(NodesArgs),
}

// ============================================================================
// Bootstrap command
// ============================================================================

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Config directory holding options.yml
    #[arg(short, long, env = "HALIDE_CONFIG_PATH", default_value = ".")]
    pub config: PathBuf,
}

// ============================================================================
// Nodes command
// ============================================================================

#[derive(Args, Debug)]
pub struct NodesArgs {
    /// Registry database (default: platform data directory)
    #[arg(short, long, env = "HALIDE_REGISTRY", global = true)]
    pub registry: Option<PathBuf>,

    #[command(subcommand)]
    pub command: NodesCommands,
}

#[derive(Subcommand, Debug)]
pub enum NodesCommands {
    /// List registered nodes, most recently updated first
    List,

    /// Show the node with a UUID
    Show {
        /// Node UUID
        uuid: String,
    },

    /// Find a node by name (case and separators are ignored)
    FindName {
        /// Node name
        name: String,
    },

    /// Find a node by client ID
    FindClient {
        /// OAuth client ID
        client_id: String,
    },

    /// Create or update a node
    Put(PutArgs),

    /// Delete every record of a node
    Rm {
        /// Node UUID
        uuid: String,
    },

    /// Issue a new client secret
    Rotate {
        /// Node UUID
        uuid: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct PutArgs {
    /// Node UUID
    #[arg(long)]
    pub uuid: Option<String>,

    /// OAuth client ID
    #[arg(long)]
    pub client_id: Option<String>,

    /// Initial client secret (generated when omitted on create)
    #[arg(long, env = "HALIDE_NODE_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Node name
    #[arg(long)]
    pub name: Option<String>,

    /// Node role: instance, service or portal
    #[arg(long)]
    pub role: Option<String>,

    /// Public site URL
    #[arg(long)]
    pub site_url: Option<String>,

    /// URL advertised to cluster members
    #[arg(long)]
    pub advertise_url: Option<String>,

    /// Label as key=value (repeatable)
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Database driver
    #[arg(long)]
    pub db_driver: Option<String>,

    /// Database name
    #[arg(long)]
    pub db_name: Option<String>,

    /// Database user
    #[arg(long)]
    pub db_user: Option<String>,

    /// Database password
    #[arg(long, env = "HALIDE_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
}
