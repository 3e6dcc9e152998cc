//! Command implementations.

pub mod bootstrap;
pub mod nodes;
pub mod policy;

use halide_client::ClusterPolicy;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output format
    pub output_format: OutputFormat,

    /// Bootstrap policy, read from the environment once at startup
    pub policy: ClusterPolicy,

    /// Verbose output
    pub verbose: bool,
}
