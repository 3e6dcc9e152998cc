//! halide-node: cluster bootstrap for halide media server nodes.
//!
//! Runs once at startup, before the node opens its own database:
//!
//! 1. **Guards**: skip quietly when bootstrap is disabled, the node is the
//!    Portal, or no Portal is configured; refuse plain HTTP to remote hosts
//! 2. **Registration**: POST the node's facts to the Portal with bounded
//!    retries, merge the returned credentials into `options.yml` and prime
//!    the Portal key cache
//! 3. **Theme**: download the cluster theme when the advertised version
//!    differs from the installed one and serve it
//!
//! Failures never abort startup; see [`init_config`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod options;
pub mod register;
pub mod theme;

// Re-exports for convenience.
pub use bootstrap::{check_guards, init_config, BootstrapReport, SkipReason};
pub use config::NodeConfig;
pub use error::NodeError;
pub use options::{apply_options_update, OptionsUpdate};
pub use register::{join_cluster, persist_registration, register};
pub use theme::{plan_theme_sync, sync_theme, ThemePlan, ThemeStatus};

/// Result type for node bootstrap operations.
pub type Result<T> = std::result::Result<T, NodeError>;
