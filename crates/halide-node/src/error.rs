//! Error types for node bootstrap.

use halide_core::ClusterError;
use thiserror::Error;

/// Errors that can occur while bootstrapping a node.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Portal protocol failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Options file or theme directory could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Options file is not valid YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Theme bundle is not a readable zip archive.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Theme bundle was rejected.
    #[error("theme error: {0}")]
    Theme(String),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}
