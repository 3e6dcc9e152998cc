//! # halide-cli
//!
//! Command-line interface for halide cluster nodes.
//!
//! ## Features
//!
//! - **Bootstrap**: Join the Portal and install the cluster theme, as a node does at startup
//! - **Policy**: Show the retry and feature policy taken from the environment
//! - **Nodes**: Inspect and manage the Portal's node identity registry
//! - **Multiple output formats**: Pretty tables, JSON, YAML

pub mod cli;
pub mod output;

pub use cli::run;
