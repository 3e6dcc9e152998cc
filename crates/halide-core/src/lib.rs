//! Core types and errors shared by halide cluster nodes.
//!
//! This crate provides the foundational pieces used across the workspace:
//!
//! - **Types**: Wire types for the Portal registration, OAuth and JWKS endpoints
//! - **Errors**: Protocol error taxonomy with [`ClusterError`]
//! - **Outcome**: Pure status-code classification with [`classify`]
//! - **Validators**: DNS label/domain checks and loopback detection
//!
//! # Example
//!
//! ```rust,ignore
//! use halide_core::{classify, Outcome};
//!
//! assert_eq!(classify(429), Outcome::Retry);
//! assert_eq!(classify(409), Outcome::Terminal);
//! ```

#![doc(html_root_url = "https://docs.rs/halide-core/0.4.0")]

mod error;
mod outcome;
pub mod types;
pub mod validate;

pub use error::{ClusterError, Result};
pub use outcome::{classify, Outcome};
pub use types::*;
