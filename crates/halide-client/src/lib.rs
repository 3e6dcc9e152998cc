//! HTTP client for the halide Portal API.
//!
//! This crate provides the [`PortalClient`] used by cluster nodes to register,
//! exchange client credentials for access tokens, download theme bundles and
//! fetch the Portal's signing keys, plus the [`ClusterPolicy`] that bounds
//! retries.

#![doc(html_root_url = "https://docs.rs/halide-client/0.4.0")]

mod client;
mod config;
mod jwks;

pub use client::{PortalClient, PortalClientBuilder};
pub use config::*;
pub use halide_core::{ClusterError, Result};
pub use jwks::JwksCache;
