//! Identity registry: maps node UUIDs to their security principals.
//!
//! The Portal keeps one row per node identity. Rows are keyed by three
//! overlapping handles with decreasing authority:
//!
//! - **UUID**: canonical and immutable once assigned
//! - **Client ID**: the OAuth principal, may move to a UUID with no record
//! - **Name**: a human label, not unique, normalized before comparison
//!
//! Historical duplicates are tolerated. Whenever several rows match, the one
//! with the greatest `updated_at` wins, see [`resolve_latest`].
//!
//! Client secrets never touch the identity rows; they are hashed into a
//! separate credential table keyed by client ID.

mod error;
mod identity;
mod registry;
pub mod secret;
mod sqlite;
mod store;

pub use error::{RegistryError, Result};
pub use identity::{NodeDatabase, NodeIdentity, StoredNode};
pub use registry::{resolve_latest, Registry};
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, NodeStore};
