//! Storage seam for the identity registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::error::{RegistryError, Result};
use crate::identity::{NodeIdentity, StoredNode};

/// Row-level storage used by [`Registry`](crate::Registry).
///
/// Each method must be atomic on its own; the registry does no locking of
/// its own and several processes may share one store.
pub trait NodeStore: Send + Sync {
    /// Insert a new row and return it with its assigned ID.
    fn insert(&self, node: &NodeIdentity) -> Result<StoredNode>;

    /// Overwrite an existing row.
    fn update(&self, row: &StoredNode) -> Result<()>;

    /// All rows carrying `uuid`.
    fn by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>>;

    /// All rows carrying `client_id`.
    fn by_client_id(&self, client_id: &str) -> Result<Vec<StoredNode>>;

    /// Every row, in insertion order.
    fn all(&self) -> Result<Vec<StoredNode>>;

    /// Remove every row carrying `uuid` and return what was removed.
    fn delete_by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>>;

    /// Store or replace the secret hash for a client.
    fn put_credential(&self, client_id: &str, secret_hash: &str) -> Result<()>;

    /// Secret hash for a client, if any.
    fn credential(&self, client_id: &str) -> Result<Option<String>>;

    /// Forget a client's secret hash.
    fn delete_credential(&self, client_id: &str) -> Result<()>;
}

/// Volatile store, mainly for tests and single-process tools.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    rows: BTreeMap<i64, NodeIdentity>,
    credentials: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner.lock().map_err(|_| RegistryError::Poisoned)
    }

    fn select<F>(&self, filter: F) -> Result<Vec<StoredNode>>
    where
        F: Fn(&NodeIdentity) -> bool,
    {
        Ok(self
            .lock()?
            .rows
            .iter()
            .filter(|(_, node)| filter(node))
            .map(|(id, node)| StoredNode {
                id: *id,
                node: node.clone(),
            })
            .collect())
    }
}

impl NodeStore for MemoryStore {
    fn insert(&self, node: &NodeIdentity) -> Result<StoredNode> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;

        let mut node = node.clone();
        node.client_secret = None;
        inner.rows.insert(id, node.clone());

        Ok(StoredNode { id, node })
    }

    fn update(&self, row: &StoredNode) -> Result<()> {
        let mut inner = self.lock()?;
        let slot = inner
            .rows
            .get_mut(&row.id)
            .ok_or_else(|| RegistryError::NotFound(format!("row {}", row.id)))?;

        *slot = row.node.clone();
        slot.client_secret = None;
        Ok(())
    }

    fn by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>> {
        self.select(|n| n.uuid == uuid)
    }

    fn by_client_id(&self, client_id: &str) -> Result<Vec<StoredNode>> {
        self.select(|n| n.client_id == client_id)
    }

    fn all(&self) -> Result<Vec<StoredNode>> {
        self.select(|_| true)
    }

    fn delete_by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>> {
        let mut inner = self.lock()?;
        let ids: Vec<i64> = inner
            .rows
            .iter()
            .filter(|(_, n)| n.uuid == uuid)
            .map(|(id, _)| *id)
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| inner.rows.remove(&id).map(|node| StoredNode { id, node }))
            .collect())
    }

    fn put_credential(&self, client_id: &str, secret_hash: &str) -> Result<()> {
        self.lock()?
            .credentials
            .insert(client_id.to_string(), secret_hash.to_string());
        Ok(())
    }

    fn credential(&self, client_id: &str) -> Result<Option<String>> {
        Ok(self.lock()?.credentials.get(client_id).cloned())
    }

    fn delete_credential(&self, client_id: &str) -> Result<()> {
        self.lock()?.credentials.remove(client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halide_core::NodeRole;

    #[test]
    fn test_insert_strips_secret() {
        let store = MemoryStore::new();
        let row = store
            .insert(&NodeIdentity::new("pi", NodeRole::Instance).with_secret("plain"))
            .unwrap();
        assert_eq!(row.id, 1);
        assert!(row.node.client_secret.is_none());
        assert!(store.all().unwrap()[0].node.client_secret.is_none());
    }

    #[test]
    fn test_update_missing_row() {
        let store = MemoryStore::new();
        let row = StoredNode {
            id: 42,
            node: NodeIdentity::default(),
        };
        assert!(store.update(&row).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_by_uuid() {
        let store = MemoryStore::new();
        store.insert(&NodeIdentity::default().with_uuid("u1")).unwrap();
        store.insert(&NodeIdentity::default().with_uuid("u1")).unwrap();
        store.insert(&NodeIdentity::default().with_uuid("u2")).unwrap();

        let removed = store.delete_by_uuid("u1").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
