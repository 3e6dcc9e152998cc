//! Identity resolution on top of a [`NodeStore`].

use chrono::{DateTime, Utc};
use halide_core::validate::normalize_name;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::identity::{NodeIdentity, StoredNode};
use crate::secret;
use crate::store::NodeStore;

/// Pick the authoritative row among duplicates.
///
/// The greatest `updated_at` wins; on a tie the row inserted last wins.
pub fn resolve_latest<I>(rows: I) -> Option<StoredNode>
where
    I: IntoIterator<Item = StoredNode>,
{
    rows.into_iter().max_by(|a, b| {
        a.node
            .updated_at
            .cmp(&b.node.updated_at)
            .then(a.id.cmp(&b.id))
    })
}

/// Node identity registry.
pub struct Registry<S> {
    store: S,
}

impl<S: NodeStore> Registry<S> {
    /// Wrap a store
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create or update a node identity.
    ///
    /// The target row is resolved by UUID, then client ID, then name (see
    /// [`Registry::resolve_target`]). Non-empty input fields and a supplied
    /// role overwrite the stored ones, labels are merged key by key, and
    /// database fields are only touched when the input carries any.
    ///
    /// The returned identity carries a plaintext secret only if one was
    /// supplied or generated by this call.
    pub fn put(&self, input: &NodeIdentity) -> Result<NodeIdentity> {
        let now = Utc::now();
        let secret = input.client_secret.as_deref().filter(|s| !s.is_empty());

        let Some(mut row) = self.resolve_target(input)? else {
            return self.create(input, secret, now);
        };

        let hashed = secret.map(secret::hash_secret).transpose()?;
        let previous_client_id = row.node.client_id.clone();

        self.merge(&mut row, input, now)?;
        row.node.updated_at = now;
        if hashed.is_some() {
            row.node.secret_rotated_at = Some(now);
        }
        self.store.update(&row)?;

        if previous_client_id != row.node.client_id {
            self.move_credential(&previous_client_id, &row.node.client_id)?;
        }
        if let Some(hashed) = hashed {
            self.store.put_credential(&row.node.client_id, &hashed)?;
        }

        debug!(id = row.id, uuid = %row.node.uuid, client_id = %row.node.client_id, "updated node");

        let mut node = row.node;
        node.client_secret = secret.map(String::from);
        Ok(node)
    }

    /// Find the row an input identity refers to, if any.
    ///
    /// 1. the latest row with the input UUID;
    /// 2. else the latest row with the input client ID;
    /// 3. else the latest row whose normalized name matches. When the input
    ///    carries a UUID, only rows without one are candidates, so a name can
    ///    never pull in another node's identity.
    pub fn resolve_target(&self, input: &NodeIdentity) -> Result<Option<StoredNode>> {
        if !input.uuid.is_empty() {
            if let Some(row) = resolve_latest(self.store.by_uuid(&input.uuid)?) {
                return Ok(Some(row));
            }
        }

        if !input.client_id.is_empty() {
            if let Some(row) = resolve_latest(self.store.by_client_id(&input.client_id)?) {
                return Ok(Some(row));
            }
        }

        if input.name.trim().is_empty() {
            return Ok(None);
        }

        let wanted = normalize_name(&input.name);
        let candidates = self.store.all()?.into_iter().filter(|row| {
            normalize_name(&row.node.name) == wanted && (input.uuid.is_empty() || row.node.uuid.is_empty())
        });

        Ok(resolve_latest(candidates))
    }

    /// Latest row for a UUID.
    pub fn get(&self, uuid: &str) -> Result<NodeIdentity> {
        self.latest_by_uuid(uuid).map(|row| row.node)
    }

    /// Latest row for a UUID.
    pub fn find_by_node_uuid(&self, uuid: &str) -> Result<NodeIdentity> {
        self.get(uuid)
    }

    /// Latest row whose name matches after normalization.
    pub fn find_by_name(&self, name: &str) -> Result<NodeIdentity> {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return Err(RegistryError::NotFound(format!("name {name:?}")));
        }

        let rows = self
            .store
            .all()?
            .into_iter()
            .filter(|row| normalize_name(&row.node.name) == wanted);

        resolve_latest(rows)
            .map(|row| row.node)
            .ok_or_else(|| RegistryError::NotFound(format!("name {name:?}")))
    }

    /// Latest row for a client ID.
    pub fn find_by_client_id(&self, client_id: &str) -> Result<NodeIdentity> {
        if client_id.is_empty() {
            return Err(RegistryError::NotFound("empty client id".into()));
        }

        resolve_latest(self.store.by_client_id(client_id)?)
            .map(|row| row.node)
            .ok_or_else(|| RegistryError::NotFound(format!("client {client_id}")))
    }

    /// All identified nodes, most recently updated first.
    ///
    /// Rows without a UUID are left out whatever their role. Duplicates of
    /// one UUID collapse to the authoritative row.
    pub fn list(&self) -> Result<Vec<NodeIdentity>> {
        let mut by_uuid: BTreeMap<String, Vec<StoredNode>> = BTreeMap::new();
        for row in self.store.all()? {
            if row.node.has_uuid() {
                by_uuid.entry(row.node.uuid.clone()).or_default().push(row);
            }
        }

        let mut nodes: Vec<NodeIdentity> = by_uuid
            .into_values()
            .filter_map(resolve_latest)
            .map(|row| row.node)
            .collect();

        nodes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(nodes)
    }

    /// Remove every row sharing `uuid`, with their credentials.
    ///
    /// Returns the number of rows removed.
    pub fn delete(&self, uuid: &str) -> Result<usize> {
        if uuid.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete_by_uuid(uuid)?;
        for row in &removed {
            let client_id = &row.node.client_id;
            if !client_id.is_empty() && self.store.by_client_id(client_id)?.is_empty() {
                self.store.delete_credential(client_id)?;
            }
        }

        if !removed.is_empty() {
            info!(uuid = %uuid, rows = removed.len(), "deleted node");
        }
        Ok(removed.len())
    }

    /// Remove every row sharing `uuid`.
    pub fn delete_all_by_uuid(&self, uuid: &str) -> Result<usize> {
        self.delete(uuid)
    }

    /// Issue a new secret for the latest row of `uuid`.
    ///
    /// The plaintext is returned once; only its hash is kept.
    pub fn rotate_secret(&self, uuid: &str) -> Result<String> {
        let mut row = self.latest_by_uuid(uuid)?;
        let now = Utc::now();

        if row.node.client_id.is_empty() {
            row.node.client_id = secret::generate_client_id()?;
        }

        let plaintext = secret::generate_secret()?;
        let hashed = secret::hash_secret(&plaintext)?;

        row.node.secret_rotated_at = Some(now);
        row.node.updated_at = now;
        self.store.update(&row)?;
        self.store.put_credential(&row.node.client_id, &hashed)?;

        info!(uuid = %uuid, client_id = %row.node.client_id, "rotated node secret");
        Ok(plaintext)
    }

    /// Check a client secret against the stored hash.
    pub fn validate_secret(&self, client_id: &str, secret: &str) -> Result<bool> {
        Ok(self
            .store
            .credential(client_id)?
            .is_some_and(|hash| secret::verify_secret(secret, &hash)))
    }

    fn latest_by_uuid(&self, uuid: &str) -> Result<StoredNode> {
        if uuid.is_empty() {
            return Err(RegistryError::NotFound("empty uuid".into()));
        }

        resolve_latest(self.store.by_uuid(uuid)?)
            .ok_or_else(|| RegistryError::NotFound(format!("uuid {uuid}")))
    }

    fn create(
        &self,
        input: &NodeIdentity,
        secret: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<NodeIdentity> {
        let mut node = input.clone();
        node.client_secret = None;
        node.role = Some(input.role_or_default());
        if node.client_id.is_empty() {
            node.client_id = secret::generate_client_id()?;
        }
        if !node.database.is_empty() && node.database.rotated_at.is_none() {
            node.database.rotated_at = Some(now);
        }
        node.created_at = now;
        node.updated_at = now;
        node.secret_rotated_at = Some(now);

        let plaintext = match secret {
            Some(secret) => secret.to_string(),
            None => secret::generate_secret()?,
        };
        let hashed = secret::hash_secret(&plaintext)?;

        let row = self.store.insert(&node)?;
        self.store.put_credential(&row.node.client_id, &hashed)?;

        info!(id = row.id, uuid = %row.node.uuid, client_id = %row.node.client_id, "created node");

        let mut node = row.node;
        node.client_secret = Some(plaintext);
        Ok(node)
    }

    fn merge(&self, row: &mut StoredNode, input: &NodeIdentity, now: DateTime<Utc>) -> Result<()> {
        let node = &mut row.node;

        if !input.uuid.is_empty() {
            node.uuid.clone_from(&input.uuid);
        }

        if !input.client_id.is_empty() && input.client_id != node.client_id {
            let taken = self
                .store
                .by_client_id(&input.client_id)?
                .iter()
                .any(|other| other.id != row.id);
            if taken {
                warn!(
                    uuid = %node.uuid,
                    client_id = %input.client_id,
                    "client id belongs to another node, keeping current"
                );
            } else {
                node.client_id.clone_from(&input.client_id);
            }
        }

        if let Some(role) = input.role {
            node.role = Some(role);
        }
        for (field, value) in [
            (&mut node.name, &input.name),
            (&mut node.site_url, &input.site_url),
            (&mut node.advertise_url, &input.advertise_url),
        ] {
            if !value.is_empty() {
                field.clone_from(value);
            }
        }

        node.labels
            .extend(input.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let db = &input.database;
        if !db.is_empty() {
            for (field, value) in [
                (&mut node.database.driver, &db.driver),
                (&mut node.database.name, &db.name),
                (&mut node.database.user, &db.user),
                (&mut node.database.password, &db.password),
            ] {
                if !value.is_empty() {
                    field.clone_from(value);
                }
            }
            node.database.rotated_at = Some(db.rotated_at.unwrap_or(now));
        }

        Ok(())
    }

    fn move_credential(&self, from: &str, to: &str) -> Result<()> {
        if from.is_empty() {
            return Ok(());
        }
        if let Some(hash) = self.store.credential(from)? {
            self.store.put_credential(to, &hash)?;
            self.store.delete_credential(from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, SqliteStore};
    use chrono::Duration;
    use halide_core::NodeRole;

    fn registry() -> Registry<SqliteStore> {
        Registry::new(SqliteStore::open_in_memory().unwrap())
    }

    fn aged(node: NodeIdentity, minutes_ago: i64) -> NodeIdentity {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        NodeIdentity {
            created_at: at,
            updated_at: at,
            ..node
        }
    }

    #[test]
    fn test_resolve_latest() {
        let old = StoredNode {
            id: 1,
            node: aged(NodeIdentity::default(), 10),
        };
        let new = StoredNode {
            id: 2,
            node: aged(NodeIdentity::default(), 1),
        };
        assert_eq!(resolve_latest(vec![new.clone(), old.clone()]).unwrap().id, 2);
        assert_eq!(resolve_latest(vec![old, new]).unwrap().id, 2);
        assert!(resolve_latest(Vec::new()).is_none());
    }

    #[test]
    fn test_resolve_latest_tie_prefers_newer_row() {
        let node = aged(NodeIdentity::default(), 3);
        let a = StoredNode { id: 7, node: node.clone() };
        let b = StoredNode { id: 9, node };
        assert_eq!(resolve_latest(vec![b, a]).unwrap().id, 9);
    }

    #[test]
    fn test_put_creates_with_generated_credentials() {
        let registry = registry();
        let node = registry
            .put(&NodeIdentity::new("pi-node", NodeRole::Instance).with_uuid("u1"))
            .unwrap();

        assert!(node.client_id.starts_with("cs"));
        let secret = node.client_secret.clone().unwrap();
        assert!(registry.validate_secret(&node.client_id, &secret).unwrap());

        let stored = registry.get("u1").unwrap();
        assert!(stored.client_secret.is_none());
        assert_eq!(stored.client_id, node.client_id);
    }

    #[test]
    fn test_put_hashes_initial_secret() {
        let registry = registry();
        let node = registry
            .put(
                &NodeIdentity::new("pi", NodeRole::Service)
                    .with_uuid("u1")
                    .with_client_id("cs1")
                    .with_secret("initial"),
            )
            .unwrap();
        assert_eq!(node.client_secret.as_deref(), Some("initial"));

        let hash = registry.store().credential("cs1").unwrap().unwrap();
        assert!(!hash.contains("initial"));
        assert!(registry.validate_secret("cs1", "initial").unwrap());
    }

    #[test]
    fn test_uuid_match_never_hijacks_other_client() {
        let registry = registry();
        let store = registry.store();
        store
            .insert(&NodeIdentity::new("a", NodeRole::Instance).with_uuid("u1").with_client_id("c1"))
            .unwrap();
        store
            .insert(&NodeIdentity::new("b", NodeRole::Instance).with_uuid("u2").with_client_id("c2"))
            .unwrap();
        let before_b = registry.get("u2").unwrap();

        let updated = registry
            .put(
                &NodeIdentity::update("u1")
                    .with_client_id("c2")
                    .with_label("zone", "attic"),
            )
            .unwrap();

        assert_eq!(updated.uuid, "u1");
        assert_eq!(updated.client_id, "c1");
        assert_eq!(updated.labels.get("zone").map(String::as_str), Some("attic"));
        assert_eq!(registry.get("u2").unwrap(), before_b);
        assert_eq!(registry.find_by_client_id("c2").unwrap().uuid, "u2");
    }

    #[test]
    fn test_client_id_moves_to_unknown_uuid() {
        let registry = registry();
        registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u1").with_client_id("c1"))
            .unwrap();

        let moved = registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u9").with_client_id("c1"))
            .unwrap();

        assert_eq!(moved.uuid, "u9");
        assert_eq!(registry.store().all().unwrap().len(), 1);
        assert!(registry.get("u1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_put_by_name_updates_latest_row() {
        let registry = registry();
        let store = registry.store();
        store
            .insert(&aged(NodeIdentity::new("Living Room", NodeRole::Instance).with_client_id("c1"), 10))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("living_room", NodeRole::Instance).with_client_id("c2"), 1))
            .unwrap();

        let node = registry
            .put(&NodeIdentity::new("LIVING-ROOM", NodeRole::Service))
            .unwrap();

        assert_eq!(node.client_id, "c2");
        assert_eq!(node.role, Some(NodeRole::Service));
        assert_eq!(registry.find_by_client_id("c1").unwrap().role, Some(NodeRole::Instance));
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn test_name_never_matches_other_uuid() {
        let registry = registry();
        registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u1"))
            .unwrap();

        let node = registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u2"))
            .unwrap();

        assert_eq!(node.uuid, "u2");
        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[test]
    fn test_labels_merge_and_database_update() {
        let registry = registry();
        let mut input = NodeIdentity::new("pi", NodeRole::Instance)
            .with_uuid("u1")
            .with_label("zone", "home")
            .with_label("tier", "hot");
        input.database.driver = "mysql".into();
        input.database.name = "halide_pi".into();
        registry.put(&input).unwrap();

        let update = NodeIdentity::update("u1").with_label("tier", "cold");
        registry.put(&update).unwrap();

        let node = registry.get("u1").unwrap();
        assert_eq!(node.name, "pi");
        assert_eq!(node.labels.get("zone").map(String::as_str), Some("home"));
        assert_eq!(node.labels.get("tier").map(String::as_str), Some("cold"));
        assert_eq!(node.database.name, "halide_pi");

        let mut update = NodeIdentity::update("u1");
        update.database.user = "pi".into();
        registry.put(&update).unwrap();

        let node = registry.get("u1").unwrap();
        assert_eq!(node.database.driver, "mysql");
        assert_eq!(node.database.user, "pi");
        assert!(node.database.rotated_at.is_some());
    }

    #[test]
    fn test_update_without_role_keeps_role() {
        let registry = registry();
        registry
            .put(&NodeIdentity::new("db", NodeRole::Service).with_uuid("u1"))
            .unwrap();

        let node = registry
            .put(&NodeIdentity::update("u1").with_label("zone", "attic"))
            .unwrap();
        assert_eq!(node.role, Some(NodeRole::Service));
        assert_eq!(registry.get("u1").unwrap().role, Some(NodeRole::Service));

        let node = registry
            .put(&NodeIdentity::new("", NodeRole::Instance).with_uuid("u1"))
            .unwrap();
        assert_eq!(node.role, Some(NodeRole::Instance));
    }

    #[test]
    fn test_create_without_role_defaults() {
        let registry = registry();
        let node = registry.put(&NodeIdentity::update("u1")).unwrap();
        assert_eq!(node.role, Some(NodeRole::default()));
    }

    #[test]
    fn test_rename_keeps_uuid_row() {
        let registry = registry();
        registry
            .put(&NodeIdentity::new("old-name", NodeRole::Instance).with_uuid("u1"))
            .unwrap();
        registry
            .put(&NodeIdentity::new("taken", NodeRole::Instance).with_uuid("u2"))
            .unwrap();

        registry
            .put(&NodeIdentity::new("taken", NodeRole::Instance).with_uuid("u1"))
            .unwrap();

        assert_eq!(registry.get("u1").unwrap().name, "taken");
        assert_eq!(registry.get("u2").unwrap().name, "taken");
        // Both keep their identity; the most recently written one wins by name.
        assert_eq!(registry.find_by_name("taken").unwrap().uuid, "u1");
    }

    #[test]
    fn test_find_by_name_returns_latest_duplicate() {
        let registry = registry();
        let store = registry.store();
        store
            .insert(&aged(NodeIdentity::new("Living Room", NodeRole::Instance).with_uuid("a"), 10))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("living_room", NodeRole::Instance).with_uuid("b"), 1))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("living-room", NodeRole::Instance).with_uuid("c"), 5))
            .unwrap();

        assert_eq!(registry.find_by_name("LIVING ROOM").unwrap().uuid, "b");
        assert!(registry.find_by_name("kitchen").unwrap_err().is_not_found());
        assert!(registry.find_by_name("  ").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_returns_latest_duplicate() {
        let registry = registry();
        let store = registry.store();
        store
            .insert(&aged(NodeIdentity::new("new", NodeRole::Instance).with_uuid("u1"), 1))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("old", NodeRole::Instance).with_uuid("u1"), 30))
            .unwrap();

        assert_eq!(registry.get("u1").unwrap().name, "new");
        assert_eq!(registry.find_by_node_uuid("u1").unwrap().name, "new");

        registry
            .put(&NodeIdentity::update("u1").with_label("k", "v"))
            .unwrap();
        let rows = store.by_uuid("u1").unwrap();
        let old = rows.iter().find(|r| r.node.name == "old").unwrap();
        assert!(old.node.labels.is_empty());
    }

    #[test]
    fn test_lookup_not_found() {
        let registry = registry();
        assert!(registry.get("missing").unwrap_err().is_not_found());
        assert!(registry.get("").unwrap_err().is_not_found());
        assert!(registry.find_by_client_id("cs0").unwrap_err().is_not_found());
        assert!(registry.rotate_secret("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_excludes_rows_without_uuid() {
        let registry = registry();
        let store = registry.store();
        store
            .insert(&aged(NodeIdentity::new("a", NodeRole::Instance).with_uuid("u1"), 20))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("b", NodeRole::Instance), 1))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("c", NodeRole::Service), 2))
            .unwrap();
        store
            .insert(&aged(NodeIdentity::new("d", NodeRole::Service).with_uuid("u2"), 5))
            .unwrap();

        let names: Vec<String> = registry.list().unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["d", "a"]);
    }

    #[test]
    fn test_delete_removes_all_rows_for_uuid() {
        let registry = registry();
        let created = registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u1"))
            .unwrap();
        registry
            .store()
            .insert(&aged(NodeIdentity::new("pi-old", NodeRole::Instance).with_uuid("u1"), 60))
            .unwrap();
        registry
            .put(&NodeIdentity::new("other", NodeRole::Instance).with_uuid("u2"))
            .unwrap();

        assert_eq!(registry.delete_all_by_uuid("u1").unwrap(), 2);
        assert!(registry.get("u1").unwrap_err().is_not_found());
        assert!(registry.store().credential(&created.client_id).unwrap().is_none());
        assert_eq!(registry.list().unwrap().len(), 1);
        assert_eq!(registry.delete("u1").unwrap(), 0);
    }

    #[test]
    fn test_rotate_secret() {
        let registry = registry();
        let node = registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u1"))
            .unwrap();
        let old_secret = node.client_secret.unwrap();

        let new_secret = registry.rotate_secret("u1").unwrap();

        assert_ne!(old_secret, new_secret);
        assert!(!registry.validate_secret(&node.client_id, &old_secret).unwrap());
        assert!(registry.validate_secret(&node.client_id, &new_secret).unwrap());

        let stored = registry.get("u1").unwrap();
        assert!(stored.secret_rotated_at.is_some());
        assert!(stored.updated_at >= node.updated_at);
    }

    #[test]
    fn test_memory_store_registry() {
        let registry = Registry::new(MemoryStore::new());
        let node = registry
            .put(&NodeIdentity::new("pi", NodeRole::Instance).with_uuid("u1"))
            .unwrap();
        let secret = registry.rotate_secret("u1").unwrap();
        assert!(registry.validate_secret(&node.client_id, &secret).unwrap());
        assert_eq!(registry.list().unwrap().len(), 1);
        assert_eq!(registry.delete("u1").unwrap(), 1);
        assert!(registry.list().unwrap().is_empty());
    }
}
