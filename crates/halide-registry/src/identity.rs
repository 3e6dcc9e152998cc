use chrono::{DateTime, Utc};
use halide_core::NodeRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Database credentials provisioned for a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDatabase {
    /// Driver name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub driver: String,

    /// Schema name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// User name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Password
    #[serde(default, skip_serializing)]
    pub password: String,

    /// When the credentials were last rotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<DateTime<Utc>>,
}

impl NodeDatabase {
    /// Returns true if no sub-field carries a value
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.driver.is_empty() && self.name.is_empty() && self.user.is_empty() && self.password.is_empty()
    }
}

/// A node's security principal as seen by the Portal.
///
/// On input to [`Registry::put`](crate::Registry::put), empty strings mean
/// "not supplied" and leave the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Canonical node UUID (empty until the Portal assigns one)
    #[serde(default)]
    pub uuid: String,

    /// Client ID of the node's OAuth principal
    #[serde(default)]
    pub client_id: String,

    /// Plaintext secret, only populated right after creation or rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Node role; `None` on input leaves the stored role alone and stored
    /// rows always carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<NodeRole>,

    /// Human label, not unique
    #[serde(default)]
    pub name: String,

    /// Public site URL
    #[serde(default)]
    pub site_url: String,

    /// URL advertised to other cluster members
    #[serde(default)]
    pub advertise_url: String,

    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Provisioned database
    #[serde(default)]
    pub database: NodeDatabase,

    /// Row creation time
    pub created_at: DateTime<Utc>,

    /// Last modification time
    pub updated_at: DateTime<Utc>,

    /// Last secret rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_rotated_at: Option<DateTime<Utc>>,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            uuid: String::new(),
            client_id: String::new(),
            client_secret: None,
            role: None,
            name: String::new(),
            site_url: String::new(),
            advertise_url: String::new(),
            labels: BTreeMap::new(),
            database: NodeDatabase::default(),
            created_at: now,
            updated_at: now,
            secret_rotated_at: None,
        }
    }
}

impl NodeIdentity {
    /// Start an identity with a name and role
    #[must_use]
    pub fn new(name: impl Into<String>, role: NodeRole) -> Self {
        Self {
            name: name.into(),
            role: Some(role),
            ..Self::default()
        }
    }

    /// Start an update for an existing node, touching nothing by default
    #[must_use]
    pub fn update(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }

    /// Set the UUID
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Set the client ID
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the initial plaintext secret
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Add a label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Role, falling back to the default when none was given
    #[must_use]
    pub fn role_or_default(&self) -> NodeRole {
        self.role.unwrap_or_default()
    }

    /// Returns true if the Portal has assigned a UUID
    #[must_use]
    pub fn has_uuid(&self) -> bool {
        !self.uuid.is_empty()
    }
}

/// A registry row: an identity plus its storage key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    /// Row ID, increasing with insertion order
    pub id: i64,

    /// Stored identity (never carries a secret)
    pub node: NodeIdentity,
}
