use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::NodeRole;

/// Body of `POST /api/v1/cluster/nodes/register`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// DNS-safe node name
    #[serde(rename = "NodeName")]
    pub node_name: String,

    /// Node UUID, if one was assigned before
    #[serde(rename = "NodeUUID", default, skip_serializing_if = "Option::is_none")]
    pub node_uuid: Option<String>,

    /// Role of the registering node
    #[serde(rename = "NodeRole")]
    pub node_role: NodeRole,

    /// Free-form node labels
    #[serde(rename = "Labels", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// URL other cluster members should use to reach this node
    #[serde(rename = "AdvertiseUrl", default, skip_serializing_if = "Option::is_none")]
    pub advertise_url: Option<String>,

    /// Public site URL of this node
    #[serde(rename = "SiteUrl", default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,

    /// Client ID from an earlier registration
    #[serde(rename = "ClientID", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret from an earlier registration
    #[serde(rename = "ClientSecret", default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Ask the Portal to provision database credentials
    #[serde(rename = "RotateDatabase", default)]
    pub rotate_database: bool,

    /// Ask the Portal to issue a new client secret
    #[serde(rename = "RotateSecret", default)]
    pub rotate_secret: bool,

    /// Application name
    #[serde(rename = "AppName", default)]
    pub app_name: String,

    /// Application version
    #[serde(rename = "AppVersion", default)]
    pub app_version: String,

    /// Locally installed theme version (empty if none)
    #[serde(rename = "Theme", default)]
    pub theme: String,
}

/// Node record echoed back by the Portal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisteredNode {
    /// Node UUID
    #[serde(rename = "UUID")]
    pub uuid: String,

    /// Client ID of the node's security principal
    #[serde(rename = "ClientID")]
    pub client_id: String,

    /// Node name as stored by the Portal
    #[serde(rename = "Name")]
    pub name: String,

    /// Node role as stored by the Portal
    #[serde(rename = "Role")]
    pub role: String,

    /// Site URL as stored by the Portal
    #[serde(rename = "SiteUrl")]
    pub site_url: String,

    /// Advertise URL as stored by the Portal
    #[serde(rename = "AdvertiseUrl")]
    pub advertise_url: String,

    /// Labels as stored by the Portal
    #[serde(rename = "Labels")]
    pub labels: BTreeMap<String, String>,
}

/// Secrets issued at creation or rotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSecrets {
    /// Plaintext client secret, returned exactly once
    #[serde(rename = "ClientSecret")]
    pub client_secret: String,
}

/// Database provisioned by the Portal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionedDatabase {
    /// Driver name (e.g. `mysql`)
    #[serde(rename = "Driver")]
    pub driver: String,

    /// Database host
    #[serde(rename = "Host")]
    pub host: String,

    /// Database port (0 = driver default)
    #[serde(rename = "Port")]
    pub port: u16,

    /// Schema name
    #[serde(rename = "Name")]
    pub name: String,

    /// User name
    #[serde(rename = "User")]
    pub user: String,

    /// Password
    #[serde(rename = "Password")]
    pub password: String,

    /// Complete data source name
    #[serde(rename = "DSN")]
    pub dsn: String,

    /// When the credentials were last rotated
    #[serde(rename = "RotatedAt", skip_serializing_if = "Option::is_none")]
    pub rotated_at: Option<String>,
}

impl ProvisionedDatabase {
    /// Returns true if the Portal sent anything usable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dsn.is_empty()
            && self.host.is_empty()
            && self.name.is_empty()
            && self.user.is_empty()
            && self.password.is_empty()
    }

    /// `host:port`, or just the host when no port was given
    #[must_use]
    pub fn server(&self) -> String {
        match (self.host.as_str(), self.port) {
            ("", _) => String::new(),
            (host, 0) => host.to_string(),
            (host, port) => format!("{host}:{port}"),
        }
    }
}

/// Successful registration response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationResponse {
    /// Registered node
    #[serde(rename = "Node")]
    pub node: RegisteredNode,

    /// Cluster UUID
    #[serde(rename = "UUID")]
    pub uuid: String,

    /// Cluster network range
    #[serde(rename = "ClusterCIDR")]
    pub cluster_cidr: String,

    /// Where the Portal publishes its token signing keys
    #[serde(rename = "JWKSUrl")]
    pub jwks_url: String,

    /// Theme version advertised by the Portal (empty if none)
    #[serde(rename = "Theme")]
    pub theme: String,

    /// Newly issued secrets, if any
    #[serde(rename = "Secrets", skip_serializing_if = "Option::is_none")]
    pub secrets: Option<RegistrationSecrets>,

    /// Provisioned database, if any
    #[serde(rename = "Database")]
    pub database: ProvisionedDatabase,
}

impl RegistrationResponse {
    /// The newly issued client secret, if the Portal sent one
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.secrets
            .as_ref()
            .map(|s| s.client_secret.as_str())
            .filter(|s| !s.is_empty())
    }
}
