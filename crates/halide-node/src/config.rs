//! Node configuration as read from the options file.

use halide_core::NodeRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::options::OptionsUpdate;
use crate::theme::THEME_DIR;

/// Name of the options file inside the config directory.
pub const OPTIONS_FILE: &str = "options.yml";

/// Local facts a node bootstraps from.
///
/// Loaded from `<config>/options.yml`. Keys use the same PascalCase names
/// that [`OptionsUpdate`] writes back, unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Config directory (holds the options file and the node theme).
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Theme directory currently served.
    #[serde(rename = "ThemePath", skip_serializing_if = "path_is_empty")]
    pub theme_path: PathBuf,

    /// Human node name.
    #[serde(rename = "NodeName")]
    pub node_name: String,

    /// Node role (`instance`, `service` or `portal`).
    #[serde(rename = "NodeRole")]
    pub node_role: String,

    /// UUID assigned by the Portal.
    #[serde(rename = "NodeUUID")]
    pub node_uuid: String,

    /// Portal base URL.
    #[serde(rename = "PortalUrl")]
    pub portal_url: String,

    /// Cluster join token.
    #[serde(rename = "JoinToken", skip_serializing)]
    pub join_token: String,

    /// OAuth client ID issued by the Portal.
    #[serde(rename = "NodeClientID")]
    pub client_id: String,

    /// OAuth client secret issued by the Portal.
    #[serde(rename = "NodeClientSecret", skip_serializing)]
    pub client_secret: String,

    #[serde(rename = "ClusterUUID")]
    pub cluster_uuid: String,

    #[serde(rename = "ClusterCIDR")]
    pub cluster_cidr: String,

    #[serde(rename = "JWKSUrl")]
    pub jwks_url: String,

    /// Public site URL.
    #[serde(rename = "SiteUrl")]
    pub site_url: String,

    /// URL advertised to other cluster members.
    #[serde(rename = "AdvertiseUrl")]
    pub advertise_url: String,

    #[serde(rename = "NodeLabels")]
    pub labels: BTreeMap<String, String>,

    #[serde(rename = "DatabaseDriver")]
    pub database_driver: String,

    #[serde(rename = "DatabaseDSN", skip_serializing)]
    pub database_dsn: String,

    #[serde(rename = "DatabaseServer")]
    pub database_server: String,

    #[serde(rename = "DatabaseName")]
    pub database_name: String,

    #[serde(rename = "DatabaseUser")]
    pub database_user: String,

    #[serde(rename = "DatabasePassword", skip_serializing)]
    pub database_password: String,

    /// Application name reported to the Portal.
    #[serde(skip)]
    pub app_name: String,

    /// Application version reported to the Portal.
    #[serde(skip)]
    pub app_version: String,
}

fn path_is_empty(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

impl NodeConfig {
    /// Load `<config_path>/options.yml`, falling back to defaults.
    pub fn load(config_path: &Path) -> crate::Result<Self> {
        let file = config_path.join(OPTIONS_FILE);

        let mut config = if file.exists() {
            let content = std::fs::read_to_string(&file)?;
            if content.trim().is_empty() {
                Self::default()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            debug!(path = %file.display(), "no options file, using defaults");
            Self::default()
        };

        config.config_path = config_path.to_path_buf();
        Ok(config)
    }

    /// Set the application name and version reported at registration.
    #[must_use]
    pub fn with_app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = name.into();
        self.app_version = version.into();
        self
    }

    /// Path of the options file
    pub fn options_file(&self) -> PathBuf {
        self.config_path.join(OPTIONS_FILE)
    }

    /// Directory the cluster theme is installed into
    pub fn node_theme_dir(&self) -> PathBuf {
        self.config_path.join(THEME_DIR)
    }

    /// Parsed node role.
    ///
    /// An empty role means a regular instance; anything unrecognized is `None`.
    pub fn role(&self) -> Option<NodeRole> {
        if self.node_role.trim().is_empty() {
            return Some(NodeRole::default());
        }
        self.node_role.parse().ok()
    }

    /// Mirror a persisted update into memory.
    pub fn apply_update(&mut self, update: &OptionsUpdate) {
        let pairs = [
            (&mut self.cluster_uuid, &update.cluster_uuid),
            (&mut self.cluster_cidr, &update.cluster_cidr),
            (&mut self.client_id, &update.client_id),
            (&mut self.client_secret, &update.client_secret),
            (&mut self.jwks_url, &update.jwks_url),
            (&mut self.node_uuid, &update.node_uuid),
            (&mut self.database_driver, &update.database_driver),
            (&mut self.database_dsn, &update.database_dsn),
            (&mut self.database_server, &update.database_server),
            (&mut self.database_name, &update.database_name),
            (&mut self.database_user, &update.database_user),
            (&mut self.database_password, &update.database_password),
        ];

        for (field, value) in pairs {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig::load(dir.path()).unwrap();
        assert_eq!(config.config_path, dir.path());
        assert!(config.portal_url.is_empty());
        assert_eq!(config.role(), Some(NodeRole::Instance));
    }

    #[test]
    fn test_load_pascal_case_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(OPTIONS_FILE),
            "NodeName: Living Room\n\
             NodeRole: service\n\
             PortalUrl: https://portal.example.com\n\
             JoinToken: join-secret\n\
             NodeClientID: cs123\n\
             DatabaseDriver: mysql\n\
             NodeLabels:\n  zone: home\n\
             SomethingElse: 42\n",
        )
        .unwrap();

        let config = NodeConfig::load(dir.path()).unwrap();
        assert_eq!(config.node_name, "Living Room");
        assert_eq!(config.role(), Some(NodeRole::Service));
        assert_eq!(config.join_token, "join-secret");
        assert_eq!(config.client_id, "cs123");
        assert_eq!(config.database_driver, "mysql");
        assert_eq!(config.labels.get("zone").map(String::as_str), Some("home"));
        assert_eq!(config.node_theme_dir(), dir.path().join("theme"));
    }

    #[test]
    fn test_unknown_role() {
        let config = NodeConfig {
            node_role: "worker".into(),
            ..NodeConfig::default()
        };
        assert_eq!(config.role(), None);
    }

    #[test]
    fn test_apply_update_only_touches_set_fields() {
        let mut config = NodeConfig {
            client_id: "cs-old".into(),
            database_name: "keep".into(),
            ..NodeConfig::default()
        };

        config.apply_update(&OptionsUpdate {
            client_id: Some("cs-new".into()),
            node_uuid: Some("u1".into()),
            ..OptionsUpdate::default()
        });

        assert_eq!(config.client_id, "cs-new");
        assert_eq!(config.node_uuid, "u1");
        assert_eq!(config.database_name, "keep");
    }
}
