//! Merge-only persistence of bootstrap results into the options file.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::{NodeError, Result};

/// Configuration keys changed by one bootstrap cycle.
///
/// `None` means "leave the file alone"; only set fields are ever written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsUpdate {
    pub cluster_uuid: Option<String>,
    pub cluster_cidr: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub jwks_url: Option<String>,
    pub node_uuid: Option<String>,
    pub database_driver: Option<String>,
    pub database_dsn: Option<String>,
    pub database_server: Option<String>,
    pub database_name: Option<String>,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
}

impl OptionsUpdate {
    /// The set fields as `(file key, value)` pairs.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("ClusterUUID", &self.cluster_uuid),
            ("ClusterCIDR", &self.cluster_cidr),
            ("NodeClientID", &self.client_id),
            ("NodeClientSecret", &self.client_secret),
            ("JWKSUrl", &self.jwks_url),
            ("NodeUUID", &self.node_uuid),
            ("DatabaseDriver", &self.database_driver),
            ("DatabaseDSN", &self.database_dsn),
            ("DatabaseServer", &self.database_server),
            ("DatabaseName", &self.database_name),
            ("DatabaseUser", &self.database_user),
            ("DatabasePassword", &self.database_password),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }

    /// Returns true if no field is set
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Merge the set fields into the YAML file at `path`.
    ///
    /// Keys not named by the update are kept as they are. Returns `false`
    /// without touching the file when nothing is set.
    pub fn apply(&self, path: &Path) -> Result<bool> {
        let fields = self.fields();
        if fields.is_empty() {
            return Ok(false);
        }

        let mut map = read_mapping(path)?;
        for (key, value) in &fields {
            map.insert(Value::from(*key), Value::from(*value));
        }

        write_atomic(path, serde_yaml::to_string(&map)?.as_bytes())?;

        let keys: Vec<&str> = fields.iter().map(|(key, _)| *key).collect();
        info!(path = %path.display(), keys = ?keys, "updated options file");
        Ok(true)
    }
}

/// Apply `update` to the options file of `config`.
pub fn apply_options_update(config: &NodeConfig, update: &OptionsUpdate) -> Result<bool> {
    update.apply(&config.options_file())
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "options file missing, starting empty");
            return Ok(Mapping::new());
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }

    match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(NodeError::Config(format!(
            "{} does not contain a mapping",
            path.display()
        ))),
    }
}

/// Write via a temp file and rename so readers never see a partial file.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("yml.tmp");
    fs::write(&tmp_path, data)?;
    set_owner_only(&tmp_path)?;

    if let Err(e) = fs::File::open(&tmp_path).and_then(|f| f.sync_all()) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path)
}

/// The options file carries secrets.
#[cfg(unix)]
fn set_owner_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> io::Result<()> {
    Ok(())
}
