//! Cluster theme synchronization.
//!
//! The Portal advertises a theme version at registration. When it differs
//! from what is installed locally, the node exchanges its client credentials
//! for an access token, downloads the bundle and unpacks it under
//! `<config>/theme`:
//!
//! ```text
//! plan_theme_sync -> obtain_access_token -> fetch_bundle -> install_bundle -> activate_theme
//! ```

use halide_client::{ClusterPolicy, PortalClient};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::NodeConfig;
use crate::{NodeError, Result};

/// Theme directory name inside the config directory.
pub const THEME_DIR: &str = "theme";

/// Asset a usable theme must contain.
pub const ENTRY_POINT: &str = "app.js";

/// File holding the installed theme version.
pub const VERSION_FILE: &str = "version.txt";

/// Size and count limits applied while unpacking a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Largest single entry, uncompressed
    pub max_entry_bytes: u64,
    /// Largest total, uncompressed (also caps the download)
    pub max_total_bytes: u64,
    /// Most entries in one archive
    pub max_entries: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: 32 * 1024 * 1024,
            max_total_bytes: 128 * 1024 * 1024,
            max_entries: 4096,
        }
    }
}

/// What a sync cycle should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemePlan {
    /// Installed theme is current.
    Skip,
    /// Download the bundle; `overwrite` replaces the directory instead of merging.
    Fetch { overwrite: bool },
}

/// Result of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ThemeStatus {
    UpToDate,
    Installed { version: String },
    NotConfigured,
    MissingCredentials,
}

/// Decide whether to download the theme.
///
/// `advertised` is empty when registration failed or was skipped; the node
/// then only fetches a bundle when it has none. A leftover directory with
/// a different version is replaced even when its bundle is incomplete.
pub fn plan_theme_sync(local: &str, advertised: &str, bundle_present: bool) -> ThemePlan {
    let (local, advertised) = (local.trim(), advertised.trim());
    let outdated = !local.is_empty() && !advertised.is_empty() && local != advertised;

    if !bundle_present {
        return ThemePlan::Fetch { overwrite: outdated };
    }
    if advertised.is_empty() || advertised == local {
        return ThemePlan::Skip;
    }
    ThemePlan::Fetch { overwrite: true }
}

/// Installed theme version, empty if none.
pub fn read_theme_version(dir: &Path) -> String {
    fs::read_to_string(dir.join(VERSION_FILE))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Returns true if `dir` holds a usable theme.
pub fn bundle_present(dir: &Path) -> bool {
    dir.join(ENTRY_POINT).is_file()
}

/// Exchange the node's client credentials for a bearer token.
pub async fn obtain_access_token(
    client: &PortalClient,
    client_id: &str,
    client_secret: &str,
) -> Result<String> {
    let token = client.access_token(client_id, client_secret).await?;
    debug!(token_type = %token.token_type, "obtained theme access token");
    Ok(token.access_token)
}

/// Download the bundle; `None` when the Portal has no theme.
pub async fn fetch_bundle(
    client: &PortalClient,
    access_token: &str,
    limits: ArchiveLimits,
) -> Result<Option<Vec<u8>>> {
    Ok(client
        .theme_bundle(access_token, limits.max_total_bytes)
        .await?)
}

/// Unpack a bundle into `dir` on the blocking pool.
///
/// With `overwrite` the archive is unpacked next to `dir` first and then
/// swapped in, so a bad archive leaves the old theme untouched.
pub async fn install_bundle(
    bundle: Vec<u8>,
    dir: PathBuf,
    overwrite: bool,
    advertised: String,
    limits: ArchiveLimits,
) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        install_blocking(&bundle, &dir, overwrite, &advertised, limits)
    })
    .await
    .map_err(|e| NodeError::Task(e.to_string()))?
}

/// Serve the node theme if it is usable.
///
/// Returns true if `config.theme_path` now points at the node theme.
pub fn activate_theme(config: &mut NodeConfig) -> bool {
    let dir = config.node_theme_dir();
    if !bundle_present(&dir) {
        return false;
    }
    if config.theme_path != dir {
        info!(path = %dir.display(), "activated cluster theme");
        config.theme_path = dir;
    }
    true
}

/// Bring the node theme in line with the advertised version and activate it.
pub async fn sync_theme(
    config: &mut NodeConfig,
    advertised: &str,
    policy: ClusterPolicy,
) -> Result<ThemeStatus> {
    let status = fetch_and_install(config, advertised, policy, ArchiveLimits::default()).await;
    activate_theme(config);
    status
}

async fn fetch_and_install(
    config: &NodeConfig,
    advertised: &str,
    policy: ClusterPolicy,
    limits: ArchiveLimits,
) -> Result<ThemeStatus> {
    let dir = config.node_theme_dir();
    let local = read_theme_version(&dir);

    let ThemePlan::Fetch { overwrite } = plan_theme_sync(&local, advertised, bundle_present(&dir))
    else {
        debug!(version = %local, "theme is up to date");
        return Ok(ThemeStatus::UpToDate);
    };

    if config.client_id.is_empty() || config.client_secret.is_empty() {
        info!("no client credentials, skipping theme download");
        return Ok(ThemeStatus::MissingCredentials);
    }

    let client = PortalClient::builder(config.portal_url.as_str())
        .timeout(policy.request_timeout)
        .build()?;

    let token = obtain_access_token(&client, &config.client_id, &config.client_secret).await?;
    let Some(bundle) = fetch_bundle(&client, &token, limits).await? else {
        info!("portal has no theme configured");
        return Ok(ThemeStatus::NotConfigured);
    };

    info!(
        bytes = bundle.len(),
        local = %local,
        advertised = %advertised,
        overwrite,
        "installing cluster theme"
    );
    install_bundle(bundle, dir.clone(), overwrite, advertised.trim().to_string(), limits).await?;

    Ok(ThemeStatus::Installed {
        version: read_theme_version(&dir),
    })
}

fn install_blocking(
    bundle: &[u8],
    dir: &Path,
    overwrite: bool,
    advertised: &str,
    limits: ArchiveLimits,
) -> Result<()> {
    if !overwrite {
        fs::create_dir_all(dir)?;
        return extract(bundle, dir, advertised, limits);
    }

    let staging = staging_dir(dir);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(e) = extract(bundle, &staging, advertised, limits) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %cleanup, "failed to remove staging directory");
        }
        return Err(e);
    }

    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(&staging, dir)?;
    Ok(())
}

fn staging_dir(dir: &Path) -> PathBuf {
    let mut name = OsString::from(dir.as_os_str());
    name.push(".staging");
    PathBuf::from(name)
}

fn extract(bundle: &[u8], target: &Path, advertised: &str, limits: ArchiveLimits) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))?;
    if archive.len() > limits.max_entries {
        return Err(NodeError::Theme(format!(
            "archive has {} entries, limit is {}",
            archive.len(),
            limits.max_entries
        )));
    }

    let mut total = 0u64;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(NodeError::Theme(format!("unsafe path {:?}", entry.name())));
        };
        let out = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if entry.size() > limits.max_entry_bytes {
            return Err(NodeError::Theme(format!(
                "{:?} exceeds {} bytes",
                entry.name(),
                limits.max_entry_bytes
            )));
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&out)?;
        // Cap the copy regardless of the declared size.
        let written = io::copy(&mut (&mut entry).take(limits.max_entry_bytes + 1), &mut file)?;
        if written > limits.max_entry_bytes {
            return Err(NodeError::Theme(format!(
                "{:?} exceeds {} bytes",
                entry.name(),
                limits.max_entry_bytes
            )));
        }

        total += written;
        if total > limits.max_total_bytes {
            return Err(NodeError::Theme(format!(
                "archive exceeds {} bytes",
                limits.max_total_bytes
            )));
        }
    }

    let version_file = target.join(VERSION_FILE);
    if !advertised.is_empty() && !version_file.exists() {
        fs::write(version_file, format!("{advertised}\n"))?;
    }

    Ok(())
}
