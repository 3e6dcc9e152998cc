//! Startup entry point: join the cluster, then sync the theme.

use halide_client::{ClusterPolicy, JwksCache};
use halide_core::validate::is_loopback_host;
use halide_core::NodeRole;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NodeConfig;
use crate::register::join_cluster;
use crate::theme::{sync_theme, ThemeStatus};

/// Why bootstrap did nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Both auto-join and auto-theme are off.
    Disabled,
    /// The node is the Portal itself.
    PortalRole,
    /// The configured role is not recognized.
    UnknownRole(String),
    /// Portal URL or join token is blank.
    MissingPortal,
    /// Portal URL does not parse.
    InvalidPortalUrl(String),
    /// Plain HTTP to a remote host would leak the join token.
    InsecurePortal(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("auto-join and auto-theme are disabled"),
            Self::PortalRole => f.write_str("node is the portal"),
            Self::UnknownRole(role) => write!(f, "unknown node role {role:?}"),
            Self::MissingPortal => f.write_str("portal url or join token not configured"),
            Self::InvalidPortalUrl(url) => write!(f, "invalid portal url {url:?}"),
            Self::InsecurePortal(url) => write!(f, "refusing plain http to non-loopback portal {url}"),
        }
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Set when a guard stopped bootstrap before any request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,

    /// Node UUID returned by a successful registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_uuid: Option<String>,

    /// Theme version the Portal advertised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertised_theme: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_error: Option<String>,

    /// Registration succeeded but the options file could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_error: Option<String>,
}

impl BootstrapReport {
    /// Returns true if registration succeeded
    pub const fn registered(&self) -> bool {
        self.node_uuid.is_some()
    }
}

/// Check whether bootstrap should run at all.
///
/// Guards run in order: features disabled, role, Portal settings, transport.
pub fn check_guards(config: &NodeConfig, policy: ClusterPolicy) -> Result<(), SkipReason> {
    if !policy.auto_join && !policy.auto_theme {
        return Err(SkipReason::Disabled);
    }

    match config.role() {
        Some(NodeRole::Portal) => return Err(SkipReason::PortalRole),
        None => return Err(SkipReason::UnknownRole(config.node_role.clone())),
        Some(_) => {}
    }

    let portal_url = config.portal_url.trim();
    if portal_url.is_empty() || config.join_token.trim().is_empty() {
        return Err(SkipReason::MissingPortal);
    }

    let url = Url::parse(portal_url).map_err(|_| SkipReason::InvalidPortalUrl(portal_url.to_string()))?;
    if url.scheme() != "https" && !url.host_str().is_some_and(is_loopback_host) {
        return Err(SkipReason::InsecurePortal(portal_url.to_string()));
    }

    Ok(())
}

/// Bootstrap a node before it opens its database.
///
/// Never fails: every problem is logged and recorded in the report so the
/// node can start unregistered or without the cluster theme. Registration
/// runs first when auto-join is on; the theme is synced afterwards when
/// auto-theme is on, fetching a missing bundle if registration did not succeed.
pub async fn init_config(
    config: &mut NodeConfig,
    policy: ClusterPolicy,
    keys: &JwksCache,
) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    if let Err(reason) = check_guards(config, policy) {
        match reason {
            SkipReason::InsecurePortal(_) | SkipReason::InvalidPortalUrl(_) => {
                warn!(reason = %reason, "skipping cluster bootstrap");
            }
            _ => debug!(reason = %reason, "skipping cluster bootstrap"),
        }
        report.skipped = Some(reason);
        return report;
    }

    info!(
        portal = %config.portal_url,
        auto_join = policy.auto_join,
        auto_theme = policy.auto_theme,
        worst_case_secs = policy.worst_case().as_secs(),
        "starting cluster bootstrap"
    );

    let mut advertised = String::new();
    if policy.auto_join {
        match join_cluster(config, policy, keys).await {
            Ok(joined) => {
                advertised = joined.response.theme;
                report.node_uuid = Some(joined.response.node.uuid);
                report.advertised_theme = (!advertised.is_empty()).then(|| advertised.clone());
                report.persist_error = joined.persist_error.map(|err| err.to_string());
            }
            Err(err) => {
                warn!(error = %err, "cluster registration failed, continuing unregistered");
                report.registration_error = Some(err.to_string());
            }
        }
    }

    if policy.auto_theme {
        match sync_theme(config, &advertised, policy).await {
            Ok(status) => report.theme = Some(status),
            Err(err) => {
                warn!(error = %err, "theme sync failed");
                report.theme_error = Some(err.to_string());
            }
        }
    }

    report
}
