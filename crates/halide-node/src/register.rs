//! Registration with the Portal.

use halide_client::{ClusterPolicy, JwksCache, PortalClient};
use halide_core::validate::{cluster_domain, sanitize_dns_label};
use halide_core::{ClusterError, RegistrationRequest, RegistrationResponse};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NodeConfig;
use crate::options::{apply_options_update, OptionsUpdate};
use crate::theme::read_theme_version;
use crate::{NodeError, Result};

/// Drivers whose credentials the Portal can provision.
const PROVISIONED_DRIVERS: &[&str] = &["mysql", "mariadb", "postgres", "postgresql"];

/// Returns true if the node should ask the Portal for database credentials.
///
/// Only for server databases, and only while nothing about the connection
/// is configured locally.
pub fn needs_database_provisioning(config: &NodeConfig) -> bool {
    let driver = config.database_driver.trim().to_ascii_lowercase();

    PROVISIONED_DRIVERS.contains(&driver.as_str())
        && [
            &config.database_dsn,
            &config.database_server,
            &config.database_name,
            &config.database_user,
            &config.database_password,
        ]
        .iter()
        .all(|v| v.trim().is_empty())
}

/// `https://<node label>.<cluster domain>/`, if both can be derived.
pub fn derived_url(node_name: &str, portal_url: &str) -> Option<String> {
    let label = sanitize_dns_label(node_name);
    if label.is_empty() {
        return None;
    }

    let portal = Url::parse(portal_url).ok()?;
    let domain = cluster_domain(portal.host_str()?)?;
    Some(format!("https://{label}.{domain}/"))
}

/// Build the registration request from local facts.
pub fn build_request(config: &NodeConfig) -> RegistrationRequest {
    let label = sanitize_dns_label(&config.node_name);
    let node_name = if label.is_empty() {
        config.node_name.trim().to_string()
    } else {
        label
    };

    let advertise_url =
        non_empty(&config.advertise_url).or_else(|| derived_url(&config.node_name, &config.portal_url));
    let site_url = non_empty(&config.site_url).or_else(|| advertise_url.clone());

    let client_id = non_empty(&config.client_id);
    let client_secret = non_empty(&config.client_secret);
    let rotate_secret = client_id.is_some() && client_secret.is_none();

    RegistrationRequest {
        node_name,
        node_uuid: non_empty(&config.node_uuid),
        node_role: config.role().unwrap_or_default(),
        labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
        advertise_url,
        site_url,
        client_id,
        client_secret,
        rotate_database: needs_database_provisioning(config),
        rotate_secret,
        app_name: config.app_name.clone(),
        app_version: config.app_version.clone(),
        theme: read_theme_version(&config.node_theme_dir()),
    }
}

/// Register with the Portal, retrying transient failures.
///
/// Makes at most `policy.max_attempts` POSTs, each through a fresh client,
/// sleeping `policy.retry_delay` between them. Terminal errors and the last
/// error after the budget is spent are returned as is.
pub async fn register(
    portal_url: &str,
    join_token: &str,
    request: &RegistrationRequest,
    policy: ClusterPolicy,
) -> std::result::Result<RegistrationResponse, ClusterError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let client = PortalClient::builder(portal_url)
            .timeout(policy.request_timeout)
            .build()?;

        match client.register(join_token, request).await {
            Ok(response) => {
                info!(attempt, node_uuid = %response.node.uuid, "registered with portal");
                return Ok(response);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    attempt,
                    max_attempts,
                    status = ?err.status_code(),
                    error = %err,
                    "registration failed, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(attempt, status = ?err.status_code(), error = %err, "registration failed");
                return Err(err);
            }
        }
    }
}

/// Options the response changes, compared with the current config.
///
/// Empty and unchanged values are left out. Database fields are only taken
/// when provisioning was requested.
pub fn registration_update(
    config: &NodeConfig,
    response: &RegistrationResponse,
    rotate_database: bool,
) -> OptionsUpdate {
    let mut update = OptionsUpdate {
        cluster_uuid: changed(&response.uuid, &config.cluster_uuid),
        cluster_cidr: changed(&response.cluster_cidr, &config.cluster_cidr),
        client_id: changed(&response.node.client_id, &config.client_id),
        client_secret: changed(response.client_secret().unwrap_or_default(), &config.client_secret),
        jwks_url: changed(&response.jwks_url, &config.jwks_url),
        node_uuid: changed(&response.node.uuid, &config.node_uuid),
        ..OptionsUpdate::default()
    };

    let db = &response.database;
    if rotate_database && !db.is_empty() {
        update.database_driver = changed(&db.driver, &config.database_driver);
        update.database_dsn = changed(&db.dsn, &config.database_dsn);
        update.database_server = changed(&db.server(), &config.database_server);
        update.database_name = changed(&db.name, &config.database_name);
        update.database_user = changed(&db.user, &config.database_user);
        update.database_password = changed(&db.password, &config.database_password);
    }

    update
}

/// Mirror what the response changed into `config`, then write it to the
/// options file.
///
/// `config` is updated even when the write fails, so a one-time client
/// secret is never lost from memory. Returns the applied update (empty
/// when nothing changed).
pub fn persist_registration(
    config: &mut NodeConfig,
    response: &RegistrationResponse,
    rotate_database: bool,
) -> Result<OptionsUpdate> {
    let update = registration_update(config, response, rotate_database);
    if update.is_empty() {
        return Ok(update);
    }

    config.apply_update(&update);
    apply_options_update(config, &update)?;
    Ok(update)
}

/// A registration the Portal accepted.
#[derive(Debug)]
pub struct Joined {
    /// Portal response
    pub response: RegistrationResponse,

    /// Set when the options file could not be written; the in-memory
    /// config still carries the new values.
    pub persist_error: Option<NodeError>,
}

/// Absolute JWKS URL; relative paths are resolved against the Portal.
pub fn resolve_jwks_url(portal_url: &str, jwks_url: &str) -> Option<Url> {
    let jwks_url = jwks_url.trim();
    if jwks_url.is_empty() {
        return None;
    }
    Url::parse(portal_url).ok()?.join(jwks_url).ok()
}

/// Register, persist the result and prime the key cache.
///
/// Only a failed registration is an error. A failed options write is
/// reported in [`Joined::persist_error`] and key priming still runs.
pub async fn join_cluster(
    config: &mut NodeConfig,
    policy: ClusterPolicy,
    keys: &JwksCache,
) -> Result<Joined> {
    let request = build_request(config);
    debug!(
        node = %request.node_name,
        role = %request.node_role,
        rotate_database = request.rotate_database,
        rotate_secret = request.rotate_secret,
        "registering node"
    );

    let portal_url = config.portal_url.clone();
    let response = register(&portal_url, &config.join_token, &request, policy).await?;

    let persist_error = persist_registration(config, &response, request.rotate_database).err();
    if let Some(err) = &persist_error {
        warn!(
            path = %config.options_file().display(),
            error = %err,
            "failed to persist registration, keeping it in memory"
        );
    }

    if let Some(url) = resolve_jwks_url(&portal_url, &response.jwks_url) {
        if let Err(err) = keys.prime(&url, policy.request_timeout).await {
            warn!(url = %url, error = %err, "failed to prime portal key cache");
        }
    }

    Ok(Joined {
        response,
        persist_error,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn changed(value: &str, current: &str) -> Option<String> {
    (!value.is_empty() && value != current).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use halide_core::{NodeRole, ProvisionedDatabase, RegisteredNode, RegistrationSecrets};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(attempts: u32) -> ClusterPolicy {
        ClusterPolicy::new()
            .max_attempts(attempts)
            .retry_delay(Duration::from_millis(10))
            .request_timeout(Duration::from_secs(5))
    }

    fn response() -> RegistrationResponse {
        RegistrationResponse {
            node: RegisteredNode {
                uuid: "node-uuid".into(),
                client_id: "cs0123456789abcd".into(),
                name: "pi".into(),
                role: "instance".into(),
                ..RegisteredNode::default()
            },
            uuid: "cluster-uuid".into(),
            cluster_cidr: "10.10.0.0/16".into(),
            jwks_url: "/.well-known/jwks.json".into(),
            theme: "2.0".into(),
            secrets: Some(RegistrationSecrets {
                client_secret: "fresh-secret".into(),
            }),
            database: ProvisionedDatabase {
                driver: "mysql".into(),
                host: "db.internal".into(),
                port: 3306,
                name: "halide_pi".into(),
                user: "pi".into(),
                password: "dbpass".into(),
                ..ProvisionedDatabase::default()
            },
        }
    }

    #[test]
    fn test_needs_database_provisioning() {
        let mut config = NodeConfig {
            database_driver: "MySQL".into(),
            ..NodeConfig::default()
        };
        assert!(needs_database_provisioning(&config));

        config.database_name = "local".into();
        assert!(!needs_database_provisioning(&config));

        let sqlite = NodeConfig {
            database_driver: "sqlite".into(),
            ..NodeConfig::default()
        };
        assert!(!needs_database_provisioning(&sqlite));
    }

    #[test]
    fn test_derived_url() {
        assert_eq!(
            derived_url("Living Room", "https://portal.example.com").as_deref(),
            Some("https://living-room.example.com/")
        );
        assert_eq!(derived_url("pi", "https://example.com"), None);
        assert_eq!(derived_url("pi", "http://localhost:2342"), None);
        assert_eq!(derived_url("pi", "https://10.0.0.1"), None);
        assert_eq!(derived_url("!!!", "https://portal.example.com"), None);
    }

    #[test]
    fn test_build_request() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            config_path: dir.path().to_path_buf(),
            node_name: "Living Room".into(),
            node_role: "service".into(),
            portal_url: "https://portal.example.com".into(),
            client_id: "cs1".into(),
            database_driver: "postgres".into(),
            app_name: "halide".into(),
            app_version: "0.4.0".into(),
            ..NodeConfig::default()
        };

        let request = build_request(&config);
        assert_eq!(request.node_name, "living-room");
        assert_eq!(request.node_role, NodeRole::Service);
        assert_eq!(request.advertise_url.as_deref(), Some("https://living-room.example.com/"));
        assert_eq!(request.site_url, request.advertise_url);
        assert_eq!(request.client_id.as_deref(), Some("cs1"));
        assert!(request.client_secret.is_none());
        assert!(request.rotate_secret);
        assert!(request.rotate_database);
        assert!(request.node_uuid.is_none());
        assert!(request.labels.is_none());
        assert_eq!(request.theme, "");
    }

    #[test]
    fn test_build_request_keeps_configured_urls() {
        let config = NodeConfig {
            node_name: "pi".into(),
            portal_url: "https://portal.example.com".into(),
            advertise_url: "https://pi.lan:2342/".into(),
            site_url: "https://photos.example.org/".into(),
            client_id: "cs1".into(),
            client_secret: "secret".into(),
            ..NodeConfig::default()
        };

        let request = build_request(&config);
        assert_eq!(request.advertise_url.as_deref(), Some("https://pi.lan:2342/"));
        assert_eq!(request.site_url.as_deref(), Some("https://photos.example.org/"));
        assert!(!request.rotate_secret);
    }

    #[tokio::test]
    async fn test_register_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .and(header("authorization", "Bearer join-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(response()))
            .expect(1)
            .mount(&server)
            .await;

        let request = RegistrationRequest {
            node_name: "pi".into(),
            ..RegistrationRequest::default()
        };
        let result = register(&server.uri(), "join-token", &request, fast_policy(3))
            .await
            .unwrap();
        assert_eq!(result.node.uuid, "node-uuid");
    }

    #[tokio::test]
    async fn test_register_retries_to_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let err = register(&server.uri(), "t", &RegistrationRequest::default(), fast_policy(4))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_register_not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = register(&server.uri(), "t", &RegistrationRequest::default(), fast_policy(6))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_register_conflict_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({"error": "name taken"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = register(&server.uri(), "t", &RegistrationRequest::default(), fast_policy(6))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Rejected { code: 409, .. }));
    }

    #[tokio::test]
    async fn test_register_recovers_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response()))
            .expect(1)
            .mount(&server)
            .await;

        let result = register(&server.uri(), "t", &RegistrationRequest::default(), fast_policy(6))
            .await
            .unwrap();
        assert_eq!(result.uuid, "cluster-uuid");
    }

    #[test]
    fn test_registration_update_skips_database_unless_requested() {
        let config = NodeConfig::default();

        let update = registration_update(&config, &response(), false);
        assert_eq!(update.node_uuid.as_deref(), Some("node-uuid"));
        assert_eq!(update.client_secret.as_deref(), Some("fresh-secret"));
        assert!(update.database_name.is_none());

        let update = registration_update(&config, &response(), true);
        assert_eq!(update.database_server.as_deref(), Some("db.internal:3306"));
        assert_eq!(update.database_password.as_deref(), Some("dbpass"));
        assert!(update.database_dsn.is_none());
    }

    #[test]
    fn test_persist_registration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let options = dir.path().join("options.yml");
        std::fs::write(&options, "NodeName: pi\nPortalUrl: https://portal.example.com\n").unwrap();
        let mut config = NodeConfig::load(dir.path()).unwrap();

        let first = persist_registration(&mut config, &response(), true).unwrap();
        assert!(!first.is_empty());
        assert_eq!(config.client_id, "cs0123456789abcd");
        assert_eq!(config.database_server, "db.internal:3306");
        let written = std::fs::read_to_string(&options).unwrap();

        let second = persist_registration(&mut config, &response(), true).unwrap();
        assert!(second.is_empty());
        assert_eq!(std::fs::read_to_string(&options).unwrap(), written);

        let reloaded = NodeConfig::load(dir.path()).unwrap();
        assert_eq!(reloaded.node_name, "pi");
        assert_eq!(reloaded.node_uuid, "node-uuid");
        assert_eq!(reloaded.client_secret, "fresh-secret");
        assert_eq!(reloaded.cluster_cidr, "10.10.0.0/16");
    }

    #[test]
    fn test_failed_write_keeps_update_in_memory() {
        let dir = TempDir::new().unwrap();
        // A directory where the options file should be makes the write fail.
        std::fs::create_dir(dir.path().join("options.yml")).unwrap();
        let mut config = NodeConfig {
            config_path: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };

        assert!(persist_registration(&mut config, &response(), false).is_err());
        assert_eq!(config.client_secret, "fresh-secret");
        assert_eq!(config.client_id, "cs0123456789abcd");
        assert_eq!(config.node_uuid, "node-uuid");
    }

    #[tokio::test]
    async fn test_join_cluster_survives_unwritable_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{"kid": "k1", "kty": "OKP", "crv": "Ed25519", "x": "abc"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("options.yml")).unwrap();
        let mut config = NodeConfig {
            config_path: dir.path().to_path_buf(),
            node_name: "pi".into(),
            portal_url: server.uri(),
            join_token: "join".into(),
            ..NodeConfig::default()
        };
        let keys = JwksCache::new();

        let joined = join_cluster(&mut config, fast_policy(1), &keys).await.unwrap();

        assert!(joined.persist_error.is_some());
        assert_eq!(joined.response.theme, "2.0");
        assert_eq!(config.client_secret, "fresh-secret");
        assert_eq!(config.client_id, "cs0123456789abcd");
        assert!(keys.key("k1").await.is_some());
    }

    #[test]
    fn test_resolve_jwks_url() {
        let portal = "https://portal.example.com/base/";
        assert_eq!(
            resolve_jwks_url(portal, "/.well-known/jwks.json").unwrap().as_str(),
            "https://portal.example.com/.well-known/jwks.json"
        );
        assert_eq!(
            resolve_jwks_url(portal, "https://keys.example.com/jwks.json").unwrap().as_str(),
            "https://keys.example.com/jwks.json"
        );
        assert!(resolve_jwks_url(portal, "").is_none());
    }

    #[tokio::test]
    async fn test_join_cluster_persists_and_primes_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{"kid": "k1", "kty": "OKP", "crv": "Ed25519", "x": "abc"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = NodeConfig {
            config_path: dir.path().to_path_buf(),
            node_name: "pi".into(),
            portal_url: server.uri(),
            join_token: "join".into(),
            ..NodeConfig::default()
        };
        let keys = JwksCache::new();

        let joined = join_cluster(&mut config, fast_policy(1), &keys).await.unwrap();

        assert!(joined.persist_error.is_none());
        assert_eq!(joined.response.theme, "2.0");
        assert_eq!(config.node_uuid, "node-uuid");
        assert_eq!(config.cluster_uuid, "cluster-uuid");
        assert!(config.database_name.is_empty());
        assert!(keys.key("k1").await.is_some());
        assert!(dir.path().join("options.yml").is_file());
    }

    #[tokio::test]
    async fn test_join_cluster_survives_key_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/cluster/nodes/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = NodeConfig {
            config_path: dir.path().to_path_buf(),
            node_name: "pi".into(),
            portal_url: server.uri(),
            join_token: "join".into(),
            ..NodeConfig::default()
        };
        let keys = JwksCache::new();

        join_cluster(&mut config, fast_policy(1), &keys).await.unwrap();
        assert!(keys.is_empty().await);
        assert_eq!(config.node_uuid, "node-uuid");
    }
}
