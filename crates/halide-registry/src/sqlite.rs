//! `SQLite` backed [`NodeStore`].

use chrono::{DateTime, Utc};
use halide_core::NodeRole;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::identity::{NodeDatabase, NodeIdentity, StoredNode};
use crate::store::NodeStore;

/// Busy timeout so concurrent writers from other processes wait instead of failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid              TEXT NOT NULL DEFAULT '',
    client_id         TEXT NOT NULL DEFAULT '',
    name              TEXT NOT NULL DEFAULT '',
    role              TEXT NOT NULL,
    site_url          TEXT NOT NULL DEFAULT '',
    advertise_url     TEXT NOT NULL DEFAULT '',
    labels            TEXT NOT NULL DEFAULT '{}',
    db_driver         TEXT NOT NULL DEFAULT '',
    db_name           TEXT NOT NULL DEFAULT '',
    db_user           TEXT NOT NULL DEFAULT '',
    db_password       TEXT NOT NULL DEFAULT '',
    db_rotated_at     INTEGER,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL,
    secret_rotated_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_nodes_uuid ON nodes (uuid);
CREATE INDEX IF NOT EXISTS idx_nodes_client_id ON nodes (client_id);
CREATE TABLE IF NOT EXISTS credentials (
    client_id   TEXT PRIMARY KEY,
    secret_hash TEXT NOT NULL,
    updated_at  INTEGER NOT NULL
);
";

const COLUMNS: &str = "id, uuid, client_id, name, role, site_url, advertise_url, labels, \
     db_driver, db_name, db_user, db_password, db_rotated_at, \
     created_at, updated_at, secret_rotated_at";

/// Registry store in a single `SQLite` file.
///
/// Every write is a single statement, which `SQLite` applies atomically, so
/// several processes can share the file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the registry database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL; PRAGMA busy_timeout={BUSY_TIMEOUT_MS};"
        ))?;
        debug!(path = %path.display(), "opened node registry");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| RegistryError::Poisoned)?;
        f(&conn)
    }

    fn select(&self, filter: &str, arg: Option<&str>) -> Result<Vec<StoredNode>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM nodes {filter} ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = match arg {
                Some(arg) => stmt.query_map(params![arg], row_to_node)?,
                None => stmt.query_map([], row_to_node)?,
            };
            let nodes = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(nodes)
        })
    }
}

impl NodeStore for SqliteStore {
    fn insert(&self, node: &NodeIdentity) -> Result<StoredNode> {
        let labels = serde_json::to_string(&node.labels)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nodes (uuid, client_id, name, role, site_url, advertise_url, labels, \
                 db_driver, db_name, db_user, db_password, db_rotated_at, \
                 created_at, updated_at, secret_rotated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    node.uuid,
                    node.client_id,
                    node.name,
                    node.role_or_default().as_str(),
                    node.site_url,
                    node.advertise_url,
                    labels,
                    node.database.driver,
                    node.database.name,
                    node.database.user,
                    node.database.password,
                    node.database.rotated_at.map(|t| t.timestamp_micros()),
                    node.created_at.timestamp_micros(),
                    node.updated_at.timestamp_micros(),
                    node.secret_rotated_at.map(|t| t.timestamp_micros()),
                ],
            )?;
            let id = conn.last_insert_rowid();

            let mut node = node.clone();
            node.client_secret = None;
            Ok(StoredNode { id, node })
        })
    }

    fn update(&self, row: &StoredNode) -> Result<()> {
        let node = &row.node;
        let labels = serde_json::to_string(&node.labels)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE nodes SET uuid = ?2, client_id = ?3, name = ?4, role = ?5, \
                 site_url = ?6, advertise_url = ?7, labels = ?8, db_driver = ?9, db_name = ?10, \
                 db_user = ?11, db_password = ?12, db_rotated_at = ?13, created_at = ?14, \
                 updated_at = ?15, secret_rotated_at = ?16 WHERE id = ?1",
                params![
                    row.id,
                    node.uuid,
                    node.client_id,
                    node.name,
                    node.role_or_default().as_str(),
                    node.site_url,
                    node.advertise_url,
                    labels,
                    node.database.driver,
                    node.database.name,
                    node.database.user,
                    node.database.password,
                    node.database.rotated_at.map(|t| t.timestamp_micros()),
                    node.created_at.timestamp_micros(),
                    node.updated_at.timestamp_micros(),
                    node.secret_rotated_at.map(|t| t.timestamp_micros()),
                ],
            )?;
            if changed == 0 {
                return Err(RegistryError::NotFound(format!("row {}", row.id)));
            }
            Ok(())
        })
    }

    fn by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>> {
        self.select("WHERE uuid = ?1", Some(uuid))
    }

    fn by_client_id(&self, client_id: &str) -> Result<Vec<StoredNode>> {
        self.select("WHERE client_id = ?1", Some(client_id))
    }

    fn all(&self) -> Result<Vec<StoredNode>> {
        self.select("", None)
    }

    fn delete_by_uuid(&self, uuid: &str) -> Result<Vec<StoredNode>> {
        let rows = self.by_uuid(uuid)?;
        if rows.is_empty() {
            return Ok(rows);
        }
        self.with_conn(|conn| {
            conn.execute("DELETE FROM nodes WHERE uuid = ?1", params![uuid])?;
            Ok(())
        })?;
        Ok(rows)
    }

    fn put_credential(&self, client_id: &str, secret_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials (client_id, secret_hash, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(client_id) DO UPDATE SET \
                 secret_hash = excluded.secret_hash, updated_at = excluded.updated_at",
                params![client_id, secret_hash, Utc::now().timestamp_micros()],
            )?;
            Ok(())
        })
    }

    fn credential(&self, client_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT secret_hash FROM credentials WHERE client_id = ?1",
                    params![client_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn delete_credential(&self, client_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM credentials WHERE client_id = ?1",
                params![client_id],
            )?;
            Ok(())
        })
    }
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn time_at(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(column)?;
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(
        column, micros,
    ))
}

fn optional_time_at(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.get(column)?;
    micros
        .map(|m| {
            DateTime::from_timestamp_micros(m)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, m))
        })
        .transpose()
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<StoredNode> {
    let role: String = row.get(4)?;
    let role = role
        .parse::<NodeRole>()
        .map_err(|e| conversion_error(4, e))?;

    let labels: String = row.get(7)?;
    let labels: BTreeMap<String, String> =
        serde_json::from_str(&labels).map_err(|e| conversion_error(7, e))?;

    Ok(StoredNode {
        id: row.get(0)?,
        node: NodeIdentity {
            uuid: row.get(1)?,
            client_id: row.get(2)?,
            client_secret: None,
            role: Some(role),
            name: row.get(3)?,
            site_url: row.get(5)?,
            advertise_url: row.get(6)?,
            labels,
            database: NodeDatabase {
                driver: row.get(8)?,
                name: row.get(9)?,
                user: row.get(10)?,
                password: row.get(11)?,
                rotated_at: optional_time_at(row, 12)?,
            },
            created_at: time_at(row, 13)?,
            updated_at: time_at(row, 14)?,
            secret_rotated_at: optional_time_at(row, 15)?,
        },
    })
}
