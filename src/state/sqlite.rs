use super::types::{InsertOutcome, Parameters, ServiceInstance, ServiceInstanceBinding};
use super::StateStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::OptionalExtension;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

const SCHEMA_VERSION: i32 = 2;

/// Row status of an instance whose database is still being created.
const STATUS_PROVISIONING: &str = "provisioning";
const STATUS_READY: &str = "ready";

const INSTANCE_COLUMNS: &str =
    "id, service_definition_id, plan_id, organization_guid, space_guid, parameters, created_at";

const BINDING_COLUMNS: &str =
    "id, service_instance_id, credentials, syslog_drain_url, app_guid, created_at";

/// SQLite-backed record store.
///
/// Provides ACID transactions and crash recovery via WAL mode. All access goes
/// through a single `tokio_rusqlite` connection, so statements are serialized
/// on its background thread.
pub struct SqliteStateStore {
    db_path: PathBuf,
    conn: Connection,
}

impl SqliteStateStore {
    /// Open (or create) the state database at `db_path`.
    ///
    /// Creates the parent directory if needed. Call [`initialize`](Self::initialize)
    /// before use.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).await?;

        // Configure WAL mode for crash recovery
        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn,
        })
    }

    /// Create an ephemeral in-memory store.
    ///
    /// Nothing touches the filesystem; the data is gone when the store drops.
    pub async fn new_ephemeral() -> Result<Self> {
        let conn = Connection::open(":memory:").await?;

        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            conn,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create the schema if it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        let current_version: Option<i32> = self
            .conn
            .call(
                |conn: &mut rusqlite::Connection| -> tokio_rusqlite::Result<Option<i32>> {
                    let has_table: bool = conn.query_row(
                        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
                        [],
                        |row| row.get(0),
                    )?;
                    if !has_table {
                        return Ok(None);
                    }
                    Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                        row.get(0)
                    })?)
                },
            )
            .await?;

        match current_version {
            None => {
                debug!("Creating state schema at {:?}", self.db_path);
                self.create_schema().await?;
            }
            Some(version) if version > SCHEMA_VERSION => {
                return Err(Error::Config(format!(
                    "State database {:?} has schema version {}, newer than supported version {}",
                    self.db_path, version, SCHEMA_VERSION
                )));
            }
            Some(version) if version < 2 => {
                info!(
                    "Migrating state schema from version {} to {}",
                    version, SCHEMA_VERSION
                );
                self.migrate_v1_to_v2().await?;
            }
            Some(version) => {
                debug!("State schema is up to date (version {})", version);
            }
        }

        self.release_stale_reservations().await?;
        Ok(())
    }

    /// Migration v1 -> v2: add the instance `status` column.
    ///
    /// Rows written before the column existed were fully provisioned.
    async fn migrate_v1_to_v2(&self) -> Result<()> {
        debug!("Running migration v1 -> v2: adding instance status");

        self.conn
            .call(|conn: &mut rusqlite::Connection| -> tokio_rusqlite::Result<()> {
                let tx = conn.transaction()?;

                let already_applied: bool = tx.query_row(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = 2",
                    [],
                    |row| row.get(0),
                )?;
                if already_applied {
                    return Ok(());
                }

                let has_column: bool = tx.query_row(
                    "SELECT COUNT(*) > 0 FROM pragma_table_info('service_instances') WHERE name = 'status'",
                    [],
                    |row| row.get(0),
                )?;
                if !has_column {
                    tx.execute(
                        "ALTER TABLE service_instances ADD COLUMN status TEXT NOT NULL DEFAULT 'ready'",
                        [],
                    )?;
                }

                tx.execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (2, datetime('now'))",
                    [],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        info!("Migration v1 -> v2 completed");
        Ok(())
    }

    /// Drop reservations left behind by a process that stopped mid-provision.
    ///
    /// Runs from [`initialize`](Self::initialize), before this store serves
    /// any request, so no reservation can still be in flight.
    async fn release_stale_reservations(&self) -> Result<()> {
        let released = self
            .conn
            .call(|conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "DELETE FROM service_instances WHERE status = ?1",
                    rusqlite::params![STATUS_PROVISIONING],
                )?)
            })
            .await?;

        if released > 0 {
            warn!(
                "Released {} instance reservation(s) left by an interrupted provision",
                released
            );
        }
        Ok(())
    }

    async fn create_schema(&self) -> Result<()> {
        self.conn
            .call(|conn: &mut rusqlite::Connection| -> tokio_rusqlite::Result<()> {
                let tx = conn.transaction()?;
                tx.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS schema_version (
                        version INTEGER PRIMARY KEY,
                        applied_at TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS service_instances (
                        id TEXT PRIMARY KEY,
                        service_definition_id TEXT NOT NULL,
                        plan_id TEXT NOT NULL,
                        organization_guid TEXT,
                        space_guid TEXT,
                        parameters TEXT,
                        created_at TEXT NOT NULL,
                        status TEXT NOT NULL DEFAULT 'ready'
                    );

                    -- service_instance_id is deliberately not a foreign key:
                    -- bindings may reference instances this broker never saw.
                    CREATE TABLE IF NOT EXISTS service_bindings (
                        id TEXT PRIMARY KEY,
                        service_instance_id TEXT NOT NULL,
                        credentials TEXT NOT NULL,
                        syslog_drain_url TEXT,
                        app_guid TEXT,
                        created_at TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_bindings_instance
                        ON service_bindings(service_instance_id);
                    "#,
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                    rusqlite::params![SCHEMA_VERSION],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        info!("Initialized state schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    /// Number of stored instances and bindings. Reservations are counted.
    pub async fn counts(&self) -> Result<(usize, usize)> {
        self.conn
            .call(|conn: &mut rusqlite::Connection| {
                let instances: i64 =
                    conn.query_row("SELECT COUNT(*) FROM service_instances", [], |row| row.get(0))?;
                let bindings: i64 =
                    conn.query_row("SELECT COUNT(*) FROM service_bindings", [], |row| row.get(0))?;
                Ok((instances as usize, bindings as usize))
            })
            .await
            .map_err(Error::from)
    }
}

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn instance_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceInstance> {
    let parameters: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(ServiceInstance {
        service_instance_id: row.get(0)?,
        service_definition_id: row.get(1)?,
        plan_id: row.get(2)?,
        organization_guid: row.get(3)?,
        space_guid: row.get(4)?,
        parameters: parameters
            .map(|raw| json_column::<Parameters>(5, &raw))
            .transpose()?,
        created_at: timestamp_column(6, &created_at)?,
    })
}

fn binding_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceInstanceBinding> {
    let credentials: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    Ok(ServiceInstanceBinding {
        binding_id: row.get(0)?,
        service_instance_id: row.get(1)?,
        credentials: json_column(2, &credentials)?,
        syslog_drain_url: row.get(3)?,
        app_guid: row.get(4)?,
        created_at: timestamp_column(5, &created_at)?,
    })
}

/// Owned column values for an instance row, movable into the connection thread.
struct InstanceRow {
    id: String,
    service_definition_id: String,
    plan_id: String,
    organization_guid: Option<String>,
    space_guid: Option<String>,
    parameters: Option<String>,
    created_at: String,
}

impl InstanceRow {
    fn from_record(instance: &ServiceInstance) -> Result<Self> {
        Ok(Self {
            id: instance.service_instance_id.clone(),
            service_definition_id: instance.service_definition_id.clone(),
            plan_id: instance.plan_id.clone(),
            organization_guid: instance.organization_guid.clone(),
            space_guid: instance.space_guid.clone(),
            parameters: instance
                .parameters
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_at: instance.created_at.to_rfc3339(),
        })
    }

    fn insert_if_absent(
        &self,
        conn: &rusqlite::Connection,
        status: &str,
    ) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO service_instances (id, service_definition_id, plan_id, organization_guid, space_guid, parameters, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO NOTHING",
            rusqlite::params![
                &self.id,
                &self.service_definition_id,
                &self.plan_id,
                self.organization_guid.as_deref(),
                self.space_guid.as_deref(),
                self.parameters.as_deref(),
                &self.created_at,
                status,
            ],
        )
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn reserve_instance(&self, instance: &ServiceInstance) -> Result<InsertOutcome> {
        let row = InstanceRow::from_record(instance)?;
        let id = row.id.clone();

        let inserted = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(row.insert_if_absent(conn, STATUS_PROVISIONING)?)
            })
            .await?;

        if inserted == 0 {
            debug!("Instance record {} already exists", id);
            Ok(InsertOutcome::Conflict)
        } else {
            debug!("Reserved instance record {}", id);
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn commit_instance(&self, instance_id: &str) -> Result<bool> {
        let instance_id = instance_id.to_string();

        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "UPDATE service_instances SET status = ?2 WHERE id = ?1 AND status = ?3",
                    rusqlite::params![&instance_id, STATUS_READY, STATUS_PROVISIONING],
                )?)
            })
            .await?;

        Ok(rows > 0)
    }

    async fn release_instance(&self, instance_id: &str) -> Result<bool> {
        let instance_id = instance_id.to_string();

        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "DELETE FROM service_instances WHERE id = ?1 AND status = ?2",
                    rusqlite::params![&instance_id, STATUS_PROVISIONING],
                )?)
            })
            .await?;

        Ok(rows > 0)
    }

    async fn find_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>> {
        let instance_id = instance_id.to_string();

        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM service_instances WHERE id = ?1 AND status = ?2",
                            INSTANCE_COLUMNS
                        ),
                        rusqlite::params![&instance_id, STATUS_READY],
                        instance_from_row,
                    )
                    .optional()?)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        let instance_id = instance_id.to_string();

        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "DELETE FROM service_instances WHERE id = ?1 AND status = ?2",
                    rusqlite::params![&instance_id, STATUS_READY],
                )?)
            })
            .await?;

        Ok(rows > 0)
    }

    async fn replace_instance(&self, instance: &ServiceInstance) -> Result<bool> {
        let row = InstanceRow::from_record(instance)?;

        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM service_instances WHERE id = ?1 AND status = ?2",
                    rusqlite::params![&row.id, STATUS_READY],
                )?;
                if removed == 0 {
                    // Nothing to replace; dropping the transaction rolls back.
                    return Ok(false);
                }
                row.insert_if_absent(&tx, STATUS_READY)?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    async fn insert_binding(&self, binding: &ServiceInstanceBinding) -> Result<InsertOutcome> {
        let id = binding.binding_id.clone();
        let id_for_tx = id.clone();
        let service_instance_id = binding.service_instance_id.clone();
        let credentials = serde_json::to_string(&binding.credentials)?;
        let syslog_drain_url = binding.syslog_drain_url.clone();
        let app_guid = binding.app_guid.clone();
        let created_at = binding.created_at.to_rfc3339();

        let inserted = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "INSERT INTO service_bindings (id, service_instance_id, credentials, syslog_drain_url, app_guid, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO NOTHING",
                    rusqlite::params![
                        &id_for_tx,
                        &service_instance_id,
                        &credentials,
                        syslog_drain_url.as_deref(),
                        app_guid.as_deref(),
                        &created_at,
                    ],
                )?)
            })
            .await?;

        if inserted == 0 {
            debug!("Binding record {} already exists", id);
            Ok(InsertOutcome::Conflict)
        } else {
            debug!("Inserted binding record {}", id);
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn find_binding(&self, binding_id: &str) -> Result<Option<ServiceInstanceBinding>> {
        let binding_id = binding_id.to_string();

        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM service_bindings WHERE id = ?1", BINDING_COLUMNS),
                        rusqlite::params![&binding_id],
                        binding_from_row,
                    )
                    .optional()?)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_binding(&self, binding_id: &str) -> Result<bool> {
        let binding_id = binding_id.to_string();

        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn.execute(
                    "DELETE FROM service_bindings WHERE id = ?1",
                    rusqlite::params![&binding_id],
                )?)
            })
            .await?;

        Ok(rows > 0)
    }
}
