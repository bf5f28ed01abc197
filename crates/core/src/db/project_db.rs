use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::{CorrelationRunRecord, EntityStore, RunStatus, StoreError, StoredRun};
use crate::events::{Event, EventKind};
use crate::model::{Entity, EntityAttrs};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for project database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// Entity attributes could not be (de)serialized.
    #[error("Attribute JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Saved entities violate the store's invariants.
    #[error("Saved entities are inconsistent: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown event kind '{0}'")]
    UnknownEventKind(String),
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed project database.
///
/// Holds the entities saved by the latest correlation run, the history of
/// runs, and the events each run reported.
#[derive(Debug)]
pub struct ProjectDb {
    conn: Connection,
}

fn addr_to_sql(addr: Option<u64>) -> Option<i64> {
    addr.map(|a| a as i64)
}

fn addr_from_sql(value: Option<i64>) -> Option<u64> {
    value.map(|v| v as u64)
}

impl ProjectDb {
    /// Open (or create) a project database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    /// For most code, prefer higher-level helpers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace the saved entities with the contents of `store`.
    ///
    /// Runs in one transaction; returns the number of rows written.
    pub fn save_store(&self, store: &EntityStore) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM entities", [])?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO entities (orig_addr, recomp_addr, attrs)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for entity in store.get_all() {
                let attrs = serde_json::to_string(&entity.attrs)?;
                stmt.execute(params![
                    addr_to_sql(entity.orig_addr()),
                    addr_to_sql(entity.recomp_addr()),
                    attrs
                ])?;
                written += 1;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    /// Rebuild an [`EntityStore`] from the saved entities.
    pub fn load_store(&self) -> DbResult<EntityStore> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT orig_addr, recomp_addr, attrs
            FROM entities
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                addr_from_sql(row.get(0)?),
                addr_from_sql(row.get(1)?),
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut store = EntityStore::new();
        for row in rows {
            let (orig, recomp, attrs) = row?;
            let attrs: EntityAttrs = serde_json::from_str(&attrs)?;
            let entity =
                Entity::from_parts(orig, recomp, attrs).ok_or(StoreError::MissingAddress)?;
            store.insert_entity(entity)?;
        }
        Ok(store)
    }

    /// Number of saved entities.
    pub fn entity_count(&self) -> DbResult<i64> {
        let count = self.conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Insert a correlation run record and return its row id.
    pub fn insert_run(&self, record: &CorrelationRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO correlation_runs (label, input_hash, orig_image_hash, recomp_image_hash, status, entities, matched, events, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.label,
                record.input_hash,
                record.orig_image_hash,
                record.recomp_image_hash,
                record.status.as_str(),
                record.entities,
                record.matched,
                record.events,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List all runs (ordered by id).
    pub fn list_runs(&self) -> DbResult<Vec<StoredRun>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, label, input_hash, orig_image_hash, recomp_image_hash, status, entities, matched, events, started_at, finished_at
            FROM correlation_runs
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(5)?;
            Ok(StoredRun {
                id: row.get(0)?,
                record: CorrelationRunRecord {
                    label: row.get(1)?,
                    input_hash: row.get(2)?,
                    orig_image_hash: row.get(3)?,
                    recomp_image_hash: row.get(4)?,
                    status: RunStatus::from_str_lossy(&status),
                    entities: row.get(6)?,
                    matched: row.get(7)?,
                    events: row.get(8)?,
                    started_at: row.get(9)?,
                    finished_at: row.get(10)?,
                },
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of recorded runs.
    pub fn run_count(&self) -> DbResult<i64> {
        let count =
            self.conn.query_row("SELECT COUNT(*) FROM correlation_runs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Store the events a run reported, keeping their order.
    pub fn insert_events(&self, run_id: i64, events: &[Event]) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO run_events (run_id, seq, kind, address, message)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for (seq, event) in events.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    seq as i64,
                    event.kind.as_str(),
                    event.address as i64,
                    event.message
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Events of one run in the order they were reported.
    pub fn list_events(&self, run_id: i64) -> DbResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT kind, address, message
            FROM run_events
            WHERE run_id = ?1
            ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64, row.get::<_, String>(2)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (kind, address, message) = row?;
            let kind = EventKind::parse(&kind).ok_or(DbError::UnknownEventKind(kind))?;
            out.push(Event { kind, address, message });
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: entities and correlation_runs
/// - 2: add run_events table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS entities (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                orig_addr   INTEGER UNIQUE,
                recomp_addr INTEGER UNIQUE,
                attrs       TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS correlation_runs (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                label             TEXT NOT NULL,
                input_hash        TEXT NOT NULL,
                orig_image_hash   TEXT,
                recomp_image_hash TEXT,
                status            TEXT NOT NULL,
                entities          INTEGER NOT NULL,
                matched           INTEGER NOT NULL,
                events            INTEGER NOT NULL,
                started_at        TEXT NOT NULL,
                finished_at       TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS run_events (
                run_id  INTEGER NOT NULL,
                seq     INTEGER NOT NULL,
                kind    TEXT NOT NULL,
                address INTEGER NOT NULL,
                message TEXT NOT NULL,
                PRIMARY KEY(run_id, seq)
            );
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
