//! SQLite storage backend for the meta tables.
//!
//! Implements `MetaStore` using rusqlite (bundled). The connection is
//! protected by a `parking_lot::ReentrantMutex<RefCell<Connection>>` so that
//! `transaction()` can hold the lock while calling the closure, which also
//! needs to lock in order to execute SQL.

use std::cell::{Cell, RefCell};

use parking_lot::ReentrantMutex;

use crate::error::{RepeaterError, Result, StorageError};
use crate::types::{MetaRow, PersistedRecord};

use super::statement::{self, SqlParam, Statement};
use super::table::{Destination, MetaTable, TableConfig};
use super::traits::MetaStore;

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a `SqlParam` to a `rusqlite::types::Value`.
fn param_to_sql(p: &SqlParam) -> rusqlite::types::Value {
    match p {
        SqlParam::Int(i) => rusqlite::types::Value::Integer(*i),
        SqlParam::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// Map a rusqlite error to a `RepeaterError`.
fn storage_err(e: rusqlite::Error) -> RepeaterError {
    RepeaterError::Storage(StorageError::Sqlite(e))
}

// ============================================================================
// SqliteStore
// ============================================================================

/// SQLite meta store.
///
/// `ReentrantMutex` allows `transaction()` to hold the guard while the closure
/// re-acquires it for individual SQL operations.
pub struct SqliteStore {
    conn: ReentrantMutex<RefCell<rusqlite::Connection>>,
}

impl SqliteStore {
    /// Open a file-backed SQLite database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(storage_err)?;
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
        })
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(storage_err)?;
        Ok(Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
        })
    }

    /// Set pragmas and create every table named by `config`.
    pub fn initialize(&self, config: &TableConfig) -> Result<()> {
        {
            let guard = self.conn.lock();
            let conn = guard.borrow();

            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(storage_err)?;

            for table in config.tables() {
                conn.execute_batch(&Self::create_table_sql(&table))
                    .map_err(storage_err)?;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// DDL for one meta table. Keys are indexed but deliberately not unique:
    /// duplicate keys per object are tolerated by the reader.
    fn create_table_sql(table: &MetaTable) -> String {
        let object_col = table
            .object_column
            .map(|c| format!("{c} INTEGER NOT NULL DEFAULT 0,\n"))
            .unwrap_or_default();
        let index_cols = match table.object_column {
            Some(c) => format!("{c}, {}", table.key_column),
            None => table.key_column.to_string(),
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {name} (
                {id} INTEGER PRIMARY KEY AUTOINCREMENT,
                {object_col}{key} TEXT NOT NULL,
                {value} TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_{name}_key ON {name} ({index_cols});",
            name = table.name,
            id = table.id_column,
            key = table.key_column,
            value = table.value_column,
        )
    }

    /// Execute a write statement and return the number of rows changed.
    fn execute(&self, stmt: &Statement) -> Result<usize> {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut prepared = conn.prepare_cached(&stmt.sql).map_err(storage_err)?;
        prepared
            .execute(rusqlite::params_from_iter(stmt.params.iter().map(param_to_sql)))
            .map_err(storage_err)
    }
}

// ============================================================================
// MetaStore implementation
// ============================================================================

impl MetaStore for SqliteStore {
    fn select(&self, dest: &Destination, keys: &[String]) -> Result<Vec<PersistedRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = statement::select(dest, keys);

        let guard = self.conn.lock();
        let conn = guard.borrow();
        let mut prepared = conn.prepare_cached(&stmt.sql).map_err(storage_err)?;
        let rows = prepared
            .query_map(
                rusqlite::params_from_iter(stmt.params.iter().map(param_to_sql)),
                |row| {
                    let id: i64 = row.get(0)?;
                    let key: String = row.get(1)?;
                    let value: Option<String> = row.get(2)?;
                    Ok((id, key, value.unwrap_or_default()))
                },
            )
            .map_err(storage_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, key, value) = row.map_err(storage_err)?;
            let meta_key = dest.meta_key(&key).ok_or_else(|| StorageError::Corruption {
                table: dest.table.name.clone(),
                meta_key: key.clone(),
                message: "selected key is outside the destination bucket".to_string(),
            })?;
            records.push(PersistedRecord {
                id: id as u64,
                meta_key,
                meta_value: value,
            });
        }
        Ok(records)
    }

    fn insert_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.execute(&statement::insert(dest, rows))
    }

    fn update_batch(&self, dest: &Destination, rows: &[MetaRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.execute(&statement::update(dest, rows))
    }

    fn delete_one(&self, dest: &Destination, key: &str) -> Result<bool> {
        self.execute(&statement::delete(dest, key)).map(|n| n > 0)
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        // Use a SAVEPOINT so this composes with outer transactions.
        // Each invocation gets a unique name to avoid collisions when nested.
        // ReentrantMutex lets the closure re-acquire the lock for its SQL calls.
        thread_local! {
            static SP_COUNTER: Cell<u64> = const { Cell::new(0) };
        }
        let sp_name = SP_COUNTER.with(|c| {
            let n = c.get();
            c.set(n + 1);
            format!("sp_{n}")
        });

        let guard = self.conn.lock();
        guard
            .borrow()
            .execute(&format!("SAVEPOINT {sp_name}"), [])
            .map_err(storage_err)?;

        match f(self) {
            Ok(v) => {
                let released = guard
                    .borrow()
                    .execute(&format!("RELEASE SAVEPOINT {sp_name}"), []);
                match released {
                    Ok(_) => Ok(v),
                    Err(e) => {
                        // Best-effort rollback to clean up the leaked savepoint
                        let _ = guard
                            .borrow()
                            .execute(&format!("ROLLBACK TO SAVEPOINT {sp_name}"), []);
                        Err(StorageError::Transaction {
                            message: "RELEASE SAVEPOINT failed".to_string(),
                            source: Some(Box::new(e)),
                        }
                        .into())
                    }
                }
            }
            Err(e) => {
                let conn = guard.borrow();
                let _ = conn.execute(&format!("ROLLBACK TO SAVEPOINT {sp_name}"), []);
                let _ = conn.execute(&format!("RELEASE SAVEPOINT {sp_name}"), []);
                Err(e)
            }
        }
    }
}
