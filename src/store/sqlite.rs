//! SQLite store backend.
//!
//! Every [`Namespace`] is a two-column table (`key INTEGER PRIMARY KEY`,
//! `value BLOB`) inside one database file. All namespace handles opened from
//! the same [`SqliteDatabase`] share its connection.

use log::{debug, trace};
use rand::{Rng, RngCore};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Key, KeyValueStore, Namespace, StoreError};

/// An open database file. Hands out one [`SqliteStore`] per namespace.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Connect to the DB. If it doesn't exist, SQLite creates it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!("Opening store database at {}", path.display());
        let conn = Connection::open(path)?;
        // Readers should not fail while the loader holds the write lock.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database. Good for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Handle to one namespace. Creates its table on first use.
    pub fn namespace(&self, namespace: Namespace) -> Result<SqliteStore, StoreError> {
        let table = namespace.table_name();
        {
            let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        key   INTEGER PRIMARY KEY,
                        value BLOB    NOT NULL
                    )"
                ),
                (),
            )?;
        }

        Ok(SqliteStore {
            conn: Arc::clone(&self.conn),
            table,
        })
    }
}

/// One namespace of a [`SqliteDatabase`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    /// Always a [`Namespace::table_name`], never user input.
    table: &'static str,
}

impl SqliteStore {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: Key) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT value FROM {} WHERE key = ?1", self.table))?;
        Ok(stmt.query_row([key], |row| row.get(0)).optional()?)
    }

    fn set(&self, key: Key, value: &[u8]) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
            self.table
        ))?;
        stmt.execute((key, value))?;
        Ok(())
    }

    fn exists(&self, key: Key) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached(&format!("SELECT 1 FROM {} WHERE key = ?1", self.table))?;
        Ok(stmt.exists([key])?)
    }

    fn delete(&self, key: Key) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {} WHERE key = ?1", self.table), [key])?;
        Ok(())
    }

    /// Count the rows, then pick one at a random offset.
    fn random_key(&self, rng: &mut dyn RngCore) -> Result<Option<Key>, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        trace!("{count} entries in `{}'", self.table);

        if count == 0 {
            return Ok(None);
        }

        let offset = rng.gen_range(0..count);
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT key FROM {} ORDER BY key LIMIT 1 OFFSET ?1",
            self.table
        ))?;
        Ok(stmt.query_row([offset], |row| row.get(0)).optional()?)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", self.table), ())?;
        Ok(())
    }

    /// Adds all entries inside one transaction.
    ///
    /// VERY FAST compared to calling `set` in a loop.
    fn set_many(&self, entries: &[(Key, Vec<u8>)]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                self.table
            ))?;

            for (key, value) in entries {
                stmt.execute((key, value))?;
            }
        }

        tx.commit()?;
        debug!("Wrote {} entries into `{}'", entries.len(), self.table);
        Ok(())
    }
}
