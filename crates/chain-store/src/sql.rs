use rusqlite::{Connection, OptionalExtension, params};

use crate::{Database, Result, StoreError};

/// Table stored in SQLite as a key table with a one-to-many value table.
///
/// For a table named `markov` the schema is `markov_key(id, key UNIQUE)` and
/// `markov_value(id, key_id -> markov_key.id, value)`. Random picks use the
/// engine's `RANDOM()` ordering. `begin`/`commit`/`rollback` map to real
/// SQL transactions; nested scopes join the outermost one.
pub struct SqlStore {
    conn: Connection,
    name: String,
    depth: usize,
}

impl SqlStore {
    /// Open (or create) the database at `path` and its tables for `name`.
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: &str, name: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        tracing::info!(path, table = name, "opened sql store");
        Self::with_connection(conn, name)
    }

    /// Use an existing connection. `name` must be an identifier.
    pub fn with_connection(conn: Connection, name: &str) -> Result<Self> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Sql(rusqlite::Error::InvalidParameterName(
                name.to_string(),
            )));
        }
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS {name}_key (
                 id INTEGER PRIMARY KEY,
                 key TEXT NOT NULL UNIQUE
             );
             CREATE TABLE IF NOT EXISTS {name}_value (
                 id INTEGER PRIMARY KEY,
                 key_id INTEGER NOT NULL REFERENCES {name}_key(id) ON DELETE CASCADE,
                 value TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS {name}_value_key_id ON {name}_value(key_id);"
        ))?;
        Ok(SqlStore {
            conn,
            name: name.to_string(),
            depth: 0,
        })
    }
}

impl Database for SqlStore {
    fn append(&mut self, key: &str, item: &str) -> Result<()> {
        let name = &self.name;
        self.conn
            .prepare_cached(&format!("INSERT OR IGNORE INTO {name}_key (key) VALUES (?1)"))?
            .execute(params![key])?;
        self.conn
            .prepare_cached(&format!(
                "INSERT INTO {name}_value (key_id, value) SELECT id, ?2 FROM {name}_key WHERE key = ?1"
            ))?
            .execute(params![key, item])?;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Vec<String>> {
        let name = &self.name;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT v.value FROM {name}_value v JOIN {name}_key k ON v.key_id = k.id
             WHERE k.key = ?1 ORDER BY v.id"
        ))?;
        let rows = stmt.query_map(params![key], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn get_random(&mut self, key: &str) -> Result<Option<String>> {
        let name = &self.name;
        Ok(self
            .conn
            .prepare_cached(&format!(
                "SELECT v.value FROM {name}_value v JOIN {name}_key k ON v.key_id = k.id
                 WHERE k.key = ?1 ORDER BY RANDOM() LIMIT 1"
            ))?
            .query_row(params![key], |row| row.get(0))
            .optional()?)
    }

    fn get_random_any(&mut self) -> Result<Option<String>> {
        let name = &self.name;
        Ok(self
            .conn
            .prepare_cached(&format!(
                "SELECT value FROM {name}_value ORDER BY RANDOM() LIMIT 1"
            ))?
            .query_row([], |row| row.get(0))
            .optional()?)
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        let name = &self.name;
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT key FROM {name}_key ORDER BY id"))?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn len(&mut self) -> Result<usize> {
        let name = &self.name;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {name}_key"), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    fn begin(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.conn.execute_batch("BEGIN")?;
        }
        self.depth += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match self.depth {
            0 => Ok(()),
            // A failed COMMIT (e.g. SQLITE_BUSY) leaves the transaction
            // open, so the depth stays until a rollback closes it.
            1 => {
                self.conn.execute_batch("COMMIT")?;
                self.depth = 0;
                Ok(())
            }
            _ => {
                self.depth -= 1;
                Ok(())
            }
        }
    }

    /// Rolls back the whole outermost unit, whatever the nesting depth.
    fn rollback(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Ok(());
        }
        self.depth = 0;
        self.conn.execute_batch("ROLLBACK")?;
        tracing::debug!(table = %self.name, "rolled back");
        Ok(())
    }
}
