//! Pluggable storage for the chain and entrypoint tables.
//!
//! Each table is a multi-map from a key to a bag of items: duplicates are
//! kept, because frequency encodes transition probability. The raw
//! [`Database`] trait works on strings so any backend can hold any table;
//! [`Table`] layers typed keys and items on top by encoding both as JSON.
//!
//! Three backends are provided:
//! - [`FileStore`]: the whole table in memory, persisted to one JSON file.
//! - [`RedisStore`]: one Redis set per key.
//! - [`SqlStore`]: key and value tables in SQLite.
//!
//! None of them add locking of their own inside the process. A multithreaded
//! host must serialize access to a table itself.

mod error;
mod file;
mod remote;
mod sql;

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use error::StoreError;
pub use file::FileStore;
pub use remote::RedisStore;
pub use sql::SqlStore;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// A string-keyed multi-map with random access.
///
/// All methods take `&mut self`: remote backends need a mutable connection and
/// the in-process backend owns its random number generator.
pub trait Database: Send {
    /// Record `item` under `key`. Appending the same item twice keeps both
    /// copies unless the backend documents otherwise.
    fn append(&mut self, key: &str, item: &str) -> Result<()>;

    /// Every item stored under `key`, or an empty vec if the key is absent.
    fn get(&mut self, key: &str) -> Result<Vec<String>>;

    /// One item under `key`, picked uniformly at random.
    fn get_random(&mut self, key: &str) -> Result<Option<String>>;

    /// One item picked across the whole table.
    ///
    /// Best effort: backends pick a random key and then a random item under
    /// it, so the distribution is only approximately uniform, and remote
    /// backends may race with concurrent deletions and return `None`.
    fn get_random_any(&mut self) -> Result<Option<String>>;

    fn keys(&mut self) -> Result<Vec<String>>;

    /// Number of distinct keys.
    fn len(&mut self) -> Result<usize>;

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Open a unit of work. No-op for backends without transactions.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    /// Persist buffered state. No-op for backends that write through.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Typed view over a [`Database`].
///
/// Keys and items are encoded with `serde_json`, so an n-gram key is stored
/// as `["the","cat"]` and a token as `"sat"`.
pub struct Table<K, V> {
    db: Box<dyn Database>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Table<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn new(db: Box<dyn Database>) -> Self {
        Table {
            db,
            _marker: PhantomData,
        }
    }

    pub fn append(&mut self, key: &K, item: &V) -> Result<()> {
        let key = serde_json::to_string(key)?;
        let item = serde_json::to_string(item)?;
        self.db.append(&key, &item)
    }

    pub fn get(&mut self, key: &K) -> Result<Vec<V>> {
        let key = serde_json::to_string(key)?;
        self.db
            .get(&key)?
            .iter()
            .map(|item| serde_json::from_str(item).map_err(StoreError::from))
            .collect()
    }

    pub fn get_random(&mut self, key: &K) -> Result<Option<V>> {
        let key = serde_json::to_string(key)?;
        decode_opt(self.db.get_random(&key)?)
    }

    /// See [`Database::get_random_any`]; the result is best effort.
    pub fn get_random_any(&mut self) -> Result<Option<V>> {
        decode_opt(self.db.get_random_any()?)
    }

    pub fn keys(&mut self) -> Result<Vec<K>> {
        self.db
            .keys()?
            .iter()
            .map(|key| serde_json::from_str(key).map_err(StoreError::from))
            .collect()
    }

    pub fn len(&mut self) -> Result<usize> {
        self.db.len()
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        self.db.is_empty()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.db.flush()
    }

    /// Run `f` as one unit of work.
    ///
    /// Commits when `f` returns `Ok`. When `f` or the commit fails the unit
    /// is rolled back and that error is returned; a failing rollback is only
    /// logged.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.db.begin()?;
        match f(self).and_then(|value| self.db.commit().map(|()| value)) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(rollback_err) = self.db.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn decode_opt<V: DeserializeOwned>(raw: Option<String>) -> Result<Option<V>> {
    raw.map(|item| serde_json::from_str(&item))
        .transpose()
        .map_err(StoreError::from)
}
