use crate::{Database, Result};

/// Table stored in Redis, one server-side set per key.
///
/// `append` is `SADD`, so repeated items under one key collapse into a single
/// member and transition frequencies are lost. Every table should live in its
/// own database index: `keys`, `len` and `get_random_any` see the whole index.
pub struct RedisStore {
    conn: redis::Connection,
}

impl RedisStore {
    /// Connect to `url` and select database index `db`.
    pub fn open(url: &str, db: i64) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_connection()?;
        redis::cmd("SELECT").arg(db).query::<()>(&mut conn)?;
        tracing::info!(url, db, "opened redis store");
        Ok(RedisStore { conn })
    }
}

impl Database for RedisStore {
    fn append(&mut self, key: &str, item: &str) -> Result<()> {
        redis::cmd("SADD")
            .arg(key)
            .arg(item)
            .query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Vec<String>> {
        Ok(redis::cmd("SMEMBERS").arg(key).query(&mut self.conn)?)
    }

    fn get_random(&mut self, key: &str) -> Result<Option<String>> {
        Ok(redis::cmd("SRANDMEMBER").arg(key).query(&mut self.conn)?)
    }

    /// `RANDOMKEY` followed by `SRANDMEMBER`. The two commands are not atomic:
    /// a key deleted in between yields `None`.
    fn get_random_any(&mut self) -> Result<Option<String>> {
        let key: Option<String> = redis::cmd("RANDOMKEY").query(&mut self.conn)?;
        match key {
            Some(key) => self.get_random(&key),
            None => Ok(None),
        }
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(redis::cmd("KEYS").arg("*").query(&mut self.conn)?)
    }

    fn len(&mut self) -> Result<usize> {
        Ok(redis::cmd("DBSIZE").query(&mut self.conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs a scratch server: `BABBLE_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`.
    /// Database index 15 is flushed.
    fn scratch_store() -> RedisStore {
        let url = std::env::var("BABBLE_REDIS_URL").expect("BABBLE_REDIS_URL not set");
        let mut store = RedisStore::open(&url, 15).unwrap();
        redis::cmd("FLUSHDB").query::<()>(&mut store.conn).unwrap();
        store
    }

    #[test]
    #[ignore]
    fn append_collapses_duplicates() {
        let mut store = scratch_store();
        store.append("k", "a").unwrap();
        store.append("k", "a").unwrap();
        store.append("k", "b").unwrap();
        let mut items = store.get("k").unwrap();
        items.sort();
        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    #[ignore]
    fn random_reads() {
        let mut store = scratch_store();
        assert_eq!(store.get_random_any().unwrap(), None);
        store.append("k", "a").unwrap();
        assert_eq!(store.get_random("k").unwrap().as_deref(), Some("a"));
        assert_eq!(store.get_random_any().unwrap().as_deref(), Some("a"));
        assert_eq!(store.get_random("missing").unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["k"]);
    }
}
