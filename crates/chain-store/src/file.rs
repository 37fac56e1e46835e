use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::rngs::SmallRng;
use rand::seq::{IndexedRandom, IteratorRandom};

use crate::{Database, Result, StoreError};

/// In-process table persisted to a single JSON file.
///
/// The whole table is loaded at open time under a shared advisory lock and
/// written back by [`FileStore::save`] (called from `flush` and on drop) under
/// an exclusive lock. The locks only keep external readers from seeing a
/// half-written file; they do not serialize writers within this process.
///
/// Without a path the store is purely in-memory.
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    table: HashMap<String, Vec<String>>,
    rng: SmallRng,
    dirty: bool,
}

impl FileStore {
    /// Open the store at `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>, rng: SmallRng) -> Result<Self> {
        let path = path.into();
        let table = load(&path)?;
        tracing::info!(path = %path.display(), keys = table.len(), "opened file store");
        Ok(FileStore {
            path: Some(path),
            table,
            rng,
            dirty: false,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(rng: SmallRng) -> Self {
        FileStore {
            path: None,
            table: HashMap::new(),
            rng,
            dirty: false,
        }
    }

    /// Write the table to its file, replacing the previous contents.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock().map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;

        // Truncate only once the exclusive lock is held.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, &self.table)?;
        writer.flush()?;
        drop(writer);
        file.unlock()?;

        self.dirty = false;
        tracing::info!(path = %path.display(), keys = self.table.len(), "saved file store");
        Ok(())
    }
}

fn load(path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared().map_err(|source| StoreError::Lock {
        path: path.to_path_buf(),
        source,
    })?;

    if file.metadata()?.len() == 0 {
        return Ok(HashMap::new());
    }
    let table = serde_json::from_reader(BufReader::new(&file))?;
    file.unlock()?;
    Ok(table)
}

impl Database for FileStore {
    fn append(&mut self, key: &str, item: &str) -> Result<()> {
        self.table
            .entry(key.to_string())
            .or_default()
            .push(item.to_string());
        self.dirty = true;
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Vec<String>> {
        Ok(self.table.get(key).cloned().unwrap_or_default())
    }

    fn get_random(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self
            .table
            .get(key)
            .and_then(|items| items.choose(&mut self.rng))
            .cloned())
    }

    fn get_random_any(&mut self) -> Result<Option<String>> {
        let Some(items) = self.table.values().choose(&mut self.rng) else {
            return Ok(None);
        };
        Ok(items.choose(&mut self.rng).cloned())
    }

    fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.table.keys().cloned().collect())
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.table.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.save()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if self.dirty
            && let Err(e) = self.save()
        {
            tracing::warn!(error = %e, "failed to save file store on drop");
        }
    }
}
