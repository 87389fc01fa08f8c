use std::path::Path;
#[cfg(test)]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use sled::Db;

use crate::engine::{check_value_size, BlobEngine, EntryId, DEFAULT_MAX_VALUE_BYTES};
use crate::error::{StorageError, StorageResult};

#[derive(Clone)]
pub struct SledStore {
    pub db: Db,
    max_value_bytes: usize,

    #[cfg(test)]
    pub(crate) fail_flush: Arc<AtomicBool>,
}

impl SledStore {
    pub fn open(root_path: &Path) -> StorageResult<Self> {
        Self::with_limit(root_path, DEFAULT_MAX_VALUE_BYTES)
    }

    pub fn with_limit(root_path: &Path, max_value_bytes: usize) -> StorageResult<Self> {
        Ok(SledStore {
            db: sled::open(root_path.join("sled"))?,
            max_value_bytes,
            #[cfg(test)]
            fail_flush: Arc::new(AtomicBool::new(false)),
        })
    }

    fn flush(&self) -> StorageResult<()> {
        #[cfg(test)]
        {
            if self.fail_flush.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "flush failed",
                )));
            }
        }
        self.db.flush()?;
        Ok(())
    }
}

impl BlobEngine for SledStore {
    fn put(&self, value: String) -> StorageResult<EntryId> {
        check_value_size(&value, self.max_value_bytes)?;

        // generate_id starts at 0; ids handed out start at 1 like the log engine.
        let id = EntryId::try_from(self.db.generate_id()? + 1)
            .map_err(|_| StorageError::Corrupted("id space exhausted".to_string()))?;

        self.db.insert(id.to_be_bytes(), value.as_bytes())?;
        if let Err(e) = self.flush() {
            // the insert is visible in memory until it is taken back out
            if let Err(remove_err) = self.db.remove(id.to_be_bytes()) {
                log::error!(
                    "drop unflushed entry {} failed, reason: {}",
                    id,
                    remove_err
                );
            }
            return Err(e);
        }
        Ok(id)
    }

    fn get(&self, id: EntryId) -> StorageResult<Option<String>> {
        self.db
            .get(id.to_be_bytes())?
            .map(|v| String::from_utf8(v.to_vec()))
            .transpose()
            .map_err(StorageError::from)
    }
}
