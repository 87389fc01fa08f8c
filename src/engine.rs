use crate::error::{StorageError, StorageResult};

pub type EntryId = i64;

// capacity of a TEXT column
pub const DEFAULT_MAX_VALUE_BYTES: usize = 65_535;

pub trait BlobEngine: Clone + Send + Sync + 'static {
    fn put(&self, value: String) -> StorageResult<EntryId>;

    fn get(&self, id: EntryId) -> StorageResult<Option<String>>;
}

pub(crate) fn check_value_size(value: &str, max: usize) -> StorageResult<()> {
    if value.len() > max {
        return Err(StorageError::ValueTooLarge {
            len: value.len(),
            max,
        });
    }
    Ok(())
}
