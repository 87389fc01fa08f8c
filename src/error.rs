use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("value is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage is corrupted: {0}")]
    Corrupted(String),

    #[error("value of {len} bytes exceeds the limit of {max} bytes")]
    ValueTooLarge { len: usize, max: usize },

    #[error("value is required")]
    MissingValue,

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::string::FromUtf8Error> for StorageError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        StorageError::Encoding(e.to_string())
    }
}

impl From<bson::ser::Error> for StorageError {
    fn from(e: bson::ser::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<bson::de::Error> for StorageError {
    fn from(e: bson::de::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
