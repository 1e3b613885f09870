//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! from_redb {
    ($($ty:ident),*) => {
        $(
            impl From<redb::$ty> for StoreError {
                fn from(e: redb::$ty) -> Self {
                    StoreError::Database(e.into())
                }
            }
        )*
    };
}

from_redb!(
    DatabaseError,
    TransactionError,
    TableError,
    StorageError,
    CommitError
);

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<StoreError> for gypsy_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => gypsy_core::Error::NotFound(what),
            StoreError::InvalidInput(what) => gypsy_core::Error::InvalidInput(what),
            other => gypsy_core::Error::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
