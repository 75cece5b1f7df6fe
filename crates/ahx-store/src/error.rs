use ahx_core::error::{AhxError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Realm, shard, item or object absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Well-formed but invalid query (bad page or count).
    #[error("{0}")]
    User(String),

    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("blob store error: {0}")]
    Blob(#[from] object_store::Error),

    #[error(transparent)]
    Codec(#[from] AhxError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Reply code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::User(_) => ErrorCode::UserError,
            _ => ErrorCode::GenericError,
        }
    }
}

macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    Self::Database(e.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(StoreError::NotFound("x".into()).code(), ErrorCode::NotFound);
        assert_eq!(StoreError::User("bad count".into()).code(), ErrorCode::UserError);
        let io = StoreError::from(std::io::Error::other("disk full"));
        assert_eq!(io.code(), ErrorCode::GenericError);
    }
}
