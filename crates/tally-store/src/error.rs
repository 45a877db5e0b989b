//! Storage errors.

use tally_core::{CoreError, EntityKind};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A single-row update or delete matched nothing.
    #[error("{entity} record not found")]
    NotFound { entity: EntityKind },

    /// A unique key already exists.
    #[error("{entity} record {id} already exists")]
    Conflict { entity: EntityKind, id: String },

    /// A stored row could not be interpreted.
    #[error("corrupt {entity} row: {detail}")]
    Corrupt { entity: EntityKind, detail: String },

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
