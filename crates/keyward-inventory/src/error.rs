use keyward_core::{storage::RecordStoreError, validation::ValidationError};
use thiserror::Error;
use uuid::Uuid;

use crate::record::RecordKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: Uuid },
    #[error("{kind} not found: {ident}")]
    UnknownName { kind: RecordKind, ident: String },
    #[error("{kind} named `{name}` already exists")]
    DuplicateName { kind: RecordKind, name: String },
    #[error("{kind} {id} already exists")]
    DuplicateId { kind: RecordKind, id: Uuid },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    #[error("corrupt {table} table: {reason}")]
    Codec { table: &'static str, reason: String },
}
