use crate::id::{EntityId, FieldName};
use thiserror::Error;

/// Why a document refused a field read or write.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("entity {0} not found")]
    UnknownEntity(EntityId),

    #[error("entity {0} is locked")]
    Locked(EntityId),

    #[error("field '{field}' on {target} is read-only")]
    ReadOnly { target: EntityId, field: FieldName },

    #[error("field '{field}' on {target} expects {expected}, got {found}")]
    TypeMismatch {
        target: EntityId,
        field: FieldName,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid document: {0}")]
    Invalid(String),
}
