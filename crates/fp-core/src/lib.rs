pub mod document;
pub mod error;
pub mod id;
pub mod value;

pub use document::{Document, Entity, FieldAccess};
pub use error::FieldError;
pub use id::{EntityId, FieldKey, FieldName};
pub use value::Value;
