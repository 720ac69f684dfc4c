//! Field-level view of the design document.
//!
//! The transaction kernel never inspects document semantics. Built-in
//! requests only need to read and write named fields on referenced entities,
//! which is what [`FieldAccess`] exposes. The real geometry engine implements
//! it over walls, rooms and moldings; [`Document`] is a plain in-memory
//! implementation used by fixtures and embedders without an engine.

use crate::error::FieldError;
use crate::id::{EntityId, FieldName};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Read/write access to entity fields.
pub trait FieldAccess {
    /// Read a field. Fields that were never written read as `Value::Null`.
    fn get_field(&self, target: EntityId, field: FieldName) -> Result<Value, FieldError>;

    /// Overwrite a field. Writing `Value::Null` clears it, so a field that
    /// was absent before a commit is absent again after its undo.
    fn set_field(
        &mut self,
        target: EntityId,
        field: FieldName,
        value: Value,
    ) -> Result<(), FieldError>;
}

// ─── Entities ─────────────────────────────────────────────────────────────

/// One entity in the in-memory document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind (`wall`, `room`, `molding`, …). Informational only.
    pub kind: String,
    /// A locked entity rejects every write.
    #[serde(default)]
    pub locked: bool,
    /// Fields that reject writes even when the entity is unlocked.
    #[serde(default)]
    pub read_only: HashSet<FieldName>,
    #[serde(default)]
    pub fields: HashMap<FieldName, Value>,
}

impl Entity {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(FieldName::intern(field), value.into());
        self
    }

    #[must_use]
    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    #[must_use]
    pub fn with_read_only(mut self, field: &str) -> Self {
        self.read_only.insert(FieldName::intern(field));
        self
    }
}

// ─── Document ─────────────────────────────────────────────────────────────

/// An in-memory document: a flat map of entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub entities: HashMap<EntityId, Entity>,
    /// Number of successful field writes since creation.
    #[serde(skip)]
    writes: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document from its JSON fixture form.
    ///
    /// # Errors
    /// Returns `FieldError::Invalid` if the JSON does not describe a document.
    pub fn from_json(json: &str) -> Result<Self, FieldError> {
        serde_json::from_str(json).map_err(|e| FieldError::Invalid(e.to_string()))
    }

    pub fn insert(&mut self, id: EntityId, entity: Entity) {
        self.entities.insert(id, entity);
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Convenience read for tests and callers that know the entity exists.
    pub fn field(&self, target: &str, field: &str) -> Option<&Value> {
        self.entities
            .get(&EntityId::intern(target))
            .and_then(|e| e.fields.get(&FieldName::intern(field)))
    }

    /// Total successful writes, for asserting that a failed operation wrote nothing.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

/// Two values are write-compatible if either side is null, they share a
/// type, or both are numeric.
fn compatible(existing: &Value, incoming: &Value) -> bool {
    if existing.is_null() || incoming.is_null() {
        return true;
    }
    if existing.as_float().is_some() && incoming.as_float().is_some() {
        return true;
    }
    existing.type_name() == incoming.type_name()
}

impl FieldAccess for Document {
    fn get_field(&self, target: EntityId, field: FieldName) -> Result<Value, FieldError> {
        let entity = self
            .entities
            .get(&target)
            .ok_or(FieldError::UnknownEntity(target))?;
        Ok(entity.fields.get(&field).cloned().unwrap_or_default())
    }

    fn set_field(
        &mut self,
        target: EntityId,
        field: FieldName,
        value: Value,
    ) -> Result<(), FieldError> {
        let entity = self
            .entities
            .get_mut(&target)
            .ok_or(FieldError::UnknownEntity(target))?;
        if entity.locked {
            return Err(FieldError::Locked(target));
        }
        if entity.read_only.contains(&field) {
            return Err(FieldError::ReadOnly { target, field });
        }
        if let Some(existing) = entity.fields.get(&field) {
            if !compatible(existing, &value) {
                return Err(FieldError::TypeMismatch {
                    target,
                    field,
                    expected: existing.type_name(),
                    found: value.type_name(),
                });
            }
        }
        log::trace!("SET {target}.{field} = {value}");
        if value.is_null() {
            entity.fields.remove(&field);
        } else {
            entity.fields.insert(field, value);
        }
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.insert(
            EntityId::intern("wall_a"),
            Entity::new("wall")
                .with_field("height", 2400)
                .with_field("visible", true)
                .with_read_only("kind_code"),
        );
        doc.insert(EntityId::intern("roof"), Entity::new("roof").locked());
        doc
    }

    #[test]
    fn missing_field_reads_null() {
        let doc = sample();
        let v = doc
            .get_field(EntityId::intern("wall_a"), FieldName::intern("color"))
            .unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let doc = sample();
        let err = doc
            .get_field(EntityId::intern("nope"), FieldName::intern("x"))
            .unwrap_err();
        assert_eq!(err, FieldError::UnknownEntity(EntityId::intern("nope")));
    }

    #[test]
    fn locked_and_read_only_reject_writes() {
        let mut doc = sample();
        let roof = EntityId::intern("roof");
        assert_eq!(
            doc.set_field(roof, FieldName::intern("pitch"), Value::Int(30)),
            Err(FieldError::Locked(roof))
        );
        let wall = EntityId::intern("wall_a");
        assert!(matches!(
            doc.set_field(wall, FieldName::intern("kind_code"), Value::Int(1)),
            Err(FieldError::ReadOnly { .. })
        ));
        assert_eq!(doc.writes(), 0);
    }

    #[test]
    fn numeric_widening_is_allowed_but_type_changes_are_not() {
        let mut doc = sample();
        let wall = EntityId::intern("wall_a");
        let height = FieldName::intern("height");
        doc.set_field(wall, height, Value::Float(2450.5)).unwrap();
        assert_eq!(doc.field("wall_a", "height"), Some(&Value::Float(2450.5)));

        let err = doc
            .set_field(wall, FieldName::intern("visible"), Value::from("yes"))
            .unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { expected: "bool", .. }));
        assert_eq!(doc.writes(), 1);
    }

    #[test]
    fn writing_null_clears_the_field() {
        let mut doc = sample();
        let wall = EntityId::intern("wall_a");
        let color = FieldName::intern("color");
        doc.set_field(wall, color, Value::from("oak")).unwrap();
        assert_eq!(doc.field("wall_a", "color"), Some(&Value::from("oak")));

        doc.set_field(wall, color, Value::Null).unwrap();
        assert_eq!(doc.field("wall_a", "color"), None);
        assert_eq!(doc.get_field(wall, color), Ok(Value::Null));
        assert_eq!(doc.writes(), 2);
    }

    #[test]
    fn loads_from_json() {
        let doc = Document::from_json(
            r#"{ "entities": { "door_1": { "kind": "door", "fields": { "visible": true } } } }"#,
        )
        .unwrap();
        assert_eq!(doc.field("door_1", "visible"), Some(&Value::Bool(true)));
        assert!(Document::from_json("{ not json").is_err());
    }
}
