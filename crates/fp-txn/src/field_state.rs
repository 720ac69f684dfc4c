//! Generic field-snapshot requests.
//!
//! A [`FieldStateRequest`] names a target entity and the new value for each
//! listed field. Commit captures the old values, writes the new ones, and
//! from then on undo/redo only replay the captured pairs; the mutation is
//! never recomputed.

use crate::error::{CommitError, ReplayError};
use crate::request::Request;
use async_trait::async_trait;
use fp_core::{EntityId, FieldAccess, FieldKey, FieldName, Value};
use smallvec::SmallVec;

/// Before/after values of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: FieldName,
    /// Captured at commit time; `Null` until then.
    pub old_value: Value,
    pub new_value: Value,
}

/// Snapshot-based request over named fields of one entity.
#[derive(Debug, Clone)]
pub struct FieldStateRequest {
    target: EntityId,
    changes: SmallVec<[FieldChange; 4]>,
}

impl FieldStateRequest {
    pub fn new(target: EntityId) -> Self {
        Self {
            target,
            changes: SmallVec::new(),
        }
    }

    /// Plan a write of `value` to `field`. Planning the same field twice keeps
    /// its original position and the latest value.
    #[must_use]
    pub fn set(mut self, field: impl Into<FieldName>, value: impl Into<Value>) -> Self {
        self.push(field.into(), value.into());
        self
    }

    pub(crate) fn push(&mut self, field: FieldName, value: Value) {
        match self.changes.iter_mut().find(|c| c.field == field) {
            Some(change) => change.new_value = value,
            None => self.changes.push(FieldChange {
                field,
                old_value: Value::Null,
                new_value: value,
            }),
        }
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn apply<C: FieldAccess>(&mut self, ctx: &mut C) -> Result<(), CommitError> {
        for i in 0..self.changes.len() {
            let field = self.changes[i].field;
            let captured = ctx
                .get_field(self.target, field)
                .and_then(|old| {
                    ctx.set_field(self.target, field, self.changes[i].new_value.clone())?;
                    Ok(old)
                });
            match captured {
                Ok(old) => self.changes[i].old_value = old,
                Err(e) => {
                    self.restore(ctx, i);
                    return Err(CommitError::Field(e));
                }
            }
        }
        Ok(())
    }

    /// Put back the first `applied` fields after a failed commit.
    fn restore<C: FieldAccess>(&self, ctx: &mut C, applied: usize) {
        for change in self.changes[..applied].iter().rev() {
            if let Err(e) = ctx.set_field(self.target, change.field, change.old_value.clone()) {
                log::error!("restore of {}.{} failed: {e}", self.target, change.field);
            }
        }
    }
}

#[async_trait]
impl<C: FieldAccess + Send + 'static> Request<C> for FieldStateRequest {
    async fn commit(&mut self, ctx: &mut C) -> Result<Value, CommitError> {
        self.apply(ctx)?;
        Ok(Value::Null)
    }

    fn undo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        for change in self.changes.iter().rev() {
            ctx.set_field(self.target, change.field, change.old_value.clone())?;
        }
        Ok(())
    }

    fn redo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        for change in &self.changes {
            ctx.set_field(self.target, change.field, change.new_value.clone())?;
        }
        Ok(())
    }

    fn can_transact_field(&self, field: FieldName) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }

    fn field_keys(&self) -> Vec<FieldKey> {
        self.changes
            .iter()
            .map(|c| FieldKey::new(self.target, c.field))
            .collect()
    }
}
