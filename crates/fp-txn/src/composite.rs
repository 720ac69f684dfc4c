//! Ordered aggregates that commit, undo and redo as one indivisible unit.
//!
//! - commit: children in construction order; the first failure rolls back
//!   every child already committed (reverse order) before reporting.
//! - undo: reverse order. redo: forward order.
//! - A failure during undo/redo is reported as-is; there is no compensation.

use crate::error::{CommitError, ReplayError};
use crate::request::{Request, RequestHandle};
use async_trait::async_trait;
use fp_core::{FieldKey, FieldName, Value};

/// A fixed, ordered list of child requests.
pub struct CompositeRequest<C> {
    children: Vec<RequestHandle<C>>,
}

impl<C> std::fmt::Debug for CompositeRequest<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeRequest")
            .field("children", &self.children)
            .finish()
    }
}

impl<C> CompositeRequest<C> {
    pub fn new(children: Vec<RequestHandle<C>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[RequestHandle<C>] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl<C: Send + 'static> Request<C> for CompositeRequest<C> {
    async fn commit(&mut self, ctx: &mut C) -> Result<Value, CommitError> {
        let mut results = Vec::with_capacity(self.children.len());
        for index in 0..self.children.len() {
            let failure = match self.children[index].commit(ctx).await {
                Ok(value) => {
                    results.push(value);
                    continue;
                }
                Err(e) => e,
            };

            let request = self.children[index].id();
            log::debug!("composite child {index} ({request}) failed, rolling back {index} children");
            for j in (0..index).rev() {
                if let Err(rollback) = self.children[j].undo(ctx) {
                    log::error!("rollback of {} failed: {rollback}", self.children[j].id());
                    return Err(CommitError::RollbackFailed {
                        request,
                        commit: Box::new(failure),
                        rollback: Box::new(rollback),
                    });
                }
            }
            return Err(CommitError::Child {
                index,
                request,
                source: Box::new(failure),
            });
        }
        Ok(Value::List(results))
    }

    fn undo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        for (index, child) in self.children.iter_mut().enumerate().rev() {
            child.undo(ctx).map_err(|e| ReplayError::Child {
                index,
                request: child.id(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    fn redo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        for (index, child) in self.children.iter_mut().enumerate() {
            child.redo(ctx).map_err(|e| ReplayError::Child {
                index,
                request: child.id(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    fn can_transact_field(&self, field: FieldName) -> bool {
        self.children.iter().any(|c| c.can_transact_field(field))
    }

    fn field_keys(&self) -> Vec<FieldKey> {
        let mut keys = Vec::new();
        for key in self.children.iter().flat_map(|c| c.field_keys()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

// ─── Batch ────────────────────────────────────────────────────────────────

/// A composite tagged for bulk-operation bookkeeping ("12 items pasted").
/// Undo semantics are exactly those of [`CompositeRequest`].
pub struct BatchRequest<C> {
    batch_tag: String,
    inner: CompositeRequest<C>,
}

impl<C> std::fmt::Debug for BatchRequest<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("batch_tag", &self.batch_tag)
            .field("items", &self.inner.len())
            .finish()
    }
}

impl<C> BatchRequest<C> {
    pub fn new(batch_tag: impl Into<String>, children: Vec<RequestHandle<C>>) -> Self {
        Self {
            batch_tag: batch_tag.into(),
            inner: CompositeRequest::new(children),
        }
    }

    pub fn batch_tag(&self) -> &str {
        &self.batch_tag
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn children(&self) -> &[RequestHandle<C>] {
        self.inner.children()
    }

    /// One-line report for the whole batch, e.g. `12 items pasted`.
    pub fn summary(&self) -> String {
        summarize(self.len(), &self.batch_tag)
    }
}

pub(crate) fn summarize(count: usize, batch_tag: &str) -> String {
    let noun = if count == 1 { "item" } else { "items" };
    format!("{count} {noun} {batch_tag}")
}

#[async_trait]
impl<C: Send + 'static> Request<C> for BatchRequest<C> {
    async fn commit(&mut self, ctx: &mut C) -> Result<Value, CommitError> {
        log::debug!("batch '{}' committing {} items", self.batch_tag, self.len());
        self.inner.commit(ctx).await
    }

    fn undo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        self.inner.undo(ctx)
    }

    fn redo(&mut self, ctx: &mut C) -> Result<(), ReplayError> {
        self.inner.redo(ctx)
    }

    fn can_transact_field(&self, field: FieldName) -> bool {
        self.inner.can_transact_field(field)
    }

    fn field_keys(&self) -> Vec<FieldKey> {
        self.inner.field_keys()
    }

    fn describe(&self) -> Option<String> {
        Some(self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestStatus, RequestType};
    use pretty_assertions::assert_eq;

    /// Context: a trace of lifecycle calls plus a running total.
    #[derive(Default)]
    struct Trace {
        calls: Vec<String>,
        total: i64,
    }

    struct Step {
        name: &'static str,
        amount: i64,
        fail_commit: bool,
    }

    #[async_trait]
    impl Request<Trace> for Step {
        async fn commit(&mut self, ctx: &mut Trace) -> Result<Value, CommitError> {
            ctx.calls.push(format!("commit {}", self.name));
            if self.fail_commit {
                return Err(CommitError::Rejected(self.name.to_string()));
            }
            ctx.total += self.amount;
            Ok(Value::Int(self.amount))
        }

        fn undo(&mut self, ctx: &mut Trace) -> Result<(), ReplayError> {
            ctx.calls.push(format!("undo {}", self.name));
            ctx.total -= self.amount;
            Ok(())
        }

        fn redo(&mut self, ctx: &mut Trace) -> Result<(), ReplayError> {
            ctx.calls.push(format!("redo {}", self.name));
            ctx.total += self.amount;
            Ok(())
        }
    }

    fn step(name: &'static str, amount: i64, fail_commit: bool) -> RequestHandle<Trace> {
        RequestHandle::new(
            RequestType::from_tag("Step"),
            Step {
                name,
                amount,
                fail_commit,
            },
        )
    }

    #[tokio::test]
    async fn undo_reverses_and_redo_replays_in_order() {
        let mut ctx = Trace::default();
        let mut composite = CompositeRequest::new(vec![
            step("a", 1, false),
            step("b", 10, false),
            step("c", 100, false),
        ]);

        let value = composite.commit(&mut ctx).await.unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::Int(1), Value::Int(10), Value::Int(100)])
        );
        composite.undo(&mut ctx).unwrap();
        composite.redo(&mut ctx).unwrap();

        assert_eq!(
            ctx.calls,
            vec![
                "commit a", "commit b", "commit c", "undo c", "undo b", "undo a", "redo a",
                "redo b", "redo c",
            ]
        );
        assert_eq!(ctx.total, 111);
    }

    #[tokio::test]
    async fn failing_child_rolls_back_earlier_children() {
        let mut ctx = Trace::default();
        let mut composite = CompositeRequest::new(vec![
            step("a", 1, false),
            step("b", 10, false),
            step("c", 100, true),
        ]);

        let err = composite.commit(&mut ctx).await.unwrap_err();
        assert!(matches!(err, CommitError::Child { index: 2, .. }));
        assert_eq!(ctx.total, 0);
        assert_eq!(
            ctx.calls,
            vec!["commit a", "commit b", "commit c", "undo b", "undo a"]
        );
        assert_eq!(composite.children()[0].status(), RequestStatus::Undone);
        assert_eq!(composite.children()[2].status(), RequestStatus::Failed);
    }

    #[tokio::test]
    async fn batch_behaves_like_composite_and_summarizes() {
        let mut ctx = Trace::default();
        let mut batch = BatchRequest::new(
            "pasted",
            vec![step("a", 1, false), step("b", 2, false)],
        );
        assert_eq!(batch.summary(), "2 items pasted");

        batch.commit(&mut ctx).await.unwrap();
        batch.undo(&mut ctx).unwrap();
        assert_eq!(ctx.total, 0);
        assert_eq!(ctx.calls.last().map(String::as_str), Some("undo a"));

        assert_eq!(summarize(1, "pasted"), "1 item pasted");
    }
}
