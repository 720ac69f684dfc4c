//! Undo/redo stacks.
//!
//! # Invariants
//!
//! 1. A unit is in at most one of `undo` / `redo`.
//! 2. `undo.len() <= max_depth` after every push (when bounded).
//! 3. Pushing a freshly committed unit clears `redo` (linear history).
//! 4. After a replay failure the failing unit is dropped and both stacks are
//!    frozen until acknowledged or reset.
//!
//! ```text
//! push(u3)          undo: [u1, u2, u3]   redo: []
//! undo() x2         undo: [u1]           redo: [u3, u2]
//! push(u4)          undo: [u1, u4]       redo: []
//! ```

use crate::error::{Result, TxnError};
use crate::request::RequestHandle;
use serde::Deserialize;
use std::collections::VecDeque;

// ─── Config ───────────────────────────────────────────────────────────────

/// Configuration for the manager's history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of units kept for undo; the oldest is evicted beyond
    /// it. `0` means unbounded. Default: **100**.
    pub max_depth: usize,

    /// Log a warning when a session issues a request touching a field an
    /// earlier entry already transacts. Default: **true**.
    pub warn_on_field_overlap: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            warn_on_field_overlap: true,
        }
    }
}

impl HistoryConfig {
    /// Parse from JSON; missing keys take their defaults.
    ///
    /// # Errors
    /// Returns `TxnError::Config` for malformed JSON or unknown value types.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TxnError::Config(e.to_string()))
    }
}

// ─── Stacks ───────────────────────────────────────────────────────────────

pub(crate) struct History<C> {
    undo: VecDeque<RequestHandle<C>>,
    redo: Vec<RequestHandle<C>>,
    max_depth: usize,
    frozen: bool,
}

impl<C> History<C> {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
            frozen: false,
        }
    }

    /// Record a freshly committed unit. Returns the evicted oldest unit, if any.
    pub(crate) fn push(&mut self, unit: RequestHandle<C>) -> Option<RequestHandle<C>> {
        self.undo.push_back(unit);
        self.redo.clear();
        if self.max_depth > 0 && self.undo.len() > self.max_depth {
            return self.undo.pop_front();
        }
        None
    }

    pub(crate) fn pop_undo(&mut self) -> Option<RequestHandle<C>> {
        self.undo.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<RequestHandle<C>> {
        self.redo.pop()
    }

    /// Return a unit that was just undone.
    pub(crate) fn push_redo(&mut self, unit: RequestHandle<C>) {
        self.redo.push(unit);
    }

    /// Return a unit that was just redone. Does not clear `redo`.
    pub(crate) fn push_undo(&mut self, unit: RequestHandle<C>) {
        self.undo.push_back(unit);
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn thaw(&mut self) {
        self.frozen = false;
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.frozen = false;
    }

    pub(crate) fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub(crate) fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Descriptions, most recent first.
    pub(crate) fn undo_descriptions(&self) -> Vec<String> {
        self.undo
            .iter()
            .rev()
            .map(|u| u.description().to_string())
            .collect()
    }

    /// Descriptions, next-to-redo first.
    pub(crate) fn redo_descriptions(&self) -> Vec<String> {
        self.redo
            .iter()
            .rev()
            .map(|u| u.description().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommitError, ReplayError};
    use crate::request::{Request, RequestType};
    use async_trait::async_trait;
    use fp_core::Value;
    use pretty_assertions::assert_eq;

    struct Noop;

    #[async_trait]
    impl Request<()> for Noop {
        async fn commit(&mut self, _: &mut ()) -> std::result::Result<Value, CommitError> {
            Ok(Value::Null)
        }

        fn undo(&mut self, _: &mut ()) -> std::result::Result<(), ReplayError> {
            Ok(())
        }

        fn redo(&mut self, _: &mut ()) -> std::result::Result<(), ReplayError> {
            Ok(())
        }
    }

    fn unit(name: &str) -> RequestHandle<()> {
        RequestHandle::new(RequestType::from_tag("Noop"), Noop).with_description(name)
    }

    #[test]
    fn push_clears_redo() {
        let mut history = History::new(0);
        history.push(unit("a"));
        history.push(unit("b"));
        let b = history.pop_undo().unwrap();
        history.push_redo(b);
        assert_eq!(history.redo_len(), 1);

        history.push(unit("c"));
        assert_eq!(history.redo_len(), 0);
        assert_eq!(history.undo_descriptions(), vec!["c", "a"]);
    }

    #[test]
    fn depth_limit_evicts_oldest() {
        let mut history = History::new(2);
        assert!(history.push(unit("a")).is_none());
        assert!(history.push(unit("b")).is_none());
        let evicted = history.push(unit("c")).unwrap();
        assert_eq!(evicted.description(), "a");
        assert_eq!(history.undo_descriptions(), vec!["c", "b"]);
    }

    #[test]
    fn clear_thaws() {
        let mut history = History::new(10);
        history.push(unit("a"));
        history.freeze();
        assert!(history.is_frozen());
        history.clear();
        assert!(!history.is_frozen());
        assert_eq!(history.undo_len(), 0);
    }

    #[test]
    fn config_defaults_and_json() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_depth, 100);
        assert!(config.warn_on_field_overlap);

        let config = HistoryConfig::from_json(r#"{ "max_depth": 25 }"#).unwrap();
        assert_eq!(
            config,
            HistoryConfig {
                max_depth: 25,
                warn_on_field_overlap: true,
            }
        );

        let err = HistoryConfig::from_json(r#"{ "max_depth": "lots" }"#).unwrap_err();
        assert!(matches!(err, TxnError::Config(_)));
    }
}
