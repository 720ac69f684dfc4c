//! Sessions: one history entry for many requests issued during one gesture.
//!
//! "Rotate all selected moldings' textures" issues one request per molding.
//! Each is committed immediately so the user sees incremental effects, but
//! history receives a single unit when the session closes:
//!
//! - 0 entries → nothing is pushed
//! - 1 entry   → that entry is pushed as-is
//! - n entries → one `Composite` unit holding all of them, in issue order
//!
//! If any issued commit fails, every entry issued so far is undone in
//! reverse order and the session ends without touching history.

use crate::composite::CompositeRequest;
use crate::error::{ReplayError, Result, TxnError};
use crate::manager::{KernelState, TransactionManager};
use crate::request::{RequestHandle, RequestId, RequestType};
use fp_core::{FieldKey, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// ```text
/// Open ──issue──> Open ──close──> Closed
///   │
///   └──issued commit fails──> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
    Failed,
}

/// What closing a session did to history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing was issued; history untouched.
    Empty,
    /// Exactly one entry, pushed without wrapping.
    Single(RequestId),
    /// Several entries, pushed as one composite unit.
    Grouped { request: RequestId, count: usize },
    /// The session failed earlier; its entries were rolled back.
    Discarded,
}

/// Session bookkeeping held by the manager while a session is open.
pub(crate) struct OpenSession<C> {
    pub(crate) id: SessionId,
    pub(crate) label: Option<String>,
    pub(crate) entries: Vec<RequestHandle<C>>,
}

/// An open session bound to its manager.
///
/// Dropping an unclosed session closes it when the manager is idle;
/// otherwise the manager keeps it open until
/// [`TransactionManager::close_session`] is awaited.
pub struct Session<'m, C: Send + 'static> {
    manager: &'m TransactionManager<C>,
    id: SessionId,
    state: SessionState,
    finished: bool,
}

impl<C: Send + 'static> fmt::Debug for Session<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

impl<'m, C: Send + 'static> Session<'m, C> {
    pub(crate) fn new(manager: &'m TransactionManager<C>, id: SessionId) -> Self {
        Self {
            manager,
            id,
            state: SessionState::Open,
            finished: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of entries issued so far.
    pub fn len(&self) -> usize {
        let state = self.manager.kernel();
        match &state.session {
            Some(open) if open.id == self.id => open.entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit `request` against the live document and hold it for this
    /// session's history entry.
    ///
    /// # Errors
    /// `SessionClosed` once the session has closed or failed. A commit
    /// failure rolls back every entry issued so far and fails the session.
    pub async fn issue(&mut self, mut request: RequestHandle<C>) -> Result<Value> {
        if self.state != SessionState::Open {
            return Err(TxnError::SessionClosed(self.id));
        }
        let mut ctx = self.manager.gate.lock().await;

        let overlaps = {
            let state = self.manager.kernel();
            match &state.session {
                Some(open) if open.id == self.id => overlapping_fields(&open.entries, &request),
                _ => {
                    self.state = SessionState::Closed;
                    return Err(TxnError::SessionClosed(self.id));
                }
            }
        };
        if self.manager.config().warn_on_field_overlap {
            for key in &overlaps {
                log::warn!(
                    "{}: {} edits {key}, already transacted earlier in this session",
                    self.id,
                    request.id()
                );
            }
        }

        match request.commit(&mut *ctx).await {
            Ok(value) => {
                let mut state = self.manager.kernel();
                match state.session.as_mut() {
                    Some(open) if open.id == self.id => {
                        log::debug!("{} issued {} ({})", self.id, request.id(), request.request_type());
                        open.entries.push(request);
                    }
                    _ => log::error!("{} vanished while {} was committing", self.id, request.id()),
                }
                Ok(value)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                let entries = take_open(&mut *self.manager.kernel(), self.id)
                    .map(|open| open.entries)
                    .unwrap_or_default();
                log::debug!(
                    "{} failed on {}: {e}; rolling back {} entries",
                    self.id,
                    request.id(),
                    entries.len()
                );
                if let Err(replay) = rollback(&mut *ctx, entries) {
                    log::error!("{} rollback failed, history frozen: {replay}", self.id);
                    self.manager.kernel().history.freeze();
                }
                Err(TxnError::Commit(e))
            }
        }
    }

    /// Close the session and push its entries to history.
    pub async fn close(mut self) -> Result<SessionOutcome> {
        self.finished = true;
        if self.state == SessionState::Failed {
            return Ok(SessionOutcome::Discarded);
        }
        self.state = SessionState::Closed;
        self.manager.close_session(self.id).await
    }

    /// Undo every issued entry and close without touching history.
    /// Returns how many entries were rolled back.
    pub async fn abandon(mut self) -> Result<usize> {
        self.finished = true;
        if self.state != SessionState::Open {
            return Ok(0);
        }
        self.state = SessionState::Closed;
        let mut ctx = self.manager.gate.lock().await;
        let entries = take_open(&mut *self.manager.kernel(), self.id)
            .map(|open| open.entries)
            .unwrap_or_default();
        log::debug!("{} abandoned with {} entries", self.id, entries.len());
        rollback(&mut *ctx, entries).map_err(|e| {
            self.manager.kernel().history.freeze();
            TxnError::UndoReplayFailure(e)
        })
    }
}

impl<C: Send + 'static> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if self.finished || self.state != SessionState::Open {
            return;
        }
        match self.manager.gate.try_lock() {
            Ok(_gate) => {
                let outcome = finish(&mut *self.manager.kernel(), self.id);
                log::warn!("{} dropped without close: {outcome:?}", self.id);
            }
            Err(_) => log::warn!(
                "{} dropped while an operation is in flight; it stays open until closed",
                self.id
            ),
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────

/// Fields `candidate` touches that an already-issued request declared it
/// transacts. Advisory only.
pub fn overlapping_fields<C>(
    issued: &[RequestHandle<C>],
    candidate: &RequestHandle<C>,
) -> Vec<FieldKey> {
    candidate
        .field_keys()
        .into_iter()
        .filter(|key| {
            issued
                .iter()
                .any(|r| r.can_transact_field(key.field) && r.field_keys().contains(key))
        })
        .collect()
}

fn take_open<C>(state: &mut KernelState<C>, id: SessionId) -> Option<OpenSession<C>> {
    state.session.take_if(|open| open.id == id)
}

/// Undo `entries` newest-first. Stops at the first replay failure.
fn rollback<C>(
    ctx: &mut C,
    entries: Vec<RequestHandle<C>>,
) -> std::result::Result<usize, ReplayError> {
    let count = entries.len();
    for mut entry in entries.into_iter().rev() {
        entry.undo(ctx)?;
    }
    Ok(count)
}

/// Apply the collapsing rules and push the result to history.
pub(crate) fn finish<C: Send + 'static>(
    state: &mut KernelState<C>,
    id: SessionId,
) -> Result<SessionOutcome> {
    let OpenSession {
        label,
        mut entries,
        ..
    } = take_open(state, id).ok_or(TxnError::SessionClosed(id))?;

    let count = entries.len();
    let unit = match count {
        0 => {
            log::debug!("{id} closed empty");
            return Ok(SessionOutcome::Empty);
        }
        1 => entries.remove(0),
        _ => RequestHandle::committed(
            RequestType::Composite,
            Box::new(CompositeRequest::new(entries)),
        ),
    };
    let unit = match label {
        Some(label) => unit.with_description(label),
        None => unit,
    };

    let outcome = if count == 1 {
        SessionOutcome::Single(unit.id())
    } else {
        SessionOutcome::Grouped {
            request: unit.id(),
            count,
        }
    };
    log::debug!("{id} closed: {outcome:?}");
    state.record(unit);
    Ok(outcome)
}
